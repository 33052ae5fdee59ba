//! Thread-safe in-memory [`TokenStore`] implementation for local mode and tests.

// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, SubjectId},
	store::{StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<SubjectId, CredentialSet>>>;

/// Thread-safe storage backend that keeps credential sets in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	fn save_now(map: StoreMap, credential: CredentialSet) -> Result<(), StoreError> {
		map.write().insert(credential.subject.clone(), credential);

		Ok(())
	}

	fn fetch_now(map: StoreMap, subject: SubjectId) -> Option<CredentialSet> {
		map.read().get(&subject).cloned()
	}

	fn delete_now(map: StoreMap, subject: SubjectId) -> bool {
		map.write().remove(&subject).is_some()
	}
}
impl TokenStore for MemoryStore {
	fn save(&self, credential: CredentialSet) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::save_now(map, credential) })
	}

	fn fetch<'a>(&'a self, subject: &'a SubjectId) -> StoreFuture<'a, Option<CredentialSet>> {
		let map = self.0.clone();
		let subject = subject.to_owned();

		Box::pin(async move { Ok(Self::fetch_now(map, subject)) })
	}

	fn delete<'a>(&'a self, subject: &'a SubjectId) -> StoreFuture<'a, bool> {
		let map = self.0.clone();
		let subject = subject.to_owned();

		Box::pin(async move { Ok(Self::delete_now(map, subject)) })
	}
}
