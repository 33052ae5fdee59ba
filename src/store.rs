//! Storage contracts and built-in backends for persisted credential sets.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, SubjectId},
	error::ConfigError,
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for credential sets, keyed by subject.
///
/// Backends own no business logic; `save` is a full-record replace, never a
/// field-level merge, so callers can never observe a partially written set.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the credential set stored for its subject.
	fn save(&self, credential: CredentialSet) -> StoreFuture<'_, ()>;

	/// Fetches the credential set stored for the subject, if present.
	fn fetch<'a>(&'a self, subject: &'a SubjectId) -> StoreFuture<'a, Option<CredentialSet>>;

	/// Removes the subject's credential set, reporting whether one existed.
	fn delete<'a>(&'a self, subject: &'a SubjectId) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

const STORE_VAR: &str = "STEWARD_STORE";
const STORE_PATH_VAR: &str = "STEWARD_STORE_PATH";

/// Selects and constructs a storage backend from process configuration.
///
/// `STEWARD_STORE` picks the backend (`memory` when unset, or `file` with
/// `STEWARD_STORE_PATH`); providers stay decoupled from the concrete persistence
/// technology behind the returned trait object.
pub fn from_env() -> Result<Arc<dyn TokenStore>> {
	from_lookup(|name| std::env::var(name).ok())
}

pub(crate) fn from_lookup(
	lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn TokenStore>> {
	let kind = lookup(STORE_VAR).unwrap_or_else(|| "memory".into());

	match kind.as_str() {
		"memory" => Ok(Arc::new(MemoryStore::default())),
		"file" => {
			let path =
				lookup(STORE_PATH_VAR).ok_or(ConfigError::MissingVar { name: STORE_PATH_VAR })?;

			Ok(Arc::new(FileStore::open(path)?))
		},
		other => Err(ConfigError::InvalidVar {
			name: STORE_VAR,
			reason: format!("unknown backend `{other}`"),
		}
		.into()),
	}
}
