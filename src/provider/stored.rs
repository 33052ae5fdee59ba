//! Storage-backed multi-tenant [`TokenProvider`] with transparent renewal.

// self
use crate::{
	_prelude::*,
	auth::{REFRESH_BUFFER, RefreshMode, SubjectId, TokenSecret},
	oauth::RefreshHandshake,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderFuture, TokenProvider},
	store::TokenStore,
};

/// Looks up credential sets by subject and renews them ahead of expiry.
///
/// Renewals are serialized per subject: upstream services invalidate a refresh token
/// after first use, so two callers racing the same exchange would silently revoke
/// each other's replacement. Concurrent callers for the same subject instead await
/// one shared handshake and reuse its persisted result.
pub struct StoredProvider {
	store: Arc<dyn TokenStore>,
	refresher: Arc<dyn RefreshHandshake>,
	refresh_buffer: Duration,
	refresh_guards: Mutex<HashMap<SubjectId, Arc<AsyncMutex<()>>>>,
}
impl StoredProvider {
	/// Creates a provider over the given store and refresh handshake.
	pub fn new(store: Arc<dyn TokenStore>, refresher: Arc<dyn RefreshHandshake>) -> Self {
		Self {
			store,
			refresher,
			refresh_buffer: REFRESH_BUFFER,
			refresh_guards: Mutex::new(HashMap::new()),
		}
	}

	/// Overrides the proactive renewal window (defaults to five minutes).
	pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
		self.refresh_buffer = buffer;

		self
	}

	/// Returns (and creates on demand) the single-flight guard for a subject.
	fn refresh_guard(&self, subject: &SubjectId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.refresh_guards.lock();

		guards.entry(subject.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	async fn lookup(&self, subject: &SubjectId) -> Result<TokenSecret> {
		let current = self
			.store
			.fetch(subject)
			.await?
			.ok_or_else(|| Error::UnknownSubject { subject: subject.clone() })?;
		let now = OffsetDateTime::now_utc();

		if !current.needs_refresh_at(now, self.refresh_buffer) {
			return Ok(current.access_token);
		}

		match current.refresh {
			// Never auto-refresh a set without a refresh token; serve it until it
			// actually dies.
			RefreshMode::NonRefreshable if current.is_expired_at(now) =>
				Err(Error::ExpiredCredential { subject: subject.clone() }),
			RefreshMode::NonRefreshable => Ok(current.access_token),
			RefreshMode::Refreshable(_) => self.refresh_serialized(subject).await,
		}
	}

	async fn refresh_serialized(&self, subject: &SubjectId) -> Result<TokenSecret> {
		let guard = self.refresh_guard(subject);
		let _singleflight = guard.lock().await;
		// Re-read under the guard: a waiter arriving second finds the set a previous
		// holder already renewed and persisted.
		let current = self
			.store
			.fetch(subject)
			.await?
			.ok_or_else(|| Error::UnknownSubject { subject: subject.clone() })?;
		let now = OffsetDateTime::now_utc();

		if !current.needs_refresh_at(now, self.refresh_buffer) {
			return Ok(current.access_token);
		}

		let refresh_token = match &current.refresh {
			RefreshMode::Refreshable(secret) => secret.clone(),
			RefreshMode::NonRefreshable =>
				return if current.is_expired_at(now) {
					Err(Error::ExpiredCredential { subject: subject.clone() })
				} else {
					Ok(current.access_token)
				},
		};
		// A failed handshake propagates here without touching the store, so the
		// prior record stays available for manual re-authorization.
		let renewed =
			self.refresher.refresh(subject, &refresh_token, current.scope.as_deref()).await?;
		let token = renewed.access_token.clone();

		// The write lands before any caller, including this one, sees the new token.
		self.store.save(renewed).await?;

		Ok(token)
	}
}
impl TokenProvider for StoredProvider {
	fn access_token<'a>(&'a self, subject: &'a SubjectId) -> ProviderFuture<'a, TokenSecret> {
		Box::pin(async move {
			const KIND: FlowKind = FlowKind::Lookup;

			let span = FlowSpan::new(KIND, "access_token");

			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let result = span.instrument(self.lookup(subject)).await;

			match &result {
				Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
				Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
			}

			result
		})
	}
}
impl Debug for StoredProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StoredProvider")
			.field("refresh_buffer", &self.refresh_buffer)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{
		auth::CredentialSet,
		oauth::RefreshFuture,
		store::MemoryStore,
	};

	struct ScriptedRefresher {
		calls: AtomicU32,
		reject: bool,
	}
	impl ScriptedRefresher {
		fn succeeding() -> Arc<Self> {
			Arc::new(Self { calls: AtomicU32::new(0), reject: false })
		}

		fn rejecting() -> Arc<Self> {
			Arc::new(Self { calls: AtomicU32::new(0), reject: true })
		}

		fn calls(&self) -> u32 {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl RefreshHandshake for ScriptedRefresher {
		fn refresh<'a>(
			&'a self,
			subject: &'a SubjectId,
			_refresh_token: &'a TokenSecret,
			scope: Option<&'a str>,
		) -> RefreshFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);

				if self.reject {
					return Err(Error::RefreshFailed { reason: "invalid_grant".into() });
				}

				let mut builder = CredentialSet::builder(subject.clone())
					.access_token("renewed-access")
					.refresh_token("renewed-refresh")
					.issued_now()
					.expires_in(Duration::hours(1));

				if let Some(scope) = scope {
					builder = builder.scope(scope);
				}

				Ok(builder.build().expect("Renewed credential fixture should build."))
			})
		}
	}

	fn subject() -> SubjectId {
		SubjectId::new("tenant-9").expect("Subject fixture should be valid.")
	}

	#[tokio::test]
	async fn fresh_credentials_are_served_without_upstream_calls() {
		let store_backend = Arc::new(MemoryStore::default());
		let refresher = ScriptedRefresher::succeeding();
		let provider = StoredProvider::new(store_backend.clone(), refresher.clone());
		let credential = CredentialSet::builder(subject())
			.access_token("stored-access")
			.refresh_token("stored-refresh")
			.issued_now()
			.expires_in(Duration::hours(2))
			.build()
			.expect("Fresh credential fixture should build.");

		store_backend.save(credential).await.expect("Seeding the store should succeed.");

		let token = provider
			.access_token(&subject())
			.await
			.expect("Fresh stored token should be served.");

		assert_eq!(token.expose(), "stored-access");
		assert_eq!(refresher.calls(), 0, "No upstream call may happen outside the buffer.");
	}

	#[tokio::test]
	async fn unknown_subjects_fail_typed() {
		let provider = StoredProvider::new(
			Arc::new(MemoryStore::default()),
			ScriptedRefresher::succeeding(),
		);
		let err = provider
			.access_token(&subject())
			.await
			.expect_err("Unknown subjects must fail.");

		assert!(matches!(err, Error::UnknownSubject { .. }));
		assert!(err.is_authorization_failure());
	}

	#[tokio::test]
	async fn expiring_credentials_refresh_once_under_concurrency() {
		let store_backend = Arc::new(MemoryStore::default());
		let refresher = ScriptedRefresher::succeeding();
		let provider = Arc::new(StoredProvider::new(store_backend.clone(), refresher.clone()));
		let issued = OffsetDateTime::now_utc() - Duration::minutes(5);
		let credential = CredentialSet::builder(subject())
			.access_token("stored-access")
			.refresh_token("stored-refresh")
			.issued_at(issued)
			.expires_at(issued + Duration::minutes(6))
			.build()
			.expect("Expiring credential fixture should build.");

		store_backend.save(credential).await.expect("Seeding the store should succeed.");

		let subject = subject();
		let (a, b, c) = tokio::join!(
			provider.access_token(&subject),
			provider.access_token(&subject),
			provider.access_token(&subject),
		);

		for token in [a, b, c] {
			let token = token.expect("Concurrent renewals should all succeed.");

			assert_eq!(token.expose(), "renewed-access");
		}

		assert_eq!(refresher.calls(), 1, "Exactly one exchange may happen per subject.");

		let stored = store_backend
			.fetch(&subject)
			.await
			.expect("Fetching the renewed set should succeed.")
			.expect("Renewed set should be persisted.");

		assert_eq!(stored.access_token.expose(), "renewed-access");
		assert_eq!(
			stored.refresh.refresh_token().map(TokenSecret::expose),
			Some("renewed-refresh")
		);
	}

	#[tokio::test]
	async fn failed_refresh_leaves_stored_state_untouched() {
		let store_backend = Arc::new(MemoryStore::default());
		let refresher = ScriptedRefresher::rejecting();
		let provider = StoredProvider::new(store_backend.clone(), refresher.clone());
		let issued = OffsetDateTime::now_utc() - Duration::hours(1);
		let credential = CredentialSet::builder(subject())
			.access_token("stored-access")
			.refresh_token("stored-refresh")
			.issued_at(issued)
			.expires_at(issued + Duration::minutes(30))
			.build()
			.expect("Expired credential fixture should build.");

		store_backend.save(credential.clone()).await.expect("Seeding the store should succeed.");

		let err = provider
			.access_token(&subject())
			.await
			.expect_err("A rejected refresh must propagate.");

		assert!(matches!(err, Error::RefreshFailed { .. }));
		assert_eq!(refresher.calls(), 1);

		let untouched = store_backend
			.fetch(&subject())
			.await
			.expect("Fetching after a failed refresh should succeed.")
			.expect("The prior record must remain present.");

		assert_eq!(untouched, credential, "Failed refreshes must not corrupt stored state.");
	}

	#[tokio::test]
	async fn non_refreshable_sets_are_never_auto_refreshed() {
		let store_backend = Arc::new(MemoryStore::default());
		let refresher = ScriptedRefresher::succeeding();
		let provider = StoredProvider::new(store_backend.clone(), refresher.clone());
		let issued = OffsetDateTime::now_utc() - Duration::minutes(5);
		let inside_buffer = CredentialSet::builder(subject())
			.access_token("pinned-access")
			.issued_at(issued)
			.expires_at(issued + Duration::minutes(7))
			.build()
			.expect("Non-refreshable fixture should build.");

		store_backend.save(inside_buffer).await.expect("Seeding the store should succeed.");

		let token = provider
			.access_token(&subject())
			.await
			.expect("A live non-refreshable token should still be served.");

		assert_eq!(token.expose(), "pinned-access");
		assert_eq!(refresher.calls(), 0);

		let expired = CredentialSet::builder(subject())
			.access_token("pinned-access")
			.issued_at(issued)
			.expires_at(issued + Duration::minutes(1))
			.build()
			.expect("Expired non-refreshable fixture should build.");

		store_backend.save(expired).await.expect("Replacing the store entry should succeed.");

		let err = provider
			.access_token(&subject())
			.await
			.expect_err("Expired non-refreshable sets must fail.");

		assert!(matches!(err, Error::ExpiredCredential { .. }));
		assert_eq!(refresher.calls(), 0, "No handshake may run without a refresh token.");
	}
}
