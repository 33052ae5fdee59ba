#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use token_steward::{
	auth::{CredentialSet, SubjectId, TokenSecret},
	error::Error,
	oauth::OAuthProxy,
	provider::{StoredProvider, TokenProvider},
	rate_limit::{FixedWindowLimiter, RateQuota},
	store::{MemoryStore, TokenStore},
};

fn build_proxy(server: &MockServer, limiter: Arc<FixedWindowLimiter>) -> OAuthProxy {
	let endpoint = Url::parse(&server.url("/oauth2/token"))
		.expect("Mock token endpoint should parse successfully.");

	OAuthProxy::new(endpoint, "client-refresh", Some("secret-refresh"), limiter)
		.expect("OAuth proxy fixture should build successfully.")
}

fn build_provider(server: &MockServer) -> (StoredProvider, Arc<MemoryStore>) {
	let proxy = build_proxy(server, Arc::new(FixedWindowLimiter::default()));
	let store_backend = Arc::new(MemoryStore::default());
	let provider = StoredProvider::new(store_backend.clone(), Arc::new(proxy));

	(provider, store_backend)
}

fn make_subject(value: &str) -> SubjectId {
	SubjectId::new(value).expect("Subject fixture should be valid.")
}

async fn seed_credential(
	store: &MemoryStore,
	subject: SubjectId,
	access: &str,
	refresh: Option<&str>,
	expires_in: Duration,
) -> CredentialSet {
	let issued = OffsetDateTime::now_utc() - Duration::minutes(5);
	let mut builder = CredentialSet::builder(subject)
		.access_token(access)
		.issued_at(issued)
		.expires_at(issued + expires_in)
		.scope("accounting.read");

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	let credential = builder.build().expect("Credential fixture should build successfully.");

	store
		.save(credential.clone())
		.await
		.expect("Failed to seed credential fixture into the store.");

	credential
}

#[tokio::test]
async fn refresh_rotates_tokens_and_updates_store() {
	let server = MockServer::start_async().await;
	let (provider, store) = build_provider(&server);
	let subject = make_subject("tenant-rotate");

	seed_credential(
		&store,
		subject.clone(),
		"rotating-access",
		Some("rotating-refresh"),
		Duration::minutes(6),
	)
	.await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"bearer\",\"expires_in\":1800}",
				);
		})
		.await;
	let token = provider
		.access_token(&subject)
		.await
		.expect("Refresh inside the renewal window should succeed.");

	mock.assert_async().await;

	assert_eq!(token.expose(), "access-new");

	let stored = store
		.fetch(&subject)
		.await
		.expect("Store fetch should succeed.")
		.expect("Renewed credential should be persisted.");

	assert_eq!(stored.access_token.expose(), "access-new");
	assert_eq!(stored.refresh.refresh_token().map(TokenSecret::expose), Some("refresh-new"));
	assert_eq!(stored.scope.as_deref(), Some("accounting.read"));
	assert!(!stored.is_expired(), "The renewed credential must carry a future expiry.");
}

#[tokio::test]
async fn fresh_credentials_skip_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let (provider, store) = build_provider(&server);
	let subject = make_subject("tenant-fresh");

	seed_credential(
		&store,
		subject.clone(),
		"long-lived-access",
		Some("long-lived-refresh"),
		Duration::hours(3),
	)
	.await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let token = provider
		.access_token(&subject)
		.await
		.expect("A stored token outside the buffer should be served unchanged.");

	assert_eq!(token.expose(), "long-lived-access");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn concurrent_renewals_hit_the_endpoint_once() {
	let server = MockServer::start_async().await;
	let (provider, store) = build_provider(&server);
	let provider = Arc::new(provider);
	let subject = make_subject("tenant-singleflight");

	seed_credential(
		&store,
		subject.clone(),
		"access-soon-expiring",
		Some("refresh-soon-expiring"),
		Duration::minutes(6),
	)
	.await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-singleflight\",\"refresh_token\":\"refresh-singleflight\",\"token_type\":\"bearer\",\"expires_in\":3600}",
				);
		})
		.await;
	let (first, second, third) = tokio::join!(
		provider.access_token(&subject),
		provider.access_token(&subject),
		provider.access_token(&subject),
	);

	for token in [first, second, third] {
		let token = token.expect("Every concurrent caller should receive the renewed token.");

		assert_eq!(token.expose(), "access-singleflight");
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_refresh_preserves_stored_state() {
	let server = MockServer::start_async().await;
	let (provider, store) = build_provider(&server);
	let subject = make_subject("tenant-rejected");
	let seeded = seed_credential(
		&store,
		subject.clone(),
		"access-rejected",
		Some("refresh-rejected"),
		Duration::minutes(2),
	)
	.await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let err = provider
		.access_token(&subject)
		.await
		.expect_err("A rejected refresh token must surface to the caller.");

	assert!(matches!(err, Error::RefreshFailed { .. }));
	assert!(err.is_authorization_failure());

	mock.assert_async().await;

	let untouched = store
		.fetch(&subject)
		.await
		.expect("Store fetch should succeed after a rejected refresh.")
		.expect("The prior credential should remain present.");

	assert_eq!(untouched, seeded, "A failed refresh must leave the stored set unchanged.");
}

#[tokio::test]
async fn missing_rotation_carries_the_refresh_token_forward() {
	let server = MockServer::start_async().await;
	let (provider, store) = build_provider(&server);
	let subject = make_subject("tenant-carry");

	seed_credential(
		&store,
		subject.clone(),
		"access-carry",
		Some("refresh-carry"),
		Duration::minutes(3),
	)
	.await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-carried\",\"token_type\":\"bearer\",\"expires_in\":900}",
				);
		})
		.await;

	provider
		.access_token(&subject)
		.await
		.expect("A refresh without rotation should still succeed.");

	mock.assert_async().await;

	let stored = store
		.fetch(&subject)
		.await
		.expect("Store fetch should succeed.")
		.expect("Renewed credential should be persisted.");

	assert_eq!(
		stored.refresh.refresh_token().map(TokenSecret::expose),
		Some("refresh-carry"),
		"The previous refresh secret must stay attached when upstream omits a new one."
	);
}

#[tokio::test]
async fn exhausted_quota_fails_before_any_upstream_call() {
	let server = MockServer::start_async().await;
	let limiter = Arc::new(FixedWindowLimiter::new(RateQuota {
		max_requests: 1,
		window: Duration::seconds(5),
	}));
	let proxy = build_proxy(&server, limiter.clone());
	let store_backend = Arc::new(MemoryStore::default());
	let provider = StoredProvider::new(store_backend.clone(), Arc::new(proxy));
	let subject = make_subject("tenant-throttled");

	seed_credential(
		&store_backend,
		subject.clone(),
		"access-throttled",
		Some("refresh-throttled"),
		Duration::minutes(2),
	)
	.await;

	limiter.admit().expect("Consuming the only slot in the window should succeed.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let err = provider
		.access_token(&subject)
		.await
		.expect_err("Admission must fail once the window quota is consumed.");

	assert!(matches!(err, Error::QuotaExceeded { .. }));
	assert!(err.is_retryable(), "Quota exhaustion is retryable after the window resets.");

	mock.assert_calls_async(0).await;
}
