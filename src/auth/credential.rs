//! Credential set model, refresh capability states, and builders.

// crates.io
use serde::{Deserializer, Serializer};
// self
use crate::{
	_prelude::*,
	auth::{id::SubjectId, secret::TokenSecret},
};

/// Safety margin before actual expiry at which a token is proactively renewed.
pub const REFRESH_BUFFER: Duration = Duration::minutes(5);

/// Errors produced by [`CredentialSetBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuildError {
	/// Issued when no usable access token value was provided.
	#[error("Access token is required and cannot be empty.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry does not lie after the issued-at instant.
	#[error("Expiry must lie after the issued-at instant.")]
	NonPositiveLifetime,
}

/// Whether a credential set can be renewed without re-authorization.
///
/// Env-pinned local credentials are [`NonRefreshable`](Self::NonRefreshable); the
/// refresh handshake only ever receives the secret carried by
/// [`Refreshable`](Self::Refreshable), so the renewal path cannot be reached for sets
/// that lack one.
#[derive(Clone, PartialEq, Eq)]
pub enum RefreshMode {
	/// The set carries a refresh token and may be renewed upstream.
	Refreshable(TokenSecret),
	/// The set has no refresh token and must never be auto-refreshed.
	NonRefreshable,
}
impl RefreshMode {
	/// Returns the refresh secret when the set is renewable.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		match self {
			Self::Refreshable(secret) => Some(secret),
			Self::NonRefreshable => None,
		}
	}
}
impl Debug for RefreshMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Refreshable(_) => f.write_str("Refreshable(<redacted>)"),
			Self::NonRefreshable => f.write_str("NonRefreshable"),
		}
	}
}
// The wire shape is a nullable string so stored records read as plain
// `refresh_token` fields regardless of backend.
impl Serialize for RefreshMode {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		self.refresh_token().serialize(serializer)
	}
}
impl<'de> Deserialize<'de> for RefreshMode {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secret = <Option<TokenSecret>>::deserialize(deserializer)?;

		Ok(match secret {
			Some(secret) => Self::Refreshable(secret),
			None => Self::NonRefreshable,
		})
	}
}

/// One subject's authorization state.
///
/// A set is created at first successful authorization or manual provisioning, replaced
/// wholesale by a successful refresh, and deleted on revocation or tenant removal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
	/// Subject the credentials were issued for.
	pub subject: SubjectId,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh capability, carrying the refresh secret when present.
	#[serde(rename = "refresh_token")]
	pub refresh: RefreshMode,
	/// Issued-at instant recorded from the authorization response.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from issued_at plus expires_in or absolute expiry.
	pub expires_at: OffsetDateTime,
	/// Scope string granted upstream, if any.
	pub scope: Option<String>,
}
impl CredentialSet {
	/// Returns a builder for the provided subject.
	pub fn builder(subject: SubjectId) -> CredentialSetBuilder {
		CredentialSetBuilder::new(subject)
	}

	/// Returns `true` if the set has passed its expiry at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the set is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` once the instant lies inside the proactive renewal window.
	///
	/// A set is renewed `buffer` ahead of expiry so callers never receive a token that
	/// dies mid-flight of their next upstream request.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, buffer: Duration) -> bool {
		instant >= self.expires_at - buffer
	}
}
impl Debug for CredentialSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialSet")
			.field("subject", &self.subject)
			.field("access_token", &"<redacted>")
			.field("refresh", &self.refresh)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Builder for [`CredentialSet`].
#[derive(Clone, Debug)]
pub struct CredentialSetBuilder {
	subject: SubjectId,
	access_token: Option<TokenSecret>,
	refresh: RefreshMode,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	scope: Option<String>,
}
impl CredentialSetBuilder {
	fn new(subject: SubjectId) -> Self {
		Self {
			subject,
			access_token: None,
			refresh: RefreshMode::NonRefreshable,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			scope: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value, marking the set renewable.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh = RefreshMode::Refreshable(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Records the scope string granted upstream.
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Consumes the builder and produces a [`CredentialSet`].
	pub fn build(self) -> Result<CredentialSet, CredentialBuildError> {
		let access_token = self
			.access_token
			.filter(|secret| !secret.is_empty())
			.ok_or(CredentialBuildError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialBuildError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(CredentialBuildError::NonPositiveLifetime);
		}

		Ok(CredentialSet {
			subject: self.subject,
			access_token,
			refresh: self.refresh,
			issued_at,
			expires_at,
			scope: self.scope,
		})
	}
}
