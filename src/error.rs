//! Steward-level error types shared across providers, stores, and the refresh handshake.

// self
use crate::{_prelude::*, auth::SubjectId};

/// Steward-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical steward error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Upstream failure (network, timeout, malformed response); retry with backoff.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),

	/// No credential set is stored for the requested subject.
	#[error("No stored credentials exist for subject `{subject}`.")]
	UnknownSubject {
		/// Subject whose lookup failed.
		subject: SubjectId,
	},
	/// A non-refreshable credential set has passed its expiry.
	#[error("Credential for subject `{subject}` has expired and cannot be refreshed.")]
	ExpiredCredential {
		/// Subject holding the expired credential.
		subject: SubjectId,
	},
	/// Upstream rejected the refresh token; stored state is left untouched.
	#[error("Upstream rejected the token refresh: {reason}.")]
	RefreshFailed {
		/// Provider- or steward-supplied reason string.
		reason: String,
	},
	/// Inbound session token failed extraction or validation.
	#[error("Session token is invalid: {reason}.")]
	InvalidSession {
		/// Why the session token was rejected.
		reason: String,
	},
	/// The fixed-window request quota is exhausted.
	#[error("Upstream request quota is exhausted; retry in {retry_in}.")]
	QuotaExceeded {
		/// Time remaining until the current window resets.
		retry_in: Duration,
	},
}
impl Error {
	/// Returns `true` when the failure means "the caller is not authorized", as opposed
	/// to "the service is broken". HTTP adapters use this to pick the response class.
	pub fn is_authorization_failure(&self) -> bool {
		matches!(
			self,
			Self::UnknownSubject { .. }
				| Self::ExpiredCredential { .. }
				| Self::RefreshFailed { .. }
				| Self::InvalidSession { .. }
		)
	}

	/// Returns `true` when the caller may retry the same request later.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Upstream(_) | Self::QuotaExceeded { .. })
	}
}

/// Configuration and validation failures raised by the steward.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required configuration variable is absent.
	#[error("Required configuration `{name}` is missing.")]
	MissingVar {
		/// Name of the missing variable.
		name: &'static str,
	},
	/// A configuration variable is present but unusable.
	#[error("Configuration `{name}` is invalid: {reason}.")]
	InvalidVar {
		/// Name of the offending variable.
		name: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),

	/// Credential set builder validation failed.
	#[error("Unable to build credential set.")]
	CredentialBuild(#[from] crate::auth::CredentialBuildError),
	/// Session token could not be signed with the configured secret.
	#[error("Session token could not be signed.")]
	SessionSign(#[from] jsonwebtoken::errors::Error),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Upstream failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// The bounded request timeout elapsed before the endpoint answered.
	#[error("Request timed out while calling the token endpoint.")]
	Timeout,
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Provider- or steward-supplied message summarizing the failure.
		message: String,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
}
impl UpstreamError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for UpstreamError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}
