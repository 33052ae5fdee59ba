//! Env-backed single-tenant [`TokenProvider`] for local deployments.

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenSecret},
	error::ConfigError,
	provider::{ProviderFuture, TokenProvider},
};

const ACCESS_TOKEN_VAR: &str = "STEWARD_ACCESS_TOKEN";
const EXPIRES_AT_VAR: &str = "STEWARD_ACCESS_TOKEN_EXPIRES_AT";

/// Serves one fixed access token read from process configuration at construction.
///
/// The provider is single-tenant: the subject argument only flows into error
/// reporting. There is no refresh capability; once the configured token passes its
/// expiry every call fails until the operator provisions a new one.
#[derive(Clone, Debug)]
pub struct EnvProvider {
	access_token: TokenSecret,
	expires_at: Option<OffsetDateTime>,
}
impl EnvProvider {
	/// Creates a provider around an explicit token and optional absolute expiry.
	pub fn new(access_token: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
		Self { access_token: TokenSecret::new(access_token), expires_at }
	}

	/// Reads the token pair from process environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub(crate) fn from_lookup(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		let access_token = lookup(ACCESS_TOKEN_VAR)
			.filter(|value| !value.is_empty())
			.ok_or(ConfigError::MissingVar { name: ACCESS_TOKEN_VAR })?;
		let expires_at = lookup(EXPIRES_AT_VAR)
			.map(|raw| {
				OffsetDateTime::parse(&raw, &Rfc3339).map_err(|e| ConfigError::InvalidVar {
					name: EXPIRES_AT_VAR,
					reason: e.to_string(),
				})
			})
			.transpose()?;

		Ok(Self::new(access_token, expires_at))
	}
}
impl TokenProvider for EnvProvider {
	fn access_token<'a>(&'a self, subject: &'a SubjectId) -> ProviderFuture<'a, TokenSecret> {
		Box::pin(async move {
			if let Some(expires_at) = self.expires_at {
				if OffsetDateTime::now_utc() >= expires_at {
					return Err(Error::ExpiredCredential { subject: subject.clone() });
				}
			}

			Ok(self.access_token.clone())
		})
	}
}
