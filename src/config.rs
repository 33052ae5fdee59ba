//! Process configuration resolved once at startup.
//!
//! Missing required values are fatal startup errors, never runtime-recoverable ones;
//! entry points call [`Config::from_env`] before serving anything.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, error::ConfigError, upstream};

const MODE_VAR: &str = "STEWARD_MODE";
const SERVER_URL_VAR: &str = "STEWARD_SERVER_URL";
const SIGNING_SECRET_VAR: &str = "STEWARD_SIGNING_SECRET";
pub(crate) const CLIENT_ID_VAR: &str = "STEWARD_CLIENT_ID";
const CLIENT_SECRET_VAR: &str = "STEWARD_CLIENT_SECRET";
pub(crate) const TOKEN_ENDPOINT_VAR: &str = "STEWARD_TOKEN_ENDPOINT";

/// Deployment mode the steward was started in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeployMode {
	/// Single-tenant; credentials come directly from process configuration.
	#[default]
	Local,
	/// Multi-tenant; credentials are issued, stored, and refreshed per subject.
	Remote,
}
impl Display for DeployMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			Self::Local => "local",
			Self::Remote => "remote",
		})
	}
}
impl FromStr for DeployMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"local" => Ok(Self::Local),
			"remote" => Ok(Self::Remote),
			other => Err(ConfigError::InvalidVar {
				name: MODE_VAR,
				reason: format!("expected `local` or `remote`, got `{other}`"),
			}),
		}
	}
}

/// Secret used to validate signed session tokens; never printable.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(String);
impl SigningSecret {
	/// Wraps a non-empty secret string.
	pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
		let value = value.into();

		if value.is_empty() {
			return Err(ConfigError::InvalidVar {
				name: SIGNING_SECRET_VAR,
				reason: "secret cannot be empty".into(),
			});
		}

		Ok(Self(value))
	}

	/// Returns the raw secret bytes for signature validation.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Log-safe fingerprint of the secret (truncated base64 SHA-256 digest).
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());
		let mut encoded = STANDARD_NO_PAD.encode(digest);

		encoded.truncate(12);

		encoded
	}
}
impl Debug for SigningSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningSecret").field(&"<redacted>").finish()
	}
}
impl Display for SigningSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Startup configuration shared by entry points, providers, and the refresh handshake.
#[derive(Clone, Debug)]
pub struct Config {
	/// Deployment mode (`local` by default).
	pub mode: DeployMode,
	/// Public URL this server is reachable at.
	pub server_url: Url,
	/// Secret validating inbound session tokens.
	pub signing_secret: SigningSecret,
	/// OAuth 2.0 client identifier registered with the upstream authorization service.
	pub client_id: Option<String>,
	/// Optional confidential client secret.
	pub client_secret: Option<String>,
	/// Upstream token endpoint; fixed default, overridable for testing.
	pub token_endpoint: Url,
}
impl Config {
	/// Loads configuration from process environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub(crate) fn from_lookup(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		let mode = match lookup(MODE_VAR) {
			Some(raw) => raw.parse()?,
			None => DeployMode::default(),
		};
		let server_url = require_url(&lookup, SERVER_URL_VAR)?;
		let signing_secret = SigningSecret::new(
			lookup(SIGNING_SECRET_VAR)
				.ok_or(ConfigError::MissingVar { name: SIGNING_SECRET_VAR })?,
		)?;
		let client_id = lookup(CLIENT_ID_VAR);

		if matches!(mode, DeployMode::Remote) && client_id.is_none() {
			return Err(ConfigError::MissingVar { name: CLIENT_ID_VAR });
		}

		let client_secret = lookup(CLIENT_SECRET_VAR);
		let token_endpoint = match lookup(TOKEN_ENDPOINT_VAR) {
			Some(raw) => parse_url(TOKEN_ENDPOINT_VAR, &raw)?,
			None => Url::parse(upstream::TOKEN_ENDPOINT)
				.expect("Built-in token endpoint constant must parse."),
		};

		Ok(Self { mode, server_url, signing_secret, client_id, client_secret, token_endpoint })
	}
}

fn require_url(
	lookup: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Url, ConfigError> {
	let raw = lookup(name).ok_or(ConfigError::MissingVar { name })?;

	parse_url(name, &raw)
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|e| ConfigError::InvalidVar { name, reason: e.to_string() })
}
