//! Signed session token issuance and validation for multi-tenant request routing.
//!
//! Inbound requests in remote mode carry an `Authorization: Bearer <session>` header
//! whose value is an HS256-signed token minted at first successful authorization. The
//! verifier extracts and validates the caller's identity so requests can be routed to
//! the correct credential set; tampered, foreign, or expired tokens surface as
//! authorization failures, never as generic server errors.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
	errors::ErrorKind as JwtErrorKind,
};
// self
use crate::{
	_prelude::*,
	auth::SubjectId,
	config::SigningSecret,
	obs::{FlowKind, FlowSpan},
};

/// Default lifetime for newly issued session tokens.
pub const SESSION_TTL: Duration = Duration::hours(12);

#[derive(Serialize, Deserialize)]
struct SessionClaims {
	sub: String,
	iat: i64,
	exp: i64,
}

/// Validates inbound session tokens against the configured signing secret.
pub struct SessionVerifier {
	decoding: DecodingKey,
	validation: Validation,
}
impl SessionVerifier {
	/// Creates a verifier bound to the process signing secret.
	pub fn new(secret: &SigningSecret) -> Self {
		let mut validation = Validation::new(Algorithm::HS256);

		// No leeway: an expired session must be rejected deterministically.
		validation.leeway = 0;

		Self { decoding: DecodingKey::from_secret(secret.expose().as_bytes()), validation }
	}

	/// Extracts and validates the subject identity from an `Authorization` header value.
	pub fn subject_from_auth(&self, header: &str) -> Result<SubjectId> {
		let _guard = FlowSpan::new(FlowKind::Session, "subject_from_auth").entered();
		let token = bearer_value(header)?;
		let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)
			.map_err(|e| Error::InvalidSession { reason: describe_jwt_error(&e) })?;

		SubjectId::new(&data.claims.sub)
			.map_err(|e| Error::InvalidSession { reason: e.to_string() })
	}
}
impl Debug for SessionVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionVerifier").finish_non_exhaustive()
	}
}

/// Signs a session token for the subject, valid for `ttl` from now.
pub fn issue_session(
	secret: &SigningSecret,
	subject: &SubjectId,
	ttl: Duration,
) -> Result<String> {
	let now = OffsetDateTime::now_utc();
	let claims = SessionClaims {
		sub: subject.as_ref().to_owned(),
		iat: now.unix_timestamp(),
		exp: (now + ttl).unix_timestamp(),
	};
	let token = encode(
		&Header::new(Algorithm::HS256),
		&claims,
		&EncodingKey::from_secret(secret.expose().as_bytes()),
	)
	.map_err(crate::error::ConfigError::from)?;

	Ok(token)
}

fn bearer_value(header: &str) -> Result<&str> {
	let trimmed = header.trim();
	let (scheme, value) = trimmed.split_once(' ').ok_or_else(|| Error::InvalidSession {
		reason: "authorization header is not a bearer credential".into(),
	})?;

	if !scheme.eq_ignore_ascii_case("bearer") {
		return Err(Error::InvalidSession {
			reason: format!("unsupported authorization scheme `{scheme}`"),
		});
	}

	let value = value.trim();

	if value.is_empty() {
		return Err(Error::InvalidSession { reason: "bearer value is empty".into() });
	}

	Ok(value)
}

fn describe_jwt_error(error: &jsonwebtoken::errors::Error) -> String {
	match error.kind() {
		JwtErrorKind::ExpiredSignature => "session has expired".into(),
		JwtErrorKind::InvalidSignature => "signature does not match the configured secret".into(),
		JwtErrorKind::InvalidToken => "token is malformed".into(),
		other => format!("{other:?}"),
	}
}
