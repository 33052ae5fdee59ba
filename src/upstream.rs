//! Fixed upstream endpoints and response budgeting shared by API callers.

// std
use std::borrow::Cow;

/// Token endpoint of the upstream authorization service.
pub const TOKEN_ENDPOINT: &str = "https://identity.hostedledger.com/oauth2/token";
/// Base URL of the upstream resource API.
pub const RESOURCE_BASE: &str = "https://api.hostedledger.com/v1/";
/// Page size applied when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size the upstream API honors.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Character budget for a single upstream response payload handed to callers.
pub const RESPONSE_CHAR_LIMIT: usize = 10_000;

/// Validated page size for upstream listing calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page(u32);
impl Page {
	/// Clamps a requested page size into the `1..=`[`MAX_PAGE_SIZE`] range.
	pub fn clamped(requested: Option<u32>) -> Self {
		match requested {
			None => Self(DEFAULT_PAGE_SIZE),
			Some(size) => Self(size.clamp(1, MAX_PAGE_SIZE)),
		}
	}

	/// Returns the effective page size.
	pub fn size(self) -> u32 {
		self.0
	}
}
impl Default for Page {
	fn default() -> Self {
		Self(DEFAULT_PAGE_SIZE)
	}
}

/// Truncates an upstream response payload to [`RESPONSE_CHAR_LIMIT`] characters.
///
/// Truncation counts characters rather than bytes so multi-byte payloads are never
/// split mid-character; a trailing ellipsis marks the cut.
pub fn truncate_response(body: &str) -> Cow<'_, str> {
	if body.chars().count() <= RESPONSE_CHAR_LIMIT {
		return Cow::Borrowed(body);
	}

	let mut buf: String = body.chars().take(RESPONSE_CHAR_LIMIT).collect();

	buf.push('…');

	Cow::Owned(buf)
}
