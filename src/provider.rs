//! Token provider capability interface and its built-in variants.
//!
//! A provider answers one question: "give me a currently valid access token for this
//! subject". The variant is selected once at construction via the registry factory
//! (env-backed for local deployments, storage-backed for remote multi-tenant ones)
//! and never re-checked per call.

pub mod env;
pub mod stored;

pub use env::EnvProvider;
pub use stored::StoredProvider;

// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenSecret},
};

/// Boxed future returned by [`TokenProvider`] operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Capability interface supplying valid access tokens to API callers.
pub trait TokenProvider
where
	Self: Send + Sync,
{
	/// Returns an access token for the subject that is valid at the time of the call.
	///
	/// Implementations renew expiring credentials transparently when they can; a
	/// provider without renewal capability fails with
	/// [`Error::ExpiredCredential`] instead of attempting recovery.
	fn access_token<'a>(&'a self, subject: &'a SubjectId) -> ProviderFuture<'a, TokenSecret>;
}
