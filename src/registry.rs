//! Process-wide provider selection with explicit initialization and lazy fallback.
//!
//! The registry is an explicit context object handed to entry points rather than an
//! unguarded global: startup code calls [`ProviderRegistry::initialize`] exactly once,
//! while a bare [`ProviderRegistry::get`] before initialization lazily constructs and
//! caches the env-backed default. Tests swap the default through
//! [`ProviderRegistry::with_default_factory`] and clear cached state with
//! [`ProviderRegistry::reset`], so no state leaks across cases.

// self
use crate::{
	_prelude::*,
	config::{Config, DeployMode},
	provider::{EnvProvider, TokenProvider},
};
#[cfg(feature = "reqwest")]
use crate::{oauth::OAuthProxy, provider::StoredProvider, rate_limit::FixedWindowLimiter, store};

type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn TokenProvider>> + Send + Sync>;

/// Holds the process's active token provider.
pub struct ProviderRegistry {
	active: RwLock<Option<Arc<dyn TokenProvider>>>,
	default_factory: ProviderFactory,
}
impl ProviderRegistry {
	/// Creates an empty registry whose lazy default is the env-backed provider.
	pub fn new() -> Self {
		Self::with_default_factory(|| Ok(Arc::new(EnvProvider::from_env()?)))
	}

	/// Creates an empty registry with a custom lazy-default constructor.
	pub fn with_default_factory(
		factory: impl Fn() -> Result<Arc<dyn TokenProvider>> + Send + Sync + 'static,
	) -> Self {
		Self { active: RwLock::new(None), default_factory: Box::new(factory) }
	}

	/// Sets the active provider; last write wins.
	pub fn initialize(&self, provider: Arc<dyn TokenProvider>) {
		*self.active.write() = Some(provider);
	}

	/// Returns the active provider, lazily constructing and caching the default if
	/// none was initialized.
	pub fn get(&self) -> Result<Arc<dyn TokenProvider>> {
		if let Some(provider) = self.active.read().clone() {
			return Ok(provider);
		}

		let mut slot = self.active.write();

		// A concurrent get may have populated the slot between the read and the write.
		if let Some(provider) = slot.clone() {
			return Ok(provider);
		}

		let provider = (self.default_factory)()?;

		*slot = Some(provider.clone());

		Ok(provider)
	}

	/// Clears the cached provider so the next [`get`](Self::get) re-resolves it.
	pub fn reset(&self) {
		*self.active.write() = None;
	}

	/// Builds the provider variant for a deployment mode without touching any
	/// registry state.
	pub fn create(mode: DeployMode, config: &Config) -> Result<Arc<dyn TokenProvider>> {
		match mode {
			DeployMode::Local => Ok(Arc::new(EnvProvider::from_env()?)),
			#[cfg(feature = "reqwest")]
			DeployMode::Remote => {
				let limiter = Arc::new(FixedWindowLimiter::default());
				let proxy = OAuthProxy::from_config(config, limiter)?;

				Ok(Arc::new(StoredProvider::new(store::from_env()?, Arc::new(proxy))))
			},
			#[cfg(not(feature = "reqwest"))]
			DeployMode::Remote => {
				let _ = config;

				Err(crate::error::ConfigError::InvalidVar {
					name: "STEWARD_MODE",
					reason: "remote mode requires the `reqwest` feature".into(),
				}
				.into())
			},
		}
	}
}
impl Default for ProviderRegistry {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for ProviderRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderRegistry")
			.field("initialized", &self.active.read().is_some())
			.finish_non_exhaustive()
	}
}
