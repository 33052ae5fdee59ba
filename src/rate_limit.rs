//! Fixed-window admission control for upstream API calls.
//!
//! The upstream accounting API accounts requests against a fixed 25-per-5-second
//! quota, so the steward mirrors that bookkeeping exactly: a window counter that
//! resets at fixed boundaries rather than sliding. Burst-at-boundary behavior matches
//! the upstream's own documented accounting. Every component issuing upstream calls,
//! including the refresh handshake, consults [`FixedWindowLimiter::admit`] first.
//! Admission order under contention follows mutex acquisition order (best effort,
//! no FIFO queue).

// self
use crate::_prelude::*;

/// Quota configuration for a fixed accounting window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateQuota {
	/// Maximum admissions per window.
	pub max_requests: u32,
	/// Window length.
	pub window: Duration,
}

/// Quota enforced by the upstream accounting API.
pub const UPSTREAM_QUOTA: RateQuota =
	RateQuota { max_requests: 25, window: Duration::milliseconds(5000) };

#[derive(Clone, Copy, Debug)]
struct RateWindow {
	started_at: OffsetDateTime,
	count: u32,
}

/// Shared fixed-window counter guarding the upstream quota.
#[derive(Debug)]
pub struct FixedWindowLimiter {
	quota: RateQuota,
	window: Mutex<Option<RateWindow>>,
}
impl FixedWindowLimiter {
	/// Creates a limiter for the provided quota.
	pub fn new(quota: RateQuota) -> Self {
		Self { quota, window: Mutex::new(None) }
	}

	/// Returns the configured quota.
	pub fn quota(&self) -> RateQuota {
		self.quota
	}

	/// Admits one upstream call or fails with [`Error::QuotaExceeded`].
	pub fn admit(&self) -> Result<()> {
		self.admit_at(OffsetDateTime::now_utc())
	}

	/// Admission check against an explicit instant.
	pub fn admit_at(&self, now: OffsetDateTime) -> Result<()> {
		let mut guard = self.window.lock();
		let window = guard.get_or_insert(RateWindow { started_at: now, count: 0 });

		if now - window.started_at >= self.quota.window {
			*window = RateWindow { started_at: now, count: 0 };
		}

		if window.count >= self.quota.max_requests {
			let retry_in = window.started_at + self.quota.window - now;

			return Err(Error::QuotaExceeded { retry_in });
		}

		window.count += 1;

		Ok(())
	}
}
impl Default for FixedWindowLimiter {
	fn default() -> Self {
		Self::new(UPSTREAM_QUOTA)
	}
}
