//! Time sources for expiry and window math.
//!
//! Every limiter and cache in this crate reads "now" through a [`Clock`]
//! instead of calling the system clock directly, so tests can move time
//! forward without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

/// Trait for providing the current time in milliseconds since the UNIX epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        u64::try_from(millis).unwrap_or_default()
    }
}

/// A clock that only moves when told to.
///
/// Used by tests and demos to step through window and TTL boundaries
/// deterministically.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock starting at the given millisecond timestamp.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Jump to an absolute timestamp.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Convert a millisecond span to whole seconds, rounding up.
pub(crate) fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}
