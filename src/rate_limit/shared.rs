//! Thread-safe limiter handle for multi-threaded hosts.
//!
//! [`KeyedRateLimiter`] splits "check" from "track", which lets two
//! concurrent callers both pass the check before either records. The shared
//! handle keeps that split available for callers that want it, and adds
//! [`SharedRateLimiter::check_and_track`], which does both under one lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::GuardError;
use crate::rate_limit::response::RateLimitRejection;
use crate::rate_limit::{KeyedRateLimiter, RateLimitConfig};

/// Point-in-time view of one key's limit, used to build response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Maximum requests per window.
    pub limit: u32,
    /// Requests still available in the current window.
    pub remaining: u32,
    /// Seconds until the next slot opens (`0` when one is open now).
    pub wait_time_secs: u64,
    /// When the status was taken, in milliseconds since the UNIX epoch.
    pub now_ms: u64,
}

impl RateLimitStatus {
    /// Whether a request would be allowed.
    pub fn is_allowed(&self) -> bool {
        self.remaining > 0
    }

    /// Convert a denied status into the value a route returns with its 429.
    pub fn rejection(&self) -> RateLimitRejection {
        RateLimitRejection::new(
            self.limit,
            self.remaining,
            self.now_ms
                .saturating_add(self.wait_time_secs.saturating_mul(1000)),
            self.wait_time_secs,
        )
    }
}

/// A named, cloneable rate limiter shared between request handlers.
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    name: Arc<str>,
    inner: Arc<Mutex<KeyedRateLimiter<String>>>,
}

impl SharedRateLimiter {
    /// Create a shared limiter from a configuration, reading the system clock.
    pub fn new(name: impl Into<Arc<str>>, config: RateLimitConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a shared limiter with an explicit time source.
    pub fn with_clock(
        name: impl Into<Arc<str>>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(KeyedRateLimiter::with_clock(
                config.window,
                config.max_requests,
                clock,
            ))),
        }
    }

    /// The limiter's name (e.g. `"chat"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, KeyedRateLimiter<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`KeyedRateLimiter::can_make_request`].
    pub fn can_make_request(&self, key: &str) -> bool {
        self.lock().can_make_request(key)
    }

    /// See [`KeyedRateLimiter::track_request`].
    pub fn track_request(&self, key: &str) {
        self.lock().track_request(key);
    }

    /// See [`KeyedRateLimiter::time_until_next_slot`].
    pub fn time_until_next_slot(&self, key: &str) -> u64 {
        self.lock().time_until_next_slot(key)
    }

    /// Check and record under a single lock.
    ///
    /// Returns `Err(wait_time_secs)` when the key is over its limit.
    pub fn check_and_track(&self, key: &str) -> Result<(), u64> {
        let mut limiter = self.lock();
        if limiter.can_make_request(key) {
            limiter.track_request(key);
            Ok(())
        } else {
            let wait = limiter.time_until_next_slot(key);
            tracing::debug!(limiter = %self.name, key, wait_secs = wait, "rate limited");
            Err(wait)
        }
    }

    /// Take a consistent snapshot of the key's limit.
    pub fn snapshot(&self, key: &str) -> RateLimitStatus {
        let mut limiter = self.lock();
        let wait_time_secs = limiter.time_until_next_slot(key);
        RateLimitStatus {
            limit: limiter.max_requests(),
            remaining: limiter.remaining(key),
            wait_time_secs,
            now_ms: limiter.clock().now_ms(),
        }
    }

    /// Wait until the key has a free slot, then record the request.
    ///
    /// A limiter configured with `max_requests == 0` never frees a slot, so
    /// this returns [`GuardError::RateLimitExceeded`] right away instead of waiting.
    pub async fn wait_for_slot(&self, key: &str) -> Result<(), GuardError> {
        if self.lock().max_requests() == 0 {
            return Err(GuardError::RateLimitExceeded {
                retry_after_ms: None,
            });
        }

        loop {
            let acquired = self.lock().try_acquire(key);
            match acquired {
                Ok(()) => return Ok(()),
                Err(wait_time) => {
                    tracing::debug!(limiter = %self.name, key, ?wait_time, "waiting for a free slot");
                    tokio::time::sleep(wait_time.max(Duration::from_millis(1))).await;
                }
            }
        }
    }

    /// Drop keys whose whole log has aged out.
    pub fn cleanup(&self) {
        self.lock().cleanup();
    }

    /// Number of keys being tracked.
    pub fn tracked_keys(&self) -> usize {
        self.lock().tracked_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn shared(max: u32, clock: &Arc<ManualClock>) -> SharedRateLimiter {
        SharedRateLimiter::with_clock(
            "test",
            RateLimitConfig::new(max, Duration::from_secs(60)),
            clock.clone(),
        )
    }

    #[test]
    fn test_check_and_track() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = shared(2, &clock);

        assert!(limiter.check_and_track("ip").is_ok());
        assert!(limiter.check_and_track("ip").is_ok());
        assert_eq!(limiter.check_and_track("ip"), Err(60));

        clock.set(60_001);
        assert!(limiter.check_and_track("ip").is_ok());
    }

    #[test]
    fn test_check_and_track_never_exceeds_limit_across_threads() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = shared(25, &clock);
        let mut handles = vec![];

        for _ in 0..8 {
            let l = limiter.clone();
            handles.push(thread::spawn(move || {
                (0..10).filter(|_| l.check_and_track("shared").is_ok()).count()
            }));
        }

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 25);
    }

    #[test]
    fn test_snapshot_and_rejection() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = shared(1, &clock);

        let status = limiter.snapshot("k");
        assert!(status.is_allowed());
        assert_eq!(status.wait_time_secs, 0);

        limiter.track_request("k");
        clock.advance(30_000);
        let status = limiter.snapshot("k");
        assert!(!status.is_allowed());
        assert_eq!(status.limit, 1);
        assert_eq!(status.wait_time_secs, 30);

        let rejection = status.rejection();
        assert_eq!(rejection.reset_at_ms, 31_000 + 30_000);
        assert_eq!(rejection.wait_time_secs, 30);
    }

    #[test]
    fn test_rejection_reset_saturates_for_huge_window() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = SharedRateLimiter::with_clock(
            "test",
            RateLimitConfig::new(1, Duration::from_millis(u64::MAX)),
            clock.clone(),
        );

        limiter.track_request("k");
        let status = limiter.snapshot("k");
        assert!(status.wait_time_secs > u64::MAX / 1000 - 1);

        let rejection = status.rejection();
        assert_eq!(rejection.reset_at_ms, u64::MAX);
        assert_eq!(rejection.wait_time_secs, status.wait_time_secs);
    }

    #[tokio::test]
    async fn test_wait_for_slot_rejects_zero_limit() {
        let limiter =
            SharedRateLimiter::new("closed", RateLimitConfig::new(0, Duration::from_secs(60)));

        let waited = tokio::time::timeout(Duration::from_secs(1), limiter.wait_for_slot("k"))
            .await
            .expect("returns without waiting");
        let err = waited.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let clock = Arc::new(ManualClock::new(0));
        let a = shared(1, &clock);
        let b = a.clone();

        a.track_request("k");
        assert!(!b.can_make_request("k"));
        assert_eq!(b.name(), "test");
    }

    #[tokio::test]
    async fn test_wait_for_slot_sleeps_until_free() {
        let limiter =
            SharedRateLimiter::new("wall", RateLimitConfig::new(1, Duration::from_millis(50)));

        limiter.wait_for_slot("k").await.unwrap();
        let started = std::time::Instant::now();
        limiter.wait_for_slot("k").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(!limiter.can_make_request("k"));
    }
}
