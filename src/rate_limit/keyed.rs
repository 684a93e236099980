//! Per-key sliding window rate limiting.
//!
//! Each key (user id, client IP, or a fixed name for a shared upstream
//! credential) gets its own log of request timestamps. Old timestamps are
//! pruned lazily whenever the key is looked at.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use portfolio_guard::rate_limit::KeyedRateLimiter;
//!
//! let mut limiter: KeyedRateLimiter<String> = KeyedRateLimiter::new(
//!     Duration::from_secs(60), // Window size
//!     3,                       // Max requests per window
//! );
//!
//! if limiter.can_make_request("203.0.113.7") {
//!     limiter.track_request("203.0.113.7");
//! }
//! assert_eq!(limiter.remaining("203.0.113.7"), 2);
//! ```

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock, ceil_secs};

/// Per-key rate limiter using a sliding window algorithm.
///
/// `can_make_request` and `track_request` are deliberately separate calls:
/// callers check, contact the upstream, then record. Use
/// [`try_acquire`](Self::try_acquire) or a
/// [`SharedRateLimiter`](super::SharedRateLimiter) when the two must happen
/// as one step.
#[derive(Debug)]
pub struct KeyedRateLimiter<K> {
    /// Request logs per key
    limiters: HashMap<K, SlidingWindow>,
    /// Window duration
    window: Duration,
    /// Maximum requests per window
    max_requests: u32,
    clock: Arc<dyn Clock>,
}

impl<K> KeyedRateLimiter<K>
where
    K: Hash + Eq,
{
    /// Create a new per-key rate limiter reading the system clock.
    ///
    /// # Arguments
    ///
    /// * `window` - The sliding window duration
    /// * `max_requests` - Maximum number of requests allowed per window
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self::with_clock(window, max_requests, Arc::new(SystemClock))
    }

    /// Create a new per-key rate limiter with an explicit time source.
    pub fn with_clock(window: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiters: HashMap::new(),
            window,
            max_requests,
            clock,
        }
    }

    /// Prune the key's log, then report whether another request fits in the window.
    ///
    /// Does not record anything. Unknown keys are always allowed.
    pub fn can_make_request<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        match self.limiters.get_mut(key) {
            Some(limiter) => {
                limiter.prune(now);
                limiter.would_allow(now)
            }
            None => self.max_requests > 0,
        }
    }

    /// Record a request for the key at the current time.
    ///
    /// Call once per request actually sent upstream, after
    /// [`can_make_request`](Self::can_make_request) returned `true`. Tracking
    /// past the limit is accepted and only logged.
    pub fn track_request<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let now = self.clock.now_ms();
        if !self.limiters.contains_key(key) {
            self.limiters.insert(
                key.to_owned(),
                SlidingWindow::new(self.window, self.max_requests),
            );
        }
        let Some(limiter) = self.limiters.get_mut(key) else {
            return;
        };

        limiter.prune(now);
        if !limiter.would_allow(now) {
            tracing::debug!(
                in_window = limiter.len(),
                max_requests = self.max_requests,
                "request tracked past the rate limit"
            );
        }
        limiter.record(now);
    }

    /// Seconds until the key may make another request, rounded up.
    ///
    /// Returns `0` when a request is allowed right now, and at least `1` otherwise.
    pub fn time_until_next_slot<Q>(&mut self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.max_requests == 0 {
            return ceil_secs(self.window_ms()).max(1);
        }

        let now = self.clock.now_ms();
        self.limiters.get_mut(key).map_or(0, |limiter| {
            limiter.prune(now);
            limiter
                .time_until_available(now)
                .map_or(0, |wait| ceil_secs(wait).max(1))
        })
    }

    /// Check and record in one call.
    ///
    /// Returns `Ok(())` if the request is allowed (and now tracked), or
    /// `Err(wait_time)` if the rate limit has been exceeded.
    pub fn try_acquire<Q>(&mut self, key: &Q) -> Result<(), Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if self.can_make_request(key) {
            self.track_request(key);
            return Ok(());
        }

        if self.max_requests == 0 {
            return Err(self.window);
        }

        let now = self.clock.now_ms();
        let wait = self
            .limiters
            .get(key)
            .and_then(|limiter| limiter.time_until_available(now))
            .unwrap_or_default();
        Err(Duration::from_millis(wait))
    }

    /// Get the remaining permits for a key within the current window.
    pub fn remaining<Q>(&self, key: &Q) -> u32
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now_ms();
        self.limiters
            .get(key)
            .map_or(self.max_requests, |limiter| limiter.remaining(now))
    }

    /// Remove all rate limit tracking for a specific key.
    pub fn remove<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.limiters.remove(key);
    }

    /// Drop keys whose whole log has aged out of the window.
    ///
    /// Nothing calls this implicitly; long-lived hosts should run it periodically.
    pub fn cleanup(&mut self) {
        let now = self.clock.now_ms();
        self.limiters.retain(|_, limiter| !limiter.is_empty(now));
    }

    /// Get the number of keys being tracked.
    pub fn tracked_keys(&self) -> usize {
        self.limiters.len()
    }

    /// Clear all rate limit tracking.
    pub fn clear(&mut self) {
        self.limiters.clear();
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The time source this limiter reads.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

impl<K> Default for KeyedRateLimiter<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new(super::DEFAULT_WINDOW, super::DEFAULT_MAX_REQUESTS)
    }
}

/// The request log of a single key.
///
/// Timestamps are milliseconds since the UNIX epoch, oldest first. All
/// methods take `now` explicitly so the log itself has no notion of time.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Request timestamps
    requests: Vec<u64>,
    /// Window length in milliseconds
    window_ms: u64,
    /// Maximum requests per window
    max_requests: u32,
}

impl SlidingWindow {
    /// Create an empty log for the given window and limit.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            requests: Vec::with_capacity(max_requests as usize),
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            max_requests,
        }
    }

    /// Earliest timestamp still inside the window ending at `now`.
    fn cutoff(&self, now: u64) -> u64 {
        now.saturating_sub(self.window_ms)
    }

    /// Drop timestamps older than `now - window`.
    pub fn prune(&mut self, now: u64) {
        let cutoff = self.cutoff(now);
        self.requests.retain(|&ts| ts >= cutoff);
    }

    /// Append a request timestamp.
    pub fn record(&mut self, now: u64) {
        self.requests.push(now);
    }

    /// Number of requests inside the window ending at `now`.
    pub fn count(&self, now: u64) -> usize {
        let cutoff = self.cutoff(now);
        self.requests.iter().filter(|&&ts| ts >= cutoff).count()
    }

    /// Check if a request would be allowed without recording it.
    pub fn would_allow(&self, now: u64) -> bool {
        (self.count(now) as u64) < u64::from(self.max_requests)
    }

    /// Get the number of remaining permits.
    pub fn remaining(&self, now: u64) -> u32 {
        let count = u32::try_from(self.count(now)).unwrap_or(u32::MAX);
        self.max_requests.saturating_sub(count)
    }

    /// Milliseconds until enough in-window requests leave the window to free a permit.
    ///
    /// With `count` requests in the window, the one that has to expire is at
    /// position `count - max_requests`, which is the oldest one unless the key
    /// was tracked past its limit. Returns `None` if a permit is available now.
    pub fn time_until_available(&self, now: u64) -> Option<u64> {
        if self.would_allow(now) {
            return None;
        }
        if self.max_requests == 0 {
            return Some(self.window_ms);
        }

        let cutoff = self.cutoff(now);
        let excess = self.count(now) - self.max_requests as usize;
        self.requests
            .iter()
            .filter(|&&ts| ts >= cutoff)
            .nth(excess)
            .map(|&blocking| self.window_ms.saturating_sub(now.saturating_sub(blocking)))
    }

    /// Check if the window has no active requests.
    pub fn is_empty(&self, now: u64) -> bool {
        self.count(now) == 0
    }

    /// Number of stored timestamps, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.requests.len()
    }
}
