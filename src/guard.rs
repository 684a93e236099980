//! Cache-then-limit wrapper around an upstream call.
//!
//! Route handlers follow the same steps for every rate-limited provider:
//! serve a fresh cached result if there is one, otherwise ask the limiter,
//! call the provider, and cache what came back. [`UpstreamGuard`] does those
//! steps in one place.
//!
//! # Example
//!
//! ```rust,no_run
//! use portfolio_guard::cache::{MARKET_DATA, SharedTtlCache};
//! use portfolio_guard::guard::UpstreamGuard;
//! use portfolio_guard::rate_limit::{RateLimitConfig, SharedRateLimiter};
//! use portfolio_guard::GuardError;
//!
//! # async fn fetch_quotes() -> Result<serde_json::Value, GuardError> { Ok(serde_json::json!({})) }
//! #[tokio::main]
//! async fn main() -> Result<(), GuardError> {
//!     let guard = UpstreamGuard::new(
//!         SharedRateLimiter::new("alpaca", RateLimitConfig::alpaca()),
//!         SharedTtlCache::market_data(),
//!     );
//!
//!     let quotes = guard.get_or_fetch(MARKET_DATA, "alpaca", fetch_quotes).await?;
//!     println!("{:?} ({:?})", quotes.value, quotes.source);
//!     Ok(())
//! }
//! ```

use std::future::Future;

use crate::cache::SharedTtlCache;
use crate::error::GuardError;
use crate::rate_limit::{RateLimitRejection, SharedRateLimiter};

/// Where a guarded value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the cache without contacting the provider.
    Cache,
    /// Fetched from the provider on this call.
    Upstream,
}

/// A value returned by [`UpstreamGuard::get_or_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<V> {
    /// The value.
    pub value: V,
    /// Where it came from.
    pub source: Source,
    /// Seconds of freshness left in the cache.
    pub remaining_ttl_secs: u64,
}

/// One upstream provider's limiter and result cache.
#[derive(Debug, Clone)]
pub struct UpstreamGuard<V> {
    limiter: SharedRateLimiter,
    cache: SharedTtlCache<V>,
}

impl<V: Clone> UpstreamGuard<V> {
    /// Combine a limiter and a cache.
    pub fn new(limiter: SharedRateLimiter, cache: SharedTtlCache<V>) -> Self {
        Self { limiter, cache }
    }

    /// The limiter in front of the provider.
    pub fn limiter(&self) -> &SharedRateLimiter {
        &self.limiter
    }

    /// The result cache.
    pub fn cache(&self) -> &SharedTtlCache<V> {
        &self.cache
    }

    /// Serve `cache_key` from the cache, or fetch it if `client_key` is within its limit.
    ///
    /// A denied caller gets [`GuardError::RateLimitExceeded`]. A failed fetch
    /// is not cached and its error is returned unchanged; the request still
    /// counts against the limit because it reached the provider.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        cache_key: &str,
        client_key: &str,
        fetch: F,
    ) -> Result<Guarded<V>, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, GuardError>>,
    {
        if let Some((value, remaining_ttl_secs)) = self.cache.get_with_ttl(cache_key) {
            tracing::debug!(cache_key, remaining_ttl_secs, "cache hit");
            return Ok(Guarded {
                value,
                source: Source::Cache,
                remaining_ttl_secs,
            });
        }

        tracing::debug!(cache_key, limiter = self.limiter.name(), "cache miss");
        self.limiter
            .check_and_track(client_key)
            .map_err(|wait_secs| GuardError::RateLimitExceeded {
                retry_after_ms: Some(wait_secs.saturating_mul(1000)),
            })?;

        let value = fetch().await?;
        self.cache.set(cache_key, value.clone());

        Ok(Guarded {
            value,
            source: Source::Upstream,
            remaining_ttl_secs: self.cache.remaining_ttl(cache_key),
        })
    }

    /// The 429 payload for a caller the limiter just turned away.
    pub fn rejection_for(&self, client_key: &str) -> RateLimitRejection {
        self.limiter.snapshot(client_key).rejection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::RateLimitConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn guard(clock: &Arc<ManualClock>, max: u32) -> UpstreamGuard<u32> {
        UpstreamGuard::new(
            SharedRateLimiter::with_clock(
                "test",
                RateLimitConfig::new(max, Duration::from_secs(60)),
                clock.clone(),
            ),
            SharedTtlCache::with_clock(Duration::from_secs(30), clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let guard = guard(&clock, 5);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        };

        let first = guard.get_or_fetch("quotes", "client", fetch).await.unwrap();
        assert_eq!(first.source, Source::Upstream);
        assert_eq!(first.remaining_ttl_secs, 30);

        clock.set(10_000);
        let second = guard.get_or_fetch("quotes", "client", fetch).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.value, 7);
        assert_eq!(second.remaining_ttl_secs, 20);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_after_limit() {
        let clock = Arc::new(ManualClock::new(0));
        let guard = guard(&clock, 1);

        guard
            .get_or_fetch("a", "client", || async { Ok(1) })
            .await
            .unwrap();
        let err = guard
            .get_or_fetch("b", "client", || async { Ok(2) })
            .await
            .unwrap_err();

        assert_eq!(err.retry_after_secs(), Some(60));
        assert_eq!(guard.rejection_for("client").wait_time_secs, 60);
    }

    #[tokio::test]
    async fn test_denied_with_huge_window_saturates_retry_hint() {
        let clock = Arc::new(ManualClock::new(0));
        let guard: UpstreamGuard<u32> = UpstreamGuard::new(
            SharedRateLimiter::with_clock(
                "test",
                RateLimitConfig::new(1, Duration::from_millis(u64::MAX)),
                clock.clone(),
            ),
            SharedTtlCache::with_clock(Duration::from_secs(30), clock.clone()),
        );

        guard
            .get_or_fetch("a", "client", || async { Ok(1) })
            .await
            .unwrap();
        let err = guard
            .get_or_fetch("b", "client", || async { Ok(2) })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuardError::RateLimitExceeded {
                retry_after_ms: Some(u64::MAX)
            }
        ));
        assert_eq!(guard.rejection_for("client").reset_at_ms, u64::MAX);
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let clock = Arc::new(ManualClock::new(0));
        let guard = guard(&clock, 5);

        let err = guard
            .get_or_fetch("quotes", "client", || async {
                Err(GuardError::Upstream("provider down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Upstream(_)));
        assert!(guard.cache().get("quotes").is_none());
        assert_eq!(guard.limiter().snapshot("client").remaining, 4);
    }
}
