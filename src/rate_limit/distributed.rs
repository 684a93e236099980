//! Sliding window rate limiting kept in Redis.
//!
//! The in-memory limiters reset whenever the host process is recycled and are
//! not shared between instances. This limiter keeps the same window in an
//! Upstash Redis sorted set, so every instance sees the same counts.
//!
//! One `EVAL` per call prunes, counts, conditionally records and reads the
//! oldest entry, so the check and the record are atomic on the server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::{Clock, SystemClock, ceil_secs};
use crate::error::GuardError;
use crate::rate_limit::response::RateLimitRejection;
use crate::store::UpstashClient;

/// Prefix used for keys when none is set.
pub const DEFAULT_PREFIX: &str = "ratelimit";

/// KEYS[1] = sorted set; ARGV = now, window, limit, member.
/// Returns `{allowed, count, oldest}`.
const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. (now - window))
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
  redis.call('ZADD', key, now, member)
  count = count + 1
  allowed = 1
end
redis.call('PEXPIRE', key, window)

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_ts = now
if oldest[2] then
  oldest_ts = tonumber(oldest[2])
end
return {allowed, count, oldest_ts}
";

/// Outcome of a distributed limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request was allowed (and recorded).
    pub allowed: bool,
    /// Maximum requests per window.
    pub limit: u32,
    /// Requests still available in the window after this one.
    pub remaining: u32,
    /// When the oldest in-window request expires, in milliseconds since the UNIX epoch.
    pub reset_at_ms: u64,
    /// Time the decision was made.
    pub now_ms: u64,
}

impl RateLimitDecision {
    /// Seconds until the next slot opens; `0` when the request was allowed.
    pub fn wait_time_secs(&self) -> u64 {
        if self.allowed {
            0
        } else {
            ceil_secs(self.reset_at_ms.saturating_sub(self.now_ms)).max(1)
        }
    }

    /// The 429 payload for a denied request.
    pub fn rejection(&self) -> RateLimitRejection {
        RateLimitRejection::new(
            self.limit,
            self.remaining,
            self.reset_at_ms,
            self.wait_time_secs(),
        )
    }
}

/// Sliding window rate limiter backed by Upstash Redis.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use portfolio_guard::rate_limit::DistributedRateLimiter;
/// use portfolio_guard::store::{EnvCredentials, UpstashClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let credentials = EnvCredentials::try_from_env().ok_or("Upstash credentials not set")?;
///     let client = UpstashClient::builder().credentials(Arc::new(credentials)).build()?;
///     let limiter = DistributedRateLimiter::builder(client)
///         .prefix("firecrawl")
///         .limit(10)
///         .window(Duration::from_secs(60))
///         .build();
///
///     let decision = limiter.limit("203.0.113.7").await?;
///     if !decision.allowed {
///         println!("{}", decision.rejection());
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct DistributedRateLimiter {
    client: UpstashClient,
    prefix: String,
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl DistributedRateLimiter {
    /// Create a new builder around a REST client.
    pub fn builder(client: UpstashClient) -> DistributedRateLimiterBuilder {
        DistributedRateLimiterBuilder::new(client)
    }

    /// Check the identifier's window and record the request if it fits.
    pub async fn limit(&self, identifier: &str) -> Result<RateLimitDecision, GuardError> {
        let now = self.clock.now_ms();
        let key = self.key_for(identifier);
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
        let member = format!("{}-{}", now, self.sequence.fetch_add(1, Ordering::Relaxed));

        let reply: Vec<i64> = self
            .client
            .eval(
                SLIDING_WINDOW_SCRIPT,
                &[key.as_str()],
                &[
                    now.to_string(),
                    window_ms.to_string(),
                    self.max_requests.to_string(),
                    member,
                ],
            )
            .await?;

        let &[allowed, count, oldest] = reply.as_slice() else {
            return Err(GuardError::InvalidResponse(format!(
                "expected [allowed, count, oldest], got {:?}",
                reply
            )));
        };

        let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        let oldest = u64::try_from(oldest).unwrap_or(now);
        let decision = RateLimitDecision {
            allowed: allowed == 1,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset_at_ms: oldest.saturating_add(window_ms),
            now_ms: now,
        };

        if !decision.allowed {
            tracing::debug!(
                key = %key,
                wait_secs = decision.wait_time_secs(),
                "distributed rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// The Redis key used for an identifier.
    pub fn key_for(&self, identifier: &str) -> String {
        format!("{}:{}", self.prefix, identifier)
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Builder for [`DistributedRateLimiter`].
pub struct DistributedRateLimiterBuilder {
    client: UpstashClient,
    prefix: String,
    max_requests: u32,
    window: Duration,
    clock: Option<Arc<dyn Clock>>,
}

impl DistributedRateLimiterBuilder {
    /// Create a builder with the default prefix, budget and window.
    pub fn new(client: UpstashClient) -> Self {
        Self {
            client,
            prefix: DEFAULT_PREFIX.to_string(),
            max_requests: super::DEFAULT_MAX_REQUESTS,
            window: super::DEFAULT_WINDOW,
            clock: None,
        }
    }

    /// Set the key prefix, usually the route name.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the maximum requests per window.
    pub fn limit(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Set the window duration.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Use a custom time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the limiter.
    pub fn build(self) -> DistributedRateLimiter {
        DistributedRateLimiter {
            client: self.client,
            prefix: self.prefix,
            max_requests: self.max_requests,
            window: self.window,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            sequence: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_wait_time() {
        let denied = RateLimitDecision {
            allowed: false,
            limit: 3,
            remaining: 0,
            reset_at_ms: 60_000,
            now_ms: 3,
        };
        assert_eq!(denied.wait_time_secs(), 60);

        let rejection = denied.rejection();
        assert_eq!(rejection.limit, 3);
        assert_eq!(rejection.reset_at_ms, 60_000);

        let allowed = RateLimitDecision {
            allowed: true,
            remaining: 2,
            ..denied
        };
        assert_eq!(allowed.wait_time_secs(), 0);
    }

    #[test]
    fn test_decision_wait_time_at_boundary_is_positive() {
        let denied = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at_ms: 1_000,
            now_ms: 1_000,
        };
        assert_eq!(denied.wait_time_secs(), 1);
    }
}
