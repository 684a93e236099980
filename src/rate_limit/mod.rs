//! Rate limiting for upstream providers.
//!
//! Chat completions, brokerage market data and OpenAI calls are all billed or
//! quota-limited per credential. Route handlers ask a limiter before every
//! upstream call and answer with a 429 when the caller is over budget.
//!
//! ## Limiter Flavours
//!
//! - **Local sliding window**: [`KeyedRateLimiter`], one request log per key, in memory
//! - **Shared**: [`SharedRateLimiter`], a cloneable handle with an atomic check-and-track
//! - **Distributed**: [`DistributedRateLimiter`], the same window kept in Redis via Upstash
//!
//! ## Example
//!
//! ```rust
//! use portfolio_guard::rate_limit::{LimiterRegistry, names};
//!
//! let registry = LimiterRegistry::with_defaults();
//! let chat = registry.get(names::CHAT).expect("registered by default");
//!
//! match chat.check_and_track("203.0.113.7") {
//!     Ok(()) => { /* call the upstream */ }
//!     Err(wait_secs) => println!("try again in {wait_secs} seconds"),
//! }
//! ```

mod distributed;
mod keyed;
mod response;
mod shared;

pub use distributed::{DistributedRateLimiter, DistributedRateLimiterBuilder, RateLimitDecision};
pub use keyed::{KeyedRateLimiter, SlidingWindow};
pub use response::{
    RateLimitBody, RateLimitRejection, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET,
};
pub use shared::{RateLimitStatus, SharedRateLimiter};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// Window used when none is given.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Request budget used when none is given.
pub const DEFAULT_MAX_REQUESTS: u32 = 60;

/// Names of the built-in limiters.
pub mod names {
    /// Chat endpoint, keyed by user or IP.
    pub const CHAT: &str = "chat";
    /// Brokerage market data, keyed by the shared credential.
    pub const ALPACA: &str = "alpaca";
    /// OpenAI completions and embeddings.
    pub const OPENAI: &str = "openai";
}

/// Built-in per-window budgets.
pub mod limits {
    /// Chat requests per window.
    pub const CHAT_MAX_REQUESTS: u32 = 20;
    /// Alpaca requests per window.
    pub const ALPACA_MAX_REQUESTS: u32 = 200;
    /// OpenAI requests per window.
    pub const OPENAI_MAX_REQUESTS: u32 = 50;
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed per key within the window.
    pub max_requests: u32,
    /// Sliding window length.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a configuration. Pass [`DEFAULT_WINDOW`] for the usual one-minute window.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Budget for the chat endpoint.
    pub fn chat() -> Self {
        Self::new(limits::CHAT_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    /// Budget for Alpaca market data.
    pub fn alpaca() -> Self {
        Self::new(limits::ALPACA_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    /// Budget for OpenAI calls.
    pub fn openai() -> Self {
        Self::new(limits::OPENAI_MAX_REQUESTS, DEFAULT_WINDOW)
    }

    /// Override `self` with `<PREFIX>_RATE_LIMIT_MAX` and
    /// `<PREFIX>_RATE_LIMIT_WINDOW_MS` when they are set and parse.
    ///
    /// ```rust
    /// use portfolio_guard::rate_limit::RateLimitConfig;
    ///
    /// // Falls back to the chat preset when CHAT_RATE_LIMIT_* are unset.
    /// let config = RateLimitConfig::chat().with_env_overrides("CHAT");
    /// assert!(config.max_requests > 0);
    /// ```
    pub fn with_env_overrides(self, prefix: &str) -> Self {
        let prefix = prefix.to_ascii_uppercase();
        let max_requests = env_parse(&format!("{prefix}_RATE_LIMIT_MAX"))
            .unwrap_or(self.max_requests);
        let window = env_parse(&format!("{prefix}_RATE_LIMIT_WINDOW_MS"))
            .map_or(self.window, Duration::from_millis);

        Self {
            max_requests,
            window,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Named limiters owned by the service that composes the route handlers.
#[derive(Debug, Clone)]
pub struct LimiterRegistry {
    limiters: HashMap<String, SharedRateLimiter>,
    clock: Arc<dyn Clock>,
}

impl LimiterRegistry {
    /// Create an empty registry reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry whose limiters share the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            limiters: HashMap::new(),
            clock,
        }
    }

    /// Registry with the chat, alpaca and openai limiters, each overridable from the environment.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register the chat, alpaca and openai limiters.
    pub fn register_defaults(&mut self) {
        self.register(names::CHAT, RateLimitConfig::chat().with_env_overrides(names::CHAT));
        self.register(names::ALPACA, RateLimitConfig::alpaca().with_env_overrides(names::ALPACA));
        self.register(names::OPENAI, RateLimitConfig::openai().with_env_overrides(names::OPENAI));
    }

    /// Register (or replace) a limiter and return a handle to it.
    pub fn register(&mut self, name: &str, config: RateLimitConfig) -> SharedRateLimiter {
        let limiter = SharedRateLimiter::with_clock(name, config, self.clock.clone());
        self.limiters.insert(name.to_string(), limiter.clone());
        limiter
    }

    /// Look up a limiter by name.
    pub fn get(&self, name: &str) -> Option<&SharedRateLimiter> {
        self.limiters.get(name)
    }

    /// Run [`SharedRateLimiter::cleanup`] on every limiter.
    pub fn cleanup(&self) {
        for limiter in self.limiters.values() {
            limiter.cleanup();
        }
    }

    /// Number of registered limiters.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no limiter is registered.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

impl Default for LimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_presets() {
        assert_eq!(RateLimitConfig::chat().max_requests, 20);
        assert_eq!(RateLimitConfig::alpaca().window, Duration::from_secs(60));
        assert_eq!(RateLimitConfig::default().max_requests, DEFAULT_MAX_REQUESTS);
    }

    #[test]
    fn test_env_overrides_fall_back_when_unset() {
        let config = RateLimitConfig::openai().with_env_overrides("PORTFOLIO_GUARD_UNSET_PREFIX");
        assert_eq!(config, RateLimitConfig::openai());
    }

    #[test]
    fn test_registry_defaults() {
        let registry = LimiterRegistry::with_defaults();
        assert_eq!(registry.len(), 3);
        assert!(registry.get(names::CHAT).is_some());
        assert!(registry.get(names::ALPACA).is_some());
        assert!(registry.get(names::OPENAI).is_some());
        assert!(registry.get("firecrawl").is_none());
    }

    #[test]
    fn test_registry_limiters_are_isolated() {
        let clock = Arc::new(ManualClock::new(0));
        let mut registry = LimiterRegistry::with_clock(clock.clone());
        let chat = registry.register("chat", RateLimitConfig::new(1, DEFAULT_WINDOW));
        let openai = registry.register("openai", RateLimitConfig::new(1, DEFAULT_WINDOW));

        assert!(chat.check_and_track("client").is_ok());
        assert!(chat.check_and_track("client").is_err());
        assert!(openai.check_and_track("client").is_ok());

        clock.set(120_000);
        registry.cleanup();
        assert_eq!(chat.tracked_keys(), 0);
    }
}
