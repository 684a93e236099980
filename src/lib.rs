//! # Portfolio Guard
//!
//! Request-protection and caching primitives for a portfolio web backend that
//! fronts rate-limited upstream providers (market data, brokerage, LLM chat).
//!
//! ## Features
//!
//! - Per-key sliding-window rate limiting with wait-time reporting
//! - 429 response shaping (`X-RateLimit-*` headers and JSON body)
//! - Distributed sliding-window limiting over Upstash Redis REST
//! - TTL result caching with remaining-lifetime reporting
//! - Level-dependent move sampling for the chess demo
//!
//! ## Quick Start
//!
//! ```rust
//! use portfolio_guard::rate_limit::{RateLimitConfig, SharedRateLimiter};
//!
//! let chat = SharedRateLimiter::new("chat", RateLimitConfig::chat());
//!
//! match chat.check_and_track("203.0.113.7") {
//!     Ok(()) => { /* call the provider */ }
//!     Err(wait_secs) => println!("Try again in {wait_secs}s"),
//! }
//! ```

pub mod cache;
pub mod chess;
pub mod clock;
pub mod error;
pub mod guard;
pub mod rate_limit;
pub mod store;

// Re-export commonly used types at crate root
pub use cache::SharedTtlCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{GuardError, StoreError};
pub use guard::UpstreamGuard;
pub use rate_limit::{RateLimitConfig, RateLimitRejection, SharedRateLimiter};

/// Result type alias using GuardError
pub type Result<T> = std::result::Result<T, GuardError>;
