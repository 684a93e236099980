//! Error types for portfolio-guard.
//!
//! The in-memory limiter and cache never fail: a denial or a miss is a value.
//! Errors only come from the edges that do I/O (the distributed limiter and
//! the upstream fetches run through [`UpstreamGuard`](crate::guard::UpstreamGuard)).

use thiserror::Error;

/// The main error type for all fallible operations.
#[derive(Error, Debug)]
pub enum GuardError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// The Redis store rejected a command
    #[error("store error: {0}")]
    Store(StoreError),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_ms:?}ms")]
    RateLimitExceeded {
        /// Suggested wait time in milliseconds before retrying
        retry_after_ms: Option<u64>,
    },

    /// The upstream provider behind a guard failed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Invalid response from the store
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Missing required credentials
    #[error("Missing credentials: REST URL and token required for the distributed limiter")]
    MissingCredentials,
}

impl GuardError {
    /// Whether this error means the caller should back off and retry later.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GuardError::RateLimitExceeded { .. })
    }

    /// Retry hint in whole seconds, rounded up, for a rate limit error.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GuardError::RateLimitExceeded { retry_after_ms } => {
                retry_after_ms.map(|ms| ms.div_ceil(1000))
            }
            _ => None,
        }
    }
}

/// An error returned by Redis in a REST response body.
///
/// Redis errors are a single string whose first word is the error kind,
/// e.g. `"ERR wrong number of arguments"` or `"WRONGTYPE Operation against a key"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// The error kind (e.g. "ERR", "WRONGTYPE", "NOSCRIPT")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StoreError {
    /// Create a new store error from code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Parse a Redis error string.
    ///
    /// Strings whose first word is not upper case (Upstash's own
    /// `"Unauthorized"` for example) get the code `"UPSTASH"`.
    pub fn parse(error: &str) -> Self {
        match error.split_once(' ') {
            Some((code, message))
                if !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase()) =>
            {
                Self::new(code, message)
            }
            _ => Self::new("UPSTASH", error),
        }
    }

    /// Check if the token was rejected.
    pub fn is_unauthorized(&self) -> bool {
        self.message.contains("Unauthorized") || self.code == "NOPERM"
    }

    /// Check if a Lua script failed.
    pub fn is_script_error(&self) -> bool {
        self.code == "NOSCRIPT" || self.message.contains("script")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_parse() {
        let error = StoreError::parse("WRONGTYPE Operation against a key holding the wrong kind of value");
        assert_eq!(error.code, "WRONGTYPE");
        assert_eq!(
            error.message,
            "Operation against a key holding the wrong kind of value"
        );
        assert!(!error.is_unauthorized());
    }

    #[test]
    fn test_store_error_parse_unauthorized() {
        let error = StoreError::parse("Unauthorized");
        assert_eq!(error.code, "UPSTASH");
        assert!(error.is_unauthorized());
    }

    #[test]
    fn test_store_error_script() {
        let error = StoreError::parse("ERR Error running script (call to f_1234): @user_script:1");
        assert_eq!(error.code, "ERR");
        assert!(error.is_script_error());
    }

    #[test]
    fn test_store_error_display() {
        let error = StoreError::new("ERR", "unknown command");
        assert_eq!(error.to_string(), "ERR: unknown command");
    }

    #[test]
    fn test_retry_after_secs() {
        let error = GuardError::RateLimitExceeded {
            retry_after_ms: Some(59_997),
        };
        assert!(error.is_rate_limited());
        assert_eq!(error.retry_after_secs(), Some(60));
        assert_eq!(GuardError::MissingCredentials.retry_after_secs(), None);
    }
}
