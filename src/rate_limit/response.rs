//! Shaping a rate-limit denial into an HTTP 429.
//!
//! Routes report a denial either through `X-RateLimit-*` headers or through a
//! JSON body of the form `{ "error", "rateLimited": true, "waitTime" }`.
//! [`RateLimitRejection`] produces both so a handler can pick either.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};

/// `X-RateLimit-Limit` header name.
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
/// `X-RateLimit-Remaining` header name.
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// `X-RateLimit-Reset` header name (epoch milliseconds).
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Everything a route needs to answer a denied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    /// Maximum requests per window.
    pub limit: u32,
    /// Requests left in the window (usually `0`).
    pub remaining: u32,
    /// When the next slot opens, in milliseconds since the UNIX epoch.
    pub reset_at_ms: u64,
    /// Seconds the caller should wait before retrying.
    pub wait_time_secs: u64,
}

/// JSON body returned alongside a 429.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBody {
    /// Human-readable message.
    pub error: String,
    /// Always `true`.
    pub rate_limited: bool,
    /// Seconds until the caller may retry.
    pub wait_time: u64,
}

impl RateLimitRejection {
    /// Create a rejection.
    pub fn new(limit: u32, remaining: u32, reset_at_ms: u64, wait_time_secs: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_at_ms,
            wait_time_secs,
        }
    }

    /// Always `429 Too Many Requests`.
    pub fn status(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }

    /// `X-RateLimit-*` and `Retry-After` headers.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(
            HeaderName::from_static(X_RATELIMIT_LIMIT),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static(X_RATELIMIT_REMAINING),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static(X_RATELIMIT_RESET),
            HeaderValue::from(self.reset_at_ms),
        );
        headers.insert(RETRY_AFTER, HeaderValue::from(self.wait_time_secs));
        headers
    }

    /// The user-facing message, e.g. "Rate limit exceeded. Try again in 60 seconds."
    pub fn message(&self) -> String {
        let unit = if self.wait_time_secs == 1 {
            "second"
        } else {
            "seconds"
        };
        format!(
            "Rate limit exceeded. Try again in {} {}.",
            self.wait_time_secs, unit
        )
    }

    /// JSON body for routes that report denials in the payload.
    pub fn body(&self) -> RateLimitBody {
        RateLimitBody {
            error: self.message(),
            rate_limited: true,
            wait_time: self.wait_time_secs,
        }
    }
}

impl std::fmt::Display for RateLimitRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let rejection = RateLimitRejection::new(10, 0, 1_700_000_060_000, 60);
        let headers = rejection.headers();

        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1700000060000");
        assert_eq!(headers[RETRY_AFTER], "60");
        assert_eq!(rejection.status().as_u16(), 429);
    }

    #[test]
    fn test_body_json_shape() {
        let rejection = RateLimitRejection::new(3, 0, 0, 1);
        let json = serde_json::to_value(rejection.body()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "error": "Rate limit exceeded. Try again in 1 second.",
                "rateLimited": true,
                "waitTime": 1
            })
        );
    }
}
