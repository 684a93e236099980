//! Credential management for the Upstash Redis REST API.

use secrecy::{ExposeSecret, SecretString};

/// Default environment variable holding the REST endpoint.
pub const URL_ENV_VAR: &str = "UPSTASH_REDIS_REST_URL";
/// Default environment variable holding the REST token.
pub const TOKEN_ENV_VAR: &str = "UPSTASH_REDIS_REST_TOKEN";

/// REST endpoint and bearer token for an Upstash Redis database.
#[derive(Clone)]
pub struct UpstashCredentials {
    /// The REST endpoint, e.g. `https://eu1-example.upstash.io`
    pub rest_url: String,
    /// The bearer token
    token: SecretString,
}

impl UpstashCredentials {
    /// Create new credentials from a REST URL and token.
    pub fn new(rest_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            rest_url: rest_url.into(),
            token: SecretString::from(token.into()),
        }
    }

    /// Get the bearer token.
    ///
    /// This method exposes the secret - use carefully.
    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl std::fmt::Debug for UpstashCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstashCredentials")
            .field("rest_url", &self.rest_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Trait for providing store credentials.
///
/// Implement this trait to pull credentials from a secrets manager instead
/// of the environment.
pub trait CredentialsProvider: Send + Sync {
    /// Get the credentials.
    fn get_credentials(&self) -> &UpstashCredentials;
}

/// Static credentials provider that holds credentials directly.
#[derive(Clone)]
pub struct StaticCredentials {
    credentials: UpstashCredentials,
}

impl StaticCredentials {
    /// Create a new static credentials provider.
    pub fn new(rest_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            credentials: UpstashCredentials::new(rest_url, token),
        }
    }
}

impl CredentialsProvider for StaticCredentials {
    fn get_credentials(&self) -> &UpstashCredentials {
        &self.credentials
    }
}

/// Credentials provider that reads from environment variables.
///
/// By default, reads from `UPSTASH_REDIS_REST_URL` and `UPSTASH_REDIS_REST_TOKEN`.
pub struct EnvCredentials {
    credentials: UpstashCredentials,
}

impl EnvCredentials {
    /// Try to create credentials from the default environment variables.
    ///
    /// Returns `None` if either variable is not set.
    pub fn try_from_env() -> Option<Self> {
        Self::try_from_env_vars(URL_ENV_VAR, TOKEN_ENV_VAR)
    }

    /// Try to create credentials from custom environment variable names.
    ///
    /// Returns `None` if either variable is not set or empty.
    pub fn try_from_env_vars(url_var: &str, token_var: &str) -> Option<Self> {
        let rest_url = std::env::var(url_var).ok().filter(|v| !v.is_empty())?;
        let token = std::env::var(token_var).ok().filter(|v| !v.is_empty())?;

        Some(Self {
            credentials: UpstashCredentials::new(rest_url, token),
        })
    }
}

impl CredentialsProvider for EnvCredentials {
    fn get_credentials(&self) -> &UpstashCredentials {
        &self.credentials
    }
}
