//! Upstash Redis REST client.
//!
//! Upstash exposes Redis over HTTPS: a command is a JSON array posted to the
//! database URL, and the reply is `{"result": ...}` or `{"error": "..."}`.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_tracing::TracingMiddleware;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::{GuardError, StoreError};
use crate::store::credentials::CredentialsProvider;

/// A client for the Upstash Redis REST API.
///
/// # Example
///
/// ```rust,no_run
/// use portfolio_guard::store::{EnvCredentials, UpstashClient};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let credentials = EnvCredentials::try_from_env().ok_or("Upstash credentials not set")?;
///     let client = UpstashClient::builder()
///         .credentials(Arc::new(credentials))
///         .build()?;
///
///     let pong: String = client.command(&["PING"]).await?;
///     println!("{pong}");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct UpstashClient {
    http_client: ClientWithMiddleware,
    base_url: Url,
    credentials: Arc<dyn CredentialsProvider>,
}

impl UpstashClient {
    /// Create a new client builder.
    pub fn builder() -> UpstashClientBuilder {
        UpstashClientBuilder::new()
    }

    /// Run a single command and decode its result.
    pub async fn command<T, A>(&self, args: &[A]) -> Result<T, GuardError>
    where
        T: DeserializeOwned,
        A: serde::Serialize,
    {
        let body = serde_json::to_string(args)?;
        let token = self.credentials.get_credentials().expose_token();

        let response = self
            .http_client
            .post(self.base_url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        self.parse_response(response).await
    }

    /// Run a Lua script with `EVAL`.
    pub async fn eval<T>(&self, script: &str, keys: &[&str], args: &[String]) -> Result<T, GuardError>
    where
        T: DeserializeOwned,
    {
        let mut command: Vec<Value> = Vec::with_capacity(3 + keys.len() + args.len());
        command.push(Value::from("EVAL"));
        command.push(Value::from(script));
        command.push(Value::from(keys.len().to_string()));
        command.extend(keys.iter().map(|k| Value::from(*k)));
        command.extend(args.iter().map(|a| Value::from(a.as_str())));

        self.command(&command).await
    }

    /// Parse a response from the REST API.
    async fn parse_response<T>(&self, response: reqwest::Response) -> Result<T, GuardError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await?;

        let parsed: UpstashResponse<T> = serde_json::from_str(&body).map_err(|e| {
            GuardError::InvalidResponse(format!("Failed to parse response: {}. Body: {}", e, body))
        })?;

        if let Some(error) = parsed.error {
            let store_error = StoreError::parse(&error);
            tracing::warn!(%status, error = %store_error, "store command failed");
            return Err(GuardError::Store(store_error));
        }

        parsed.result.ok_or_else(|| {
            if !status.is_success() {
                GuardError::InvalidResponse(format!("HTTP {}: {}", status, body))
            } else {
                GuardError::InvalidResponse("Response missing 'result' field".to_string())
            }
        })
    }
}

impl std::fmt::Debug for UpstashClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstashClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

/// Builder for [`UpstashClient`].
pub struct UpstashClientBuilder {
    credentials: Option<Arc<dyn CredentialsProvider>>,
    user_agent: Option<String>,
    max_retries: u32,
}

impl UpstashClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            credentials: None,
            user_agent: None,
            max_retries: 3,
        }
    }

    /// Set the credentials provider. The REST URL comes from the credentials.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the maximum number of retries for transient failures.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Build the client.
    ///
    /// Fails when no credentials were given or the REST URL does not parse.
    pub fn build(self) -> Result<UpstashClient, GuardError> {
        let credentials = self.credentials.ok_or(GuardError::MissingCredentials)?;
        let base_url = Url::parse(&credentials.get_credentials().rest_url)?;

        let mut headers = HeaderMap::new();
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("portfolio-guard/{}", env!("CARGO_PKG_VERSION")));
        let header_value = HeaderValue::from_str(&user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("portfolio-guard"));
        headers.insert(USER_AGENT, header_value);

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(self.max_retries);

        let client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(UpstashClient {
            http_client: client,
            base_url,
            credentials,
        })
    }
}

impl Default for UpstashClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal wrapper for REST replies.
#[derive(Debug, serde::Deserialize)]
struct UpstashResponse<T> {
    result: Option<T>,
    error: Option<String>,
}
