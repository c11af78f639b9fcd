//! Snyk API transport.
//!
//! Low-level HTTP client that handles authentication, retries, rate limits
//! and the worker pool. Entity-specific operations live on the model types.

use std::env;
use std::sync::Arc;

use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Result, SnykError};
use crate::retry::RetryPolicy;

const USER_AGENT: &str = concat!("snyker/", env!("CARGO_PKG_VERSION"));
const JSON_API: &str = "application/vnd.api+json";

/// A request against the API, independent of any entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, an absolute path, or a full URL.
    pub path: String,
    /// Query parameters in send order.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl RequestSpec {
    /// A `GET` request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `POST` request for `path` carrying `body`.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters.
    #[must_use]
    pub fn extend_query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Whether a query parameter named `key` is already present.
    pub fn has_query(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response status (always 2xx).
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Parsed JSON body; `Value::Null` for an empty body.
    pub payload: Value,
}

impl ApiResponse {
    /// The JSON:API `data` member, or `Value::Null`.
    pub fn data(&self) -> &Value {
        self.payload.get("data").unwrap_or(&Value::Null)
    }
}

struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// Low-level Snyk API client.
///
/// Every call goes through [`execute`](Self::execute), which attaches the
/// bearer token, retries transient failures with exponential backoff, and
/// honors `Retry-After` on 429 responses. Concurrent calls share a bounded
/// worker pool.
///
/// This struct is cheaply cloneable; clones share the connection pool and
/// the worker pool.
///
/// # Example
///
/// ```no_run
/// use snyker::SnykClient;
///
/// # fn example() -> snyker::Result<()> {
/// // Create from environment variables
/// let client = SnykClient::from_env()?;
///
/// // Or configure manually
/// let client = SnykClient::new("your-token", "https://api.snyk.io")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SnykClient {
    http: Client,
    base_url: Arc<Url>,
    token: Arc<str>,
    config: Arc<ClientConfig>,
    retry: Arc<RetryPolicy>,
    workers: Arc<Semaphore>,
}

impl std::fmt::Debug for SnykClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnykClient")
            .field("base_url", &self.base_url.as_str())
            .field("max_attempts", &self.config.max_attempts)
            .finish_non_exhaustive()
    }
}

impl SnykClient {
    /// Create a client from environment variables.
    ///
    /// Uses `SNYK_TOKEN` for authentication and optionally `SNYK_API` for the
    /// base URL (defaults to `https://api.snyk.io`).
    ///
    /// # Errors
    ///
    /// Returns [`SnykError::Unauthenticated`] if `SNYK_TOKEN` is not set.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_config(ClientConfig::default())
    }

    /// Like [`from_env`](Self::from_env) but starting from `config`.
    pub fn from_env_with_config(config: ClientConfig) -> Result<Self> {
        let token = env::var("SNYK_TOKEN").map_err(|_| {
            SnykError::Unauthenticated("SNYK_TOKEN environment variable not set".to_string())
        })?;
        Self::with_config(&token, config.with_env_overrides())
    }

    /// Create a client with default settings against `base_url`.
    pub fn new(token: &str, base_url: &str) -> Result<Self> {
        Self::with_config(
            token,
            ClientConfig {
                base_url: base_url.to_string(),
                ..ClientConfig::default()
            },
        )
    }

    /// Create a client from a token and explicit settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty, the settings are invalid, or
    /// the base URL does not parse.
    pub fn with_config(token: &str, config: ClientConfig) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(SnykError::Unauthenticated("API token is empty".to_string()));
        }
        config.validate()?;

        // Ensure base URL ends with /
        let base_url_str = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };
        let base_url = Url::parse(&base_url_str)?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .timeout(config.timeout())
            .build()
            .map_err(SnykError::HttpError)?;

        Ok(Self {
            http,
            base_url: Arc::new(base_url),
            token: Arc::from(token),
            retry: Arc::new(RetryPolicy::from_config(&config)),
            workers: Arc::new(Semaphore::new(config.worker_count())),
            config: Arc::new(config),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the active settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stop accepting new calls. In-flight attempts finish normally.
    pub fn close(&self) {
        debug!("closing worker pool");
        self.workers.close();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.workers.is_closed()
    }

    /// Execute a [`RequestSpec`].
    pub async fn send(&self, request: &RequestSpec) -> Result<ApiResponse> {
        self.execute(
            request.method.clone(),
            &request.path,
            &request.query,
            request.body.as_ref(),
        )
        .await
    }

    /// Execute one logical call, retrying as the policy allows.
    ///
    /// # Errors
    ///
    /// - [`SnykError::TransportExhausted`] once every attempt failed transiently
    /// - [`SnykError::Unauthorized`], [`SnykError::Forbidden`],
    ///   [`SnykError::NotFound`], [`SnykError::InvalidRequest`] or
    ///   [`SnykError::Api`] immediately for non-retryable statuses
    #[tracing::instrument(skip(self, query, body), fields(method = %method))]
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.base_url.join(path)?;
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, max_attempts, "sending request");

            let delay = match self.attempt(method.clone(), url.clone(), query, body).await {
                Ok(raw) if raw.status.is_success() => {
                    return Ok(ApiResponse {
                        status: raw.status,
                        headers: raw.headers,
                        payload: parse_payload(&raw.body)?,
                    });
                }
                Ok(raw) if self.retry.is_retryable(raw.status) => {
                    let delay = self.retry.delay_for_status(attempt, raw.status, &raw.headers);
                    if attempt >= max_attempts {
                        return Err(SnykError::TransportExhausted {
                            attempts: attempt,
                            last_status: Some(raw.status.as_u16()),
                            last_payload: serde_json::from_slice(&raw.body).ok(),
                        });
                    }
                    if raw.status == StatusCode::TOO_MANY_REQUESTS {
                        warn!(attempt, wait = ?delay, "rate limited");
                    } else {
                        warn!(attempt, status = raw.status.as_u16(), wait = ?delay, "retryable status");
                    }
                    delay
                }
                Ok(raw) => return Err(error_for_status(path, raw.status, &raw.body)),
                Err(SnykError::HttpError(e)) if is_transient(&e) => {
                    if attempt >= max_attempts {
                        warn!(attempt, error = %e, "giving up after transport failure");
                        return Err(SnykError::TransportExhausted {
                            attempts: attempt,
                            last_status: None,
                            last_payload: None,
                        });
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(attempt, error = %e, wait = ?delay, "transport failure");
                    delay
                }
                Err(e) => return Err(e),
            };

            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt, holding a worker permit until the body is read.
    async fn attempt(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| SnykError::ClientClosed)?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&*self.token)
            .header(ACCEPT, JSON_API);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

fn parse_payload(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

/// Map a non-retryable status to its error category.
fn error_for_status(path: &str, status: StatusCode, body: &[u8]) -> SnykError {
    let message = extract_error_message(status, body);
    match status.as_u16() {
        401 => SnykError::Unauthorized(message),
        403 => SnykError::Forbidden(message),
        404 => SnykError::NotFound(format!("{path}: {message}")),
        400 | 422 => SnykError::InvalidRequest {
            status: status.as_u16(),
            message,
        },
        code => SnykError::Api {
            status: code,
            message,
        },
    }
}

/// Extract an error message from a failed response body.
fn extract_error_message(status: StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return format!("HTTP {status}");
    }

    // JSON:API errors carry a list of objects with detail/title
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(first) = json
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            if let Some(msg) = ["detail", "title"]
                .iter()
                .find_map(|key| first.get(*key).and_then(Value::as_str))
            {
                return msg.to_string();
            }
        }
        if let Some(msg) = ["message", "error"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str))
        {
            return msg.to_string();
        }
    }

    text.into_owned()
}
