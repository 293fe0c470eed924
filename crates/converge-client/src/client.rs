//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::Query;
use crate::api::OrdersApi;
use crate::error::{Error, Result, extract_message};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries for transport-level failures.
const DEFAULT_RETRIES: u32 = 2;

/// Delay between transport retries.
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Blocking REST client.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use converge_client::ApiClient;
///
/// # fn example() -> converge_client::Result<()> {
/// let client = ApiClient::builder()
///     .base_url("https://waldur.example.com")
///     .token("secret")
///     .build()?;
///
/// let order = client.orders().poll("3f1c2a9e6b7d4e1f8a0b9c8d7e6f5a4b")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client.
    pub(crate) http: reqwest::blocking::Client,
    /// Base URL for API requests.
    pub(crate) base_url: Url,
    /// Retries for transport failures.
    pub(crate) retries: u32,
}

impl ApiClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Access the marketplace orders API.
    pub fn orders(&self) -> OrdersApi {
        OrdersApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for an API path.
    ///
    /// Absolute URLs (as returned in `url` fields of API objects) are used
    /// verbatim; anything else is joined onto the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let path = path.trim_start_matches('/');
        self.inner.base_url.join(path).map_err(Error::from)
    }

    /// Send a request and decode the JSON body.
    ///
    /// Returns `None` for success responses without a body (204, empty 202).
    pub(crate) fn send(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        self.send_with_status(method, path, query, body)
            .map(|(_, body)| body)
    }

    /// Like [`send`](Self::send), also returning the success status code.
    pub(crate) fn send_with_status(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<(u16, Option<Value>)> {
        let url = self.url(path)?;

        tracing::debug!(method = %method, url = %url, query = ?query, "sending API request");

        // A request that timed out may still have been applied; only reads are
        // safe to resend. Connect failures never reached the server.
        let idempotent = method == Method::GET;
        let mut retries = self.inner.retries;
        let response = loop {
            let mut request = self.inner.http.request(method.clone(), url.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send() {
                Ok(response) => break response,
                Err(e) if retries > 0 && (e.is_connect() || (idempotent && e.is_timeout())) => {
                    retries -= 1;
                    tracing::warn!(
                        error = %e,
                        retries_remaining = retries,
                        "API request failed, retrying"
                    );
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => return Err(Error::Http(e)),
            }
        };

        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            let message = extract_message(&text);
            tracing::debug!(status = status.as_u16(), url = %url, "API request rejected");
            return Err(if status.as_u16() == 404 {
                Error::NotFound(format!("{}: {}", url, message))
            } else {
                Error::Api {
                    status: status.as_u16(),
                    url: url.to_string(),
                    message,
                }
            });
        }

        if text.trim().is_empty() {
            return Ok((status.as_u16(), None));
        }

        serde_json::from_str(&text)
            .map(|body| (status.as_u16(), Some(body)))
            .map_err(|e| Error::UnexpectedResponse {
                url: url.to_string(),
                message: format!("body is not valid JSON: {}", e),
            })
    }
}

/// Substitute `{name}` placeholders in an operation path template.
///
/// Fails if a placeholder is left without a value.
pub fn expand_path(template: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut path = template.to_string();
    for (name, value) in params {
        path = path.replace(&format!("{{{}}}", name), value);
    }

    if let Some(start) = path.find('{')
        && let Some(len) = path[start..].find('}')
    {
        return Err(Error::MissingPathParam {
            name: path[start + 1..start + len].to_string(),
            template: template.to_string(),
        });
    }

    Ok(path)
}

/// Builder for creating an ApiClient.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    token: Option<String>,
    timeout: Duration,
    retries: u32,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            user_agent: None,
        }
    }

    /// Set the base URL of the remote API.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the API token (sent as `Authorization: Token <token>`).
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how often transport-level failures are retried.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Token {}", token))
                .map_err(|_| Error::Config("Invalid API token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("converge-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(self.timeout)
            .build()?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                retries: self.retries,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
