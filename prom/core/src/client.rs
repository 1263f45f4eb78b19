//! Prometheus Backend Client
//!
//! The [`PromClient`] trait is the seam between the query dispatcher and the
//! HTTP transport. The dispatcher builds each request itself (endpoint path
//! and query-string parameters) and hands it to the client for execution, so
//! implementations only deal with sending bytes and reporting the status.
//!
//! [`HttpClient`] is the production implementation on top of `reqwest`. Tests
//! plug in in-memory implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use thiserror::Error;

use crate::config::QueryConfig;

/// Default time budget for one backend call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building or executing backend requests
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The configured endpoint is not a usable base URL
    #[error("invalid backend endpoint {endpoint:?}: {message}")]
    InvalidEndpoint {
        /// The rejected endpoint
        endpoint: String,
        /// Why it was rejected
        message: String,
    },

    /// The underlying HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    /// The request could not be sent or no response arrived
    #[error("failed to send {method} {url} request: {message}")]
    Send {
        /// HTTP method
        method: Method,
        /// Request URL, without credentials
        url: String,
        /// Transport error description
        message: String,
    },

    /// The response body could not be read
    #[error("failed to read response body: {0}")]
    Body(String),
}

// ============================================================================
// Request / Response
// ============================================================================

/// A fully-formed backend request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including the query string
    pub url: Url,
}

impl BackendRequest {
    /// A `POST` with all parameters carried in the URL and no body
    #[must_use]
    pub fn post(url: Url) -> Self {
        Self {
            method: Method::POST,
            url,
        }
    }

    /// First value of query-string parameter `name`
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Raw backend response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Undecoded body
    pub body: Vec<u8>,
}

impl BackendResponse {
    /// Build a response from a status and body
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

// ============================================================================
// Client Trait
// ============================================================================

/// Transport to a Prometheus-compatible HTTP API
///
/// Implementations are shared by every query worker and must not require
/// mutable access.
#[async_trait]
pub trait PromClient: Send + Sync {
    /// Short name for logs (e.g., "http")
    fn name(&self) -> &str;

    /// Absolute URL for an API path such as `/api/v1/query`
    ///
    /// The path is appended to the base URL's own path so that backends
    /// served under a prefix keep working.
    fn url(&self, endpoint: &str) -> Url;

    /// Send a request and return the status and raw body
    ///
    /// A non-success status is not an error at this level; it is returned in
    /// the [`BackendResponse`] for the caller to judge.
    async fn execute(&self, request: BackendRequest) -> Result<BackendResponse, ClientError>;
}

// ============================================================================
// reqwest Implementation
// ============================================================================

/// [`PromClient`] backed by `reqwest`
#[derive(Clone)]
pub struct HttpClient {
    /// Base URL of the backend
    base_url: Url,
    /// Bearer token sent with every request
    auth_token: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client for the backend at `endpoint`
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let base_url = parse_endpoint(endpoint)?;
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            base_url,
            auth_token: None,
            http_client,
        })
    }

    /// Create a client from a [`QueryConfig`]
    pub fn from_config(config: &QueryConfig) -> Result<Self, ClientError> {
        let client = Self::new(&config.endpoint)?;
        Ok(match &config.auth_token {
            Some(token) => client.with_auth_token(token.clone()),
            None => client,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Base URL of the backend
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ClientError> {
    let invalid = |message: String| ClientError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };

    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme {scheme:?}"))),
    }
}

#[async_trait]
impl PromClient for HttpClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn url(&self, endpoint: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}{}", self.base_url.path().trim_end_matches('/'), endpoint);
        url.set_path(&path);
        url.set_query(None);
        url
    }

    async fn execute(&self, request: BackendRequest) -> Result<BackendResponse, ClientError> {
        let method = request.method.clone();
        let url = request.url.to_string();

        let mut builder = self.http_client.request(request.method, request.url);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| ClientError::Send {
            method,
            url,
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Body(e.to_string()))?;

        Ok(BackendResponse::new(status, body.to_vec()))
    }
}
