//! HTTP transport seam.
//!
//! The executor and the session guard are written against [`HttpTransport`]
//! so their behavior can be exercised with scripted responses. Production
//! uses [`ReqwestTransport`], one shared `reqwest::Client` per process.

use std::time::Duration;

use reqwest::{header, Client, Method};
use thiserror::Error;
use tracing::debug;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Response header carrying a rotated session token.
pub const RENEWED_TOKEN_HEADER: &str = "x-renewed-token";

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Network error: {0}")]
    Other(String),
}

/// A fully prepared outgoing request: absolute URL, headers resolved.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    /// `Authorization` header value, already in `Bearer <token>` form.
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// The wire-level response before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Rotated token from [`RENEWED_TOKEN_HEADER`], if the server sent one.
    pub renewed_token: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError>;
}

/// Production transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .header(header::CONTENT_TYPE, "application/json");

        if let Some(ref auth) = request.authorization {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let renewed_token = response
            .headers()
            .get(RENEWED_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Body read is best effort; an empty body is a valid response.
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(RawResponse {
            status,
            content_type,
            renewed_token,
            body,
        })
    }
}
