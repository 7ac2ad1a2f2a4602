//! HTTP transport seam.
//!
//! ARCHITECTURE
//! ============
//! `SessionClient` never talks to `reqwest` directly. It hands a fully
//! resolved [`ApiRequest`] to an [`HttpTransport`] and gets the raw
//! [`ApiResponse`] back, whatever its status. Status interpretation (401
//! recovery, error mapping) stays in the client, which keeps the refresh
//! logic testable with an in-memory transport.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
pub use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Timeouts;
use crate::error::SessionError;

// =============================================================================
// REQUEST
// =============================================================================

/// An outgoing API call.
///
/// `url` is a path relative to the configured base URL until the client
/// resolves it. `query` pairs are URL-encoded by the transport. `retried` is
/// set once the request has been re-issued after a refresh and blocks any
/// further refresh for it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub retried: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), query: Vec::new(), headers: HeaderMap::new(), body: None, retried: false }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Value of the first `name` query pair.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Bearer token currently attached, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns [`SessionError::InvalidHeader`] if the token holds characters
/// that are not valid in a header.
pub fn bearer_header(token: &str) -> Result<HeaderValue, SessionError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Headers every JSON API call carries.
#[must_use]
pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A backend response with its body fully buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    /// Response carrying a JSON body.
    #[must_use]
    pub fn json_body(status: StatusCode, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as lossy UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if the body is not the expected JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        serde_json::from_slice(&self.body).map_err(|e| SessionError::Decode(e.to_string()))
    }

    /// Turn a non-2xx response into [`SessionError::Status`].
    ///
    /// # Errors
    ///
    /// Returns the status error for any non-success status.
    pub fn error_for_status(self) -> Result<Self, SessionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SessionError::Status { status: self.status.as_u16(), body: self.text() })
        }
    }

    /// DRF-style `detail` message from an error body, if any.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        let value: Value = serde_json::from_slice(&self.body).ok()?;
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(ToOwned::to_owned)
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Executes one HTTP exchange. Implementations must not interpret statuses.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` (with an absolute `url`) and buffer the response.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError>;
}

/// Production transport backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the HTTP client cannot be built.
    pub fn new(timeouts: Timeouts) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeouts.request_ms))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| SessionError::Config(format!("HTTP client build failed: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let mut builder = self.http.request(request.method, &request.url).headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(ApiResponse { status, headers, body: body.to_vec() })
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
