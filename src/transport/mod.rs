//! Transport layer for talking to the StrateZone backend
//!
//! This module provides the transport abstraction and the reqwest-backed
//! implementation. Requests are described with [`ApiRequest`] so that the
//! same request can be replayed with a different bearer token after a
//! credential refresh.

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::auth::AccessToken;
use crate::error::{ApiError, Result};

pub use http::ReqwestTransport;
pub use reqwest::Method;

/// Transport trait for issuing HTTP requests
///
/// Implementations only move bytes: any status code, 401 included, comes
/// back as an [`ApiResponse`]. Only network-level failures are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request
    ///
    /// # Errors
    /// Returns [`ApiError::Transport`] if the request could not be completed
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// A replayable request description
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the configured base URL (or an absolute URL)
    pub path: String,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// DELETE request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body
    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach `Authorization: Bearer <token>`, replacing any earlier one.
    /// `None` sends the request without credentials.
    #[must_use]
    pub fn with_bearer(mut self, token: Option<&AccessToken>) -> Self {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
        if let Some(token) = token {
            self.headers
                .push(("Authorization".to_string(), token.bearer()));
        }
        self
    }

    /// Current `Authorization` header value, if any
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw body text
    pub body: String,
}

impl ApiResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx statuses
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`ApiError::Upstream`]
    ///
    /// # Errors
    /// Returns the upstream error for any non-2xx status
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::upstream(self.status, self.body))
        }
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidResponse`] if the body does not decode
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ApiError::invalid_response(format!("Failed to decode response body: {e}"))
        })
    }
}
