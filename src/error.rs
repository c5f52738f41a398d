//! Error types for the StrateZone client

use thiserror::Error;

use crate::auth::{RefreshFailure, StoreError};

/// Longest body excerpt carried into an error message
const BODY_EXCERPT_BYTES: usize = 256;

/// Main error type for the StrateZone client
#[derive(Error, Debug)]
pub enum ApiError {
    /// The session could not be recovered; the user must sign in again
    #[error("Session expired: {0}")]
    AuthExpired(RefreshFailure),

    /// Backend answered with a non-success status
    #[error("Upstream error (status {status}): {}", excerpt(.body))]
    Upstream {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network-level failure (connect, TLS, read, timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Credential storage failure
    #[error("Credential storage error: {0}")]
    Storage(#[from] StoreError),

    /// Backend answered 2xx with a body we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for StrateZone client operations
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create a session-expired error
    #[must_use]
    pub fn auth_expired(reason: RefreshFailure) -> Self {
        Self::AuthExpired(reason)
    }

    /// Create an upstream error
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for the one failure class that triggers a credential refresh
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Upstream { status: 401, .. })
    }

    /// True when the caller has to send the user back to login
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    /// HTTP status carried by an upstream error
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Cut a body down for display without splitting a UTF-8 character.
fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_BYTES {
        return body.to_string();
    }
    let mut boundary = BODY_EXCERPT_BYTES;
    while boundary > 0 && !body.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &body[..boundary])
}
