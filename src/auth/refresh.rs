//! Refresh operation: trade the stored refresh token for a new pair

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::credentials::{Credentials, TokenPayload};
use crate::config::RefreshTokenPlacement;
use crate::transport::{ApiRequest, Transport};

/// Why a refresh cycle failed.
///
/// Cloneable because one failure is handed to every queued waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    /// No refresh token stored; refresh was never attempted
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// Refresh endpoint rejected the token
    #[error("refresh rejected (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Server-provided reason, or the raw body
        message: String,
    },

    /// Refresh endpoint answered 2xx without a new access token
    #[error("refresh response carried no access token")]
    MissingAccessToken,

    /// Refresh call did not settle in time
    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),

    /// Network failure during the refresh call
    #[error("refresh transport failure: {0}")]
    Transport(String),

    /// New credentials could not be read or persisted
    #[error("credential storage failure: {0}")]
    Storage(String),
}

/// Mints a new credential pair from the current one
#[async_trait]
pub trait Refresher: Send + Sync {
    /// Perform one refresh call
    ///
    /// # Errors
    /// Returns the reason the pair could not be renewed
    async fn refresh(&self, current: &Credentials) -> Result<Credentials, RefreshFailure>;
}

/// Error body shapes seen from the backend
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn rejection_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message.or(e.error_description).or(e.error))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Refresher that calls the backend's refresh endpoint
pub struct HttpRefresher {
    transport: Arc<dyn Transport>,
    path: String,
    placement: RefreshTokenPlacement,
}

impl std::fmt::Debug for HttpRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRefresher")
            .field("path", &self.path)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

impl HttpRefresher {
    /// Create a refresher for the given endpoint
    pub fn new(
        transport: Arc<dyn Transport>,
        path: impl Into<String>,
        placement: RefreshTokenPlacement,
    ) -> Self {
        Self {
            transport,
            path: path.into(),
            placement,
        }
    }

    fn build_request(&self, current: &Credentials) -> ApiRequest {
        let refresh_token = current.refresh_token.as_str();
        let request = ApiRequest::post(self.path.clone()).with_bearer(Some(&current.access_token));

        match &self.placement {
            RefreshTokenPlacement::Query { param } => request.query(param.clone(), refresh_token),
            RefreshTokenPlacement::Body { field } => {
                let mut body = serde_json::Map::new();
                body.insert(field.clone(), serde_json::Value::from(refresh_token));
                request.json(serde_json::Value::Object(body))
            }
        }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self, current: &Credentials) -> Result<Credentials, RefreshFailure> {
        let request = self.build_request(current);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        if !response.is_success() {
            return Err(RefreshFailure::Rejected {
                status: response.status,
                message: rejection_message(&response.body),
            });
        }

        let payload = TokenPayload::parse(&response.body).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Refresh response body is not a token payload");
            TokenPayload::default()
        });

        let access_token = payload
            .access_token()
            .ok_or(RefreshFailure::MissingAccessToken)?;
        // Keep the old refresh token when the backend does not rotate it
        let refresh_token = payload
            .refresh_token()
            .unwrap_or_else(|| current.refresh_token.clone());

        Ok(Credentials {
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::transport::ApiResponse;
    use std::sync::Mutex;

    /// Transport that records requests and replays one canned response
    struct CannedTransport {
        response: Result<ApiResponse>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl CannedTransport {
        fn new(response: Result<ApiResponse>) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
            self.seen.lock().unwrap().push(request);
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(crate::ApiError::transport(e.to_string())),
            }
        }
    }

    fn current() -> Credentials {
        Credentials::new("T1", "R1")
    }

    #[tokio::test]
    async fn test_query_placement_and_bearer() {
        let transport = CannedTransport::new(Ok(ApiResponse::new(
            200,
            r#"{"accessToken":"T2","refreshToken":"R2"}"#,
        )));
        let refresher = HttpRefresher::new(
            transport.clone(),
            "/api/auth/refresh-token",
            RefreshTokenPlacement::default(),
        );

        let creds = refresher.refresh(&current()).await.unwrap();
        assert_eq!(creds, Credentials::new("T2", "R2"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, "/api/auth/refresh-token");
        assert_eq!(seen[0].authorization(), Some("Bearer T1"));
        assert_eq!(
            seen[0].query,
            vec![("refreshToken".to_string(), "R1".to_string())]
        );
        assert!(seen[0].body.is_none());
    }

    #[tokio::test]
    async fn test_body_placement() {
        let transport = CannedTransport::new(Ok(ApiResponse::new(
            200,
            r#"{"data":{"accessToken":"T2"}}"#,
        )));
        let refresher =
            HttpRefresher::new(transport.clone(), "/refresh", RefreshTokenPlacement::body("token"));

        let creds = refresher.refresh(&current()).await.unwrap();
        // Refresh token was not rotated
        assert_eq!(creds, Credentials::new("T2", "R1"));

        let seen = transport.seen.lock().unwrap();
        assert!(seen[0].query.is_empty());
        assert_eq!(seen[0].body, Some(serde_json::json!({ "token": "R1" })));
    }

    #[tokio::test]
    async fn test_success_without_access_token_fails() {
        let transport = CannedTransport::new(Ok(ApiResponse::new(200, r#"{"refreshToken":"R2"}"#)));
        let refresher =
            HttpRefresher::new(transport, "/refresh", RefreshTokenPlacement::default());

        assert_eq!(
            refresher.refresh(&current()).await,
            Err(RefreshFailure::MissingAccessToken)
        );
    }

    #[tokio::test]
    async fn test_non_json_success_fails() {
        let transport = CannedTransport::new(Ok(ApiResponse::new(200, "OK")));
        let refresher =
            HttpRefresher::new(transport, "/refresh", RefreshTokenPlacement::default());

        assert_eq!(
            refresher.refresh(&current()).await,
            Err(RefreshFailure::MissingAccessToken)
        );
    }

    #[tokio::test]
    async fn test_rejection_carries_server_message() {
        let transport = CannedTransport::new(Ok(ApiResponse::new(
            400,
            r#"{"message":"Refresh token expired"}"#,
        )));
        let refresher =
            HttpRefresher::new(transport, "/refresh", RefreshTokenPlacement::default());

        assert_eq!(
            refresher.refresh(&current()).await,
            Err(RefreshFailure::Rejected {
                status: 400,
                message: "Refresh token expired".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let transport = CannedTransport::new(Err(crate::ApiError::transport("connection reset")));
        let refresher =
            HttpRefresher::new(transport, "/refresh", RefreshTokenPlacement::default());

        let err = refresher.refresh(&current()).await.unwrap_err();
        assert!(matches!(err, RefreshFailure::Transport(msg) if msg.contains("connection reset")));
    }

    #[test]
    fn test_rejection_message_fallback() {
        assert_eq!(rejection_message("  plain text  "), "plain text");
        assert_eq!(
            rejection_message(r#"{"error":"invalid_grant"}"#),
            "invalid_grant"
        );
    }
}
