//! reqwest-backed transport

use async_trait::async_trait;

use super::{ApiRequest, ApiResponse, Transport};
use crate::VERSION;
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};

/// HTTP transport over a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Build a transport from client configuration
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidConfig`] if the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("stratezone-client/{VERSION}"));

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ApiError::invalid_config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(http_client, config.base_url.clone()))
    }

    /// Wrap an existing client
    pub fn with_client(http_client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    /// Resolve a request path against the base URL
    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path);
        tracing::trace!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.http_client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(method = %request.method, url = %url, status, "Request completed");
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> ReqwestTransport {
        ReqwestTransport::with_client(reqwest::Client::new(), "https://api.stratezone.test/")
    }

    #[test]
    fn test_url_join() {
        let t = transport();
        assert_eq!(
            t.url_for("/api/tables"),
            "https://api.stratezone.test/api/tables"
        );
        assert_eq!(
            t.url_for("api/tables"),
            "https://api.stratezone.test/api/tables"
        );
    }

    #[test]
    fn test_absolute_url_passthrough() {
        let t = transport();
        assert_eq!(
            t.url_for("https://cdn.example.com/x"),
            "https://cdn.example.com/x"
        );
    }

    #[test]
    fn test_new_from_config() {
        let config = ClientConfig::builder()
            .base_url("https://api.stratezone.test")
            .build();
        let t = ReqwestTransport::new(&config).unwrap();
        assert_eq!(t.base_url, "https://api.stratezone.test");
    }
}
