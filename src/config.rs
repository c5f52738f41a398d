//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{ApiError, Result};

/// Default refresh endpoint path
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh-token";
/// Default login endpoint path
pub const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
/// Default bound on a single refresh call
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);
/// Default bound on ordinary requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_API_URL: &str = "STRATEZONE_API_URL";
const ENV_REFRESH_TIMEOUT: &str = "STRATEZONE_REFRESH_TIMEOUT_SECS";
const ENV_REQUEST_TIMEOUT: &str = "STRATEZONE_REQUEST_TIMEOUT_SECS";

/// Where the refresh token goes on the refresh request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefreshTokenPlacement {
    /// `?<param>=<refresh token>`
    Query {
        /// Query parameter name
        param: String,
    },
    /// JSON body `{ "<field>": "<refresh token>" }`
    Body {
        /// Body field name
        field: String,
    },
}

impl Default for RefreshTokenPlacement {
    fn default() -> Self {
        Self::Query {
            param: "refreshToken".to_string(),
        }
    }
}

impl RefreshTokenPlacement {
    /// Send the refresh token in a JSON body field
    pub fn body(field: impl Into<String>) -> Self {
        Self::Body {
            field: field.into(),
        }
    }

    /// Send the refresh token as a query parameter
    pub fn query(param: impl Into<String>) -> Self {
        Self::Query {
            param: param.into(),
        }
    }
}

/// Configuration for [`ApiClient`](crate::ApiClient)
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ClientConfig"),
    builder_type(doc = "Builder for ClientConfig", vis = "pub"),
    build_method(doc = "Build the ClientConfig")
)]
pub struct ClientConfig {
    /// Backend base URL, e.g. `https://api.stratezone.vn`
    #[builder(setter(into))]
    pub base_url: String,

    /// Refresh endpoint path
    #[builder(default = DEFAULT_REFRESH_PATH.to_string(), setter(into))]
    pub refresh_path: String,

    /// Login endpoint path
    #[builder(default = DEFAULT_LOGIN_PATH.to_string(), setter(into))]
    pub login_path: String,

    /// How the refresh token is sent
    #[builder(default)]
    pub refresh_placement: RefreshTokenPlacement,

    /// Upper bound on one refresh call; expiry counts as refresh failure
    #[builder(default = DEFAULT_REFRESH_TIMEOUT)]
    pub refresh_timeout: Duration,

    /// Upper bound on ordinary requests
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,

    /// User-Agent header override
    #[builder(default, setter(strip_option, into))]
    pub user_agent: Option<String>,
}

impl ClientConfig {
    /// Build configuration from `STRATEZONE_*` environment variables.
    ///
    /// `STRATEZONE_API_URL` is required. The timeout variables are optional
    /// and given in whole seconds.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidConfig`] if the URL is missing or a timeout
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup(ENV_API_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ApiError::invalid_config(format!("{ENV_API_URL} is not set")))?;

        let seconds = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    ApiError::invalid_config(format!("{key}={raw:?} is not a number of seconds: {e}"))
                }),
            }
        };

        let config = Self::builder()
            .base_url(base_url)
            .refresh_timeout(seconds(ENV_REFRESH_TIMEOUT, DEFAULT_REFRESH_TIMEOUT)?)
            .request_timeout(seconds(ENV_REQUEST_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)?)
            .build();
        config.validate()?;
        Ok(config)
    }

    /// Check the values that would otherwise fail late
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidConfig`] describing the first bad field
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ApiError::invalid_config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.refresh_timeout.is_zero() {
            return Err(ApiError::invalid_config("refresh_timeout must be non-zero"));
        }
        Ok(())
    }
}
