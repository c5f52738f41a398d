//! Credential handling for the StrateZone backend
//!
//! # Overview
//!
//! Protected calls carry `Authorization: Bearer <access token>`. When the
//! backend answers 401 the access token has expired and must be renewed with
//! the refresh token. This module keeps that renewal to one call at a time:
//!
//! 1. [`AuthCoordinator::execute`] runs the request with the stored token
//! 2. On 401, the first caller refreshes through a [`Refresher`]
//! 3. Callers that hit 401 meanwhile wait for that refresh
//! 4. Everyone replays their request once with the new token
//! 5. If refresh fails, stored credentials are cleared and every caller gets
//!    [`ApiError::AuthExpired`](crate::ApiError::AuthExpired)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratezone_client::auth::{AuthCoordinator, CredentialVault, HttpRefresher, MemoryCredentialStore};
//! use stratezone_client::config::RefreshTokenPlacement;
//! use stratezone_client::transport::{ApiRequest, ReqwestTransport, Transport};
//! use stratezone_client::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder().base_url("https://api.stratezone.vn").build();
//! let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);
//! let refresher = HttpRefresher::new(transport.clone(), "/api/auth/refresh-token", RefreshTokenPlacement::default());
//! let coordinator = AuthCoordinator::new(
//!     CredentialVault::new(Arc::new(MemoryCredentialStore::new())),
//!     Arc::new(refresher),
//! );
//!
//! let response = coordinator
//!     .execute(|token| {
//!         let transport = transport.clone();
//!         async move {
//!             let request = ApiRequest::get("/api/tables").with_bearer(token.as_ref());
//!             transport.send(request).await?.error_for_status()
//!         }
//!     })
//!     .await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```
//!
//! # Storage
//!
//! Credentials are persisted through a [`CredentialStore`]. The pair is
//! written as a single value, so a store never holds an access token without
//! its refresh token. [`FileCredentialStore`] keeps them in the platform
//! config directory with user-only permissions (600).

mod coordinator;
mod credentials;
mod refresh;
mod store;

pub use coordinator::{AuthCoordinator, SessionExpiredHandler};
pub(crate) use credentials::TokenPayload;
pub use credentials::{AccessToken, Credentials, RefreshToken};
pub use refresh::{HttpRefresher, RefreshFailure, Refresher};
pub use store::{
    CREDENTIALS_KEY, CredentialStore, CredentialVault, FileCredentialStore, MemoryCredentialStore,
    StoreError,
};
