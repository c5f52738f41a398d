//! `ApiClient`: the single entry point to the StrateZone backend
//!
//! Every protected call goes through one [`AuthCoordinator`], so bookings,
//! orders, tournaments and wallet calls all share the same refresh behavior.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                    ApiClient                       │
//! │                                                    │
//! │  send / get_json / post_json ──▶ AuthCoordinator ─┐│
//! │  send_public / login ─────────────────────────┐   ││
//! │                                               ▼   ▼│
//! │                                      Arc<dyn Transport>
//! │                                                    │
//! │  AuthCoordinator ──▶ HttpRefresher ──▶ Transport   │
//! │          └────────▶ CredentialVault ──▶ Store      │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratezone_client::{ApiClient, ClientConfig};
//! use stratezone_client::auth::FileCredentialStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let client = ApiClient::new(config, Arc::new(FileCredentialStore::new()))?;
//!
//! if !client.is_authenticated() {
//!     client.login("player@example.com", "hunter2").await?;
//! }
//!
//! let tables: serde_json::Value = client.get_json("/api/tables").await?;
//! println!("{tables}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::auth::{
    AuthCoordinator, CredentialStore, CredentialVault, Credentials, HttpRefresher, TokenPayload,
};
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

/// Client for the StrateZone REST backend
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<AuthCoordinator>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client over HTTP with the given credential store
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidConfig`] if the configuration is invalid
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::from_parts(config, transport, store))
    }

    /// Create a client over a custom transport
    pub fn from_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let refresher = HttpRefresher::new(
            Arc::clone(&transport),
            config.refresh_path.clone(),
            config.refresh_placement.clone(),
        );
        let coordinator = AuthCoordinator::new(CredentialVault::new(store), Arc::new(refresher))
            .with_refresh_timeout(config.refresh_timeout);

        Self::with_coordinator(config, transport, coordinator)
    }

    /// Create a client around a pre-built coordinator (custom refresher,
    /// session-expired handler, ...)
    pub fn with_coordinator(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        coordinator: AuthCoordinator,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            coordinator: Arc::new(coordinator),
        }
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Coordinator for custom [`AuthCoordinator::execute`] calls
    #[must_use]
    pub fn coordinator(&self) -> &Arc<AuthCoordinator> {
        &self.coordinator
    }

    /// Send a protected request, refreshing credentials on 401.
    ///
    /// # Errors
    /// - [`ApiError::Upstream`] for any non-2xx answer (including a second 401)
    /// - [`ApiError::AuthExpired`] if the session could not be refreshed
    /// - [`ApiError::Transport`] on network failure
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.coordinator
            .execute(|token| {
                let transport = Arc::clone(&self.transport);
                let request = request.clone().with_bearer(token.as_ref());
                async move { transport.send(request).await?.error_for_status() }
            })
            .await
    }

    /// Send a request without credentials and without refresh handling
    ///
    /// # Errors
    /// Returns [`ApiError::Upstream`] for non-2xx answers, or
    /// [`ApiError::Transport`] on network failure
    pub async fn send_public(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport
            .send(request.with_bearer(None))
            .await?
            .error_for_status()
    }

    /// GET a protected resource and decode it
    ///
    /// # Errors
    /// See [`ApiClient::send`]; also [`ApiError::InvalidResponse`] on decode failure
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// POST a JSON body to a protected resource and decode the answer
    ///
    /// # Errors
    /// See [`ApiClient::send`]; also [`ApiError::InvalidResponse`] on decode failure
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(ApiRequest::post(path).json(body)).await?.json()
    }

    /// PUT a JSON body to a protected resource and decode the answer
    ///
    /// # Errors
    /// See [`ApiClient::send`]; also [`ApiError::InvalidResponse`] on decode failure
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send(ApiRequest::put(path).json(body)).await?.json()
    }

    /// DELETE a protected resource
    ///
    /// # Errors
    /// See [`ApiClient::send`]
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    /// Sign in and store the issued credential pair
    ///
    /// # Errors
    /// - [`ApiError::Upstream`] if the backend rejects the login
    /// - [`ApiError::InvalidResponse`] if the answer lacks either token
    /// - [`ApiError::Storage`] if the pair cannot be persisted
    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials> {
        let request = ApiRequest::post(self.config.login_path.clone()).json(serde_json::json!({
            "username": username,
            "password": password,
        }));

        let response = self.send_public(request).await?;
        let payload = TokenPayload::parse(&response.body).map_err(|e| {
            ApiError::invalid_response(format!("Failed to parse login response: {e}"))
        })?;

        let (Some(access_token), Some(refresh_token)) =
            (payload.access_token(), payload.refresh_token())
        else {
            return Err(ApiError::invalid_response(
                "login response did not include both access and refresh tokens",
            ));
        };

        let credentials = Credentials {
            access_token,
            refresh_token,
        };
        self.coordinator.vault().save(&credentials)?;
        tracing::info!(token = ?credentials.access_token, "Signed in");

        Ok(credentials)
    }

    /// Drop the stored credentials
    ///
    /// # Errors
    /// Returns [`ApiError::Storage`] if the store cannot be cleared
    pub fn logout(&self) -> Result<()> {
        self.coordinator.vault().clear()?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Check if a full credential pair is stored
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.coordinator.vault().has_credentials()
    }

    /// Currently stored credentials
    ///
    /// # Errors
    /// Returns [`ApiError::Storage`] if the store cannot be read
    pub fn current_credentials(&self) -> Result<Option<Credentials>> {
        Ok(self.coordinator.vault().load()?)
    }
}
