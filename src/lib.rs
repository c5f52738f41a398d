//! # StrateZone client for Rust
//!
//! Async client for the StrateZone chess club backend: table booking, store,
//! tournaments, courses, community and wallet endpoints all sit behind the
//! same bearer-token authentication. This crate makes that authentication
//! transparent.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratezone_client::{ApiClient, ClientConfig};
//! use stratezone_client::auth::FileCredentialStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.stratezone.vn")
//!         .build();
//!     let client = ApiClient::new(config, Arc::new(FileCredentialStore::new()))?;
//!
//!     client.login("player@example.com", "hunter2").await?;
//!     let wallet: serde_json::Value = client.get_json("/api/wallets/me").await?;
//!     println!("{wallet}");
//!     Ok(())
//! }
//! ```
//!
//! ## Token Refresh
//!
//! Access tokens are short-lived. When a protected call comes back 401, the
//! client trades the refresh token for a new pair and replays the call once.
//! Many concurrent calls failing at the same moment still cause exactly one
//! refresh: the first caller refreshes, the rest wait for it and replay with
//! the result. If the refresh fails, stored credentials are cleared and every
//! waiting call fails with [`ApiError::AuthExpired`].
//!
//! See the [`auth`] module for details.
//!
//! ## Architecture
//!
//! - [`client`]: [`ApiClient`], the entry point for all backend calls
//! - [`auth`]: credentials, stores, refresher and the refresh coordinator
//! - [`transport`]: HTTP abstraction and the reqwest implementation
//! - [`config`]: client configuration (builder and environment)
//! - [`error`]: error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Tracing events are always emitted but are zero-cost when no subscriber is attached.
//! Tokens are never logged; only short fingerprints appear in events.
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, ApiError>`](Result):
//!
//! ```no_run
//! # use stratezone_client::{ApiClient, ApiError};
//! # async fn example(client: ApiClient) {
//! match client.get_json::<serde_json::Value>("/api/bookings").await {
//!     Ok(bookings) => println!("{bookings}"),
//!     Err(ApiError::AuthExpired(reason)) => {
//!         eprintln!("Please sign in again ({reason})");
//!     }
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

// Re-export commonly used types
pub use auth::{
    AccessToken, AuthCoordinator, CredentialStore, Credentials, FileCredentialStore,
    MemoryCredentialStore, RefreshFailure, RefreshToken,
};
pub use client::ApiClient;
pub use config::{ClientConfig, RefreshTokenPlacement};
pub use error::{ApiError, Result};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport};

/// Version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
