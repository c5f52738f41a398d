//! Single-flight credential refresh for authenticated requests
//!
//! [`AuthCoordinator::execute`] runs a request with the stored access token.
//! When the backend answers 401 the coordinator refreshes the credentials and
//! replays the request once. Concurrent callers that hit 401 while a refresh
//! is running queue up behind it instead of starting their own:
//!
//! ```text
//!   Idle ──first 401──▶ Refreshing { waiters } ──settle──▶ Idle
//!                          ▲        │
//!                 later 401s join   └─ waiters released in arrival order
//! ```
//!
//! The refresh-or-wait decision is made under one lock, so each
//! `Idle → Refreshing` transition has exactly one refresher. New credentials
//! are persisted before any waiter is released.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use super::credentials::{AccessToken, Credentials};
use super::refresh::{RefreshFailure, Refresher};
use super::store::CredentialVault;
use crate::config::DEFAULT_REFRESH_TIMEOUT;
use crate::error::{ApiError, Result};

/// Outcome handed to every waiter when a refresh settles
type RefreshOutcome = std::result::Result<AccessToken, RefreshFailure>;

/// Called once per failed refresh cycle (e.g. to route the user to login)
pub type SessionExpiredHandler = Arc<dyn Fn(&RefreshFailure) + Send + Sync>;

/// Refresh bookkeeping. `Refreshing` owns the wait queue, so a queue exists
/// exactly while a refresh is unsettled.
enum RefreshState {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    },
}

/// What a caller does after observing a 401
enum Ticket {
    /// Another caller is refreshing; wait for its outcome
    Wait(oneshot::Receiver<RefreshOutcome>),
    /// Credentials changed since this caller read them; use the newer token
    Stale(AccessToken),
    /// This caller performs the refresh
    Refresh,
}

/// Coordinates access-token attachment, 401 detection and refresh
pub struct AuthCoordinator {
    vault: CredentialVault,
    refresher: Arc<dyn Refresher>,
    state: Mutex<RefreshState>,
    /// Bumped under the state lock each time a refresh settles
    settled_cycles: AtomicU64,
    refresh_timeout: Duration,
    on_session_expired: Option<SessionExpiredHandler>,
}

impl std::fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCoordinator")
            .field("refresh_timeout", &self.refresh_timeout)
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

impl AuthCoordinator {
    /// Create a coordinator over a credential vault and a refresher
    pub fn new(vault: CredentialVault, refresher: Arc<dyn Refresher>) -> Self {
        Self {
            vault,
            refresher,
            state: Mutex::new(RefreshState::Idle),
            settled_cycles: AtomicU64::new(0),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            on_session_expired: None,
        }
    }

    /// Bound each refresh call; expiry counts as refresh failure
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Register a handler invoked once per failed refresh cycle
    #[must_use]
    pub fn on_session_expired<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RefreshFailure) + Send + Sync + 'static,
    {
        self.on_session_expired = Some(Arc::new(handler));
        self
    }

    /// Credential vault this coordinator reads and writes
    #[must_use]
    pub fn vault(&self) -> &CredentialVault {
        &self.vault
    }

    /// True while a refresh is in flight
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of callers queued behind the in-flight refresh
    #[must_use]
    pub fn pending_count(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Run `request` with the current access token, recovering once from 401.
    ///
    /// `request` receives the token to attach (`None` when nothing is stored)
    /// and must be safe to call twice. Any outcome other than a 401
    /// [`ApiError::Upstream`] is returned unchanged. After a 401 the request
    /// is replayed exactly once with a fresh token; a 401 on the replay is
    /// returned as-is.
    ///
    /// # Errors
    ///
    /// - [`ApiError::AuthExpired`] if credentials could not be refreshed
    /// - [`ApiError::Transport`] if the refresh was abandoned by its owner
    /// - whatever `request` returns otherwise
    pub async fn execute<T, F, Fut>(&self, mut request: F) -> Result<T>
    where
        F: FnMut(Option<AccessToken>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let used = self.vault.load()?.map(|c| c.access_token);

        match request(used.clone()).await {
            Err(err) if err.is_unauthorized() => {}
            other => return other,
        }

        tracing::debug!(
            token = ?used,
            "Request rejected with 401, obtaining fresh access token"
        );

        let fresh = self.fresh_token(used.as_ref()).await?;
        request(Some(fresh)).await
    }

    /// Obtain a token newer than `rejected`, refreshing if nobody else is.
    ///
    /// The store is read outside the state lock. If a refresh settles between
    /// that read and taking the lock, the read is stale and is repeated.
    async fn fresh_token(&self, rejected: Option<&AccessToken>) -> Result<AccessToken> {
        let ticket = loop {
            let cycle = self.settled_cycles.load(Ordering::SeqCst);
            let current = self.vault.load()?.map(|c| c.access_token);

            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push_back(tx);
                    tracing::debug!(position = waiters.len(), "Queued behind in-flight refresh");
                    break Ticket::Wait(rx);
                }
                RefreshState::Idle if self.settled_cycles.load(Ordering::SeqCst) != cycle => {
                    tracing::trace!("Refresh settled during credential read, reading again");
                }
                RefreshState::Idle => match current {
                    Some(token) if Some(&token) != rejected => break Ticket::Stale(token),
                    _ => {
                        *state = RefreshState::Refreshing {
                            waiters: VecDeque::new(),
                        };
                        break Ticket::Refresh;
                    }
                },
            }
        };

        match ticket {
            Ticket::Stale(token) => {
                tracing::debug!(token = ?token, "Credentials already refreshed, replaying");
                Ok(token)
            }
            Ticket::Wait(rx) => match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(failure)) => Err(ApiError::auth_expired(failure)),
                Err(_) => Err(ApiError::transport(
                    "refresh abandoned before it settled",
                )),
            },
            Ticket::Refresh => self.run_refresh().await,
        }
    }

    /// Perform the refresh as the single owner of this cycle and settle it.
    async fn run_refresh(&self) -> Result<AccessToken> {
        let mut guard = SettleGuard {
            state: &self.state,
            cycles: &self.settled_cycles,
            settled: false,
        };

        tracing::info!("Refreshing credentials");
        let outcome = match self.refresh_credentials().await {
            Ok(credentials) => match self.vault.save(&credentials) {
                Ok(()) => Ok(credentials.access_token),
                Err(e) => Err(RefreshFailure::Storage(e.to_string())),
            },
            Err(failure) => Err(failure),
        };

        if let Err(failure) = &outcome {
            tracing::warn!(error = %failure, "Credential refresh failed, clearing session");
            if let Err(e) = self.vault.clear() {
                tracing::error!(error = %e, "Failed to clear stored credentials");
            }
            if let Some(handler) = &self.on_session_expired {
                handler(failure);
            }
        }

        let waiters = guard.settle();
        tracing::debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "Refresh settled, releasing waiters"
        );
        for waiter in waiters {
            // A waiter whose caller went away is fine to skip
            let _ = waiter.send(outcome.clone());
        }

        outcome.map_err(ApiError::auth_expired)
    }

    /// Call the refresher with the stored pair, bounded by the timeout.
    async fn refresh_credentials(&self) -> std::result::Result<Credentials, RefreshFailure> {
        let current = self
            .vault
            .load()
            .map_err(|e| RefreshFailure::Storage(e.to_string()))?
            .ok_or(RefreshFailure::MissingRefreshToken)?;

        match tokio::time::timeout(self.refresh_timeout, self.refresher.refresh(&current)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RefreshFailure::Timeout(self.refresh_timeout)),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the coordinator to `Idle` even if the refreshing future is dropped
/// mid-flight. Dropping the queued senders wakes the waiters with an error.
struct SettleGuard<'a> {
    state: &'a Mutex<RefreshState>,
    cycles: &'a AtomicU64,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self) -> VecDeque<oneshot::Sender<RefreshOutcome>> {
        self.settled = true;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.cycles.fetch_add(1, Ordering::SeqCst);
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => VecDeque::new(),
        }
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.settle();
            tracing::warn!(
                waiters = abandoned.len(),
                "Refresh abandoned before settling"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, MemoryCredentialStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::sync::{OnceLock, Weak};

    struct FixedRefresher(std::result::Result<Credentials, RefreshFailure>);

    #[async_trait]
    impl Refresher for FixedRefresher {
        async fn refresh(&self, _current: &Credentials) -> std::result::Result<Credentials, RefreshFailure> {
            self.0.clone()
        }
    }

    fn coordinator(result: std::result::Result<Credentials, RefreshFailure>) -> AuthCoordinator {
        let vault = CredentialVault::new(Arc::new(MemoryCredentialStore::new()));
        AuthCoordinator::new(vault, Arc::new(FixedRefresher(result)))
    }

    #[tokio::test]
    async fn test_idle_by_default() {
        let coordinator = coordinator(Err(RefreshFailure::MissingAccessToken));
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_request_sees_no_token_when_store_empty() {
        let coordinator = coordinator(Err(RefreshFailure::MissingAccessToken));
        let seen = coordinator
            .execute(|token| async move { Ok(token) })
            .await
            .unwrap();
        assert_eq!(seen, None);
    }

    #[tokio::test]
    async fn test_stale_token_replays_without_refresh() {
        let coordinator = coordinator(Err(RefreshFailure::MissingAccessToken));
        coordinator
            .vault()
            .save(&Credentials::new("NEW", "R"))
            .unwrap();

        let ticket = coordinator
            .fresh_token(Some(&AccessToken::new("OLD")))
            .await
            .unwrap();
        assert_eq!(ticket, AccessToken::new("NEW"));
        assert!(!coordinator.is_refreshing());
    }

    /// Store that runs `on_get` after every read, with the coordinator in view
    struct ObservedStore {
        inner: MemoryCredentialStore,
        coordinator: OnceLock<Weak<AuthCoordinator>>,
        on_get: Box<dyn Fn(&MemoryCredentialStore, &AuthCoordinator) + Send + Sync>,
    }

    impl CredentialStore for ObservedStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
            let value = self.inner.get(key)?;
            if let Some(coordinator) = self.coordinator.get().and_then(Weak::upgrade) {
                (self.on_get)(&self.inner, &coordinator);
            }
            Ok(value)
        }
        fn set(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> std::result::Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    fn observed_coordinator(
        result: std::result::Result<Credentials, RefreshFailure>,
        on_get: impl Fn(&MemoryCredentialStore, &AuthCoordinator) + Send + Sync + 'static,
    ) -> Arc<AuthCoordinator> {
        let store = Arc::new(ObservedStore {
            inner: MemoryCredentialStore::new(),
            coordinator: OnceLock::new(),
            on_get: Box::new(on_get),
        });
        let vault = CredentialVault::new(store.clone());
        vault.save(&Credentials::new("T1", "R1")).unwrap();
        let coordinator = Arc::new(AuthCoordinator::new(vault, Arc::new(FixedRefresher(result))));
        store.coordinator.set(Arc::downgrade(&coordinator)).unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_store_is_never_read_under_state_lock() {
        let reads_under_lock = Arc::new(AtomicU64::new(0));
        let counter = reads_under_lock.clone();
        let coordinator = observed_coordinator(Ok(Credentials::new("T2", "R2")), move |_, c| {
            if c.state.try_lock().is_err() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let result = coordinator
            .execute(|token| async move {
                match token {
                    Some(t) if t.as_str() == "T2" => Ok(()),
                    _ => Err(ApiError::upstream(401, "")),
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(reads_under_lock.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_settling_during_read_is_not_repeated() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        // Refreshing again would fail, so success proves the newer token was reused
        let coordinator = observed_coordinator(Err(RefreshFailure::MissingAccessToken), move |inner, c| {
            if !flag.swap(true, Ordering::SeqCst) {
                let newer = serde_json::to_string(&Credentials::new("T2", "R2")).unwrap();
                inner.set(crate::auth::CREDENTIALS_KEY, &newer).unwrap();
                c.settled_cycles.fetch_add(1, Ordering::SeqCst);
            }
        });

        let token = coordinator
            .fresh_token(Some(&AccessToken::new("T1")))
            .await
            .unwrap();

        assert_eq!(token, AccessToken::new("T2"));
        assert!(fired.load(Ordering::SeqCst));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_settle_guard_resets_state_on_drop() {
        let coordinator = coordinator(Err(RefreshFailure::MissingAccessToken));
        *coordinator.lock_state() = RefreshState::Refreshing {
            waiters: VecDeque::new(),
        };
        let (tx, rx) = oneshot::channel();
        if let RefreshState::Refreshing { waiters } = &mut *coordinator.lock_state() {
            waiters.push_back(tx);
        }

        drop(SettleGuard {
            state: &coordinator.state,
            cycles: &coordinator.settled_cycles,
            settled: false,
        });

        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.settled_cycles.load(Ordering::SeqCst), 1);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_storage_failure_after_refresh_is_auth_expired() {
        struct BrokenStore;
        impl CredentialStore for BrokenStore {
            fn get(&self, _key: &str) -> std::result::Result<Option<String>, StoreError> {
                Ok(Some(r#"{"accessToken":"T1","refreshToken":"R1"}"#.to_string()))
            }
            fn set(&self, _key: &str, _value: &str) -> std::result::Result<(), StoreError> {
                Err(StoreError::Backend("disk full".to_string()))
            }
            fn remove(&self, _key: &str) -> std::result::Result<(), StoreError> {
                Ok(())
            }
        }

        let coordinator = AuthCoordinator::new(
            CredentialVault::new(Arc::new(BrokenStore)),
            Arc::new(FixedRefresher(Ok(Credentials::new("T2", "R2")))),
        );

        let err = coordinator
            .execute(|_token| async move { Err::<(), _>(ApiError::upstream(401, "")) })
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApiError::AuthExpired(RefreshFailure::Storage(msg)) if msg.contains("disk full"))
        );
    }
}
