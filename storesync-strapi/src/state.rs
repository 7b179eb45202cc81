//! Process-wide session state.
//!
//! One [`SessionState`] is shared (behind an `Arc`) by every component that
//! talks to the CMS: the session manager, the health gate and the transport.
//! It holds the cached user tokens, the single super-admin slot, the current
//! retry window, the last health probe result and whether the service
//! account exists yet.
//!
//! Lifecycle: created once per engine with [`SessionState::new`]; cleared
//! with [`SessionState::reset`], which forgets every token and forces the
//! next health check to probe. Nothing here is persisted.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// A cached content-API login.
#[derive(Debug, Clone)]
pub struct UserSession {
    /// Bearer token
    pub token: String,
    /// When the token was obtained
    pub acquired_at: Instant,
    /// User record returned with the token
    pub user: Value,
}

/// The super-admin login slot.
#[derive(Debug, Clone, Default)]
pub struct AdminSession {
    pub token: Option<String>,
    pub user: Option<Value>,
    /// Start of the most recent login attempt, successful or not
    pub last_attempt: Option<Instant>,
}

/// Last known CMS health.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthStatus {
    pub healthy: bool,
    pub last_check: Option<Instant>,
}

/// Shared mutable state of one engine instance.
#[derive(Debug)]
pub struct SessionState {
    users: RwLock<HashMap<String, UserSession>>,
    admin: RwLock<AdminSession>,
    retry_window: RwLock<Duration>,
    initial_retry_window: Duration,
    health: RwLock<HealthStatus>,
    service_account: watch::Sender<bool>,
}

impl SessionState {
    /// Create empty state with the given initial retry window.
    pub fn new(retry_window: Duration) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            admin: RwLock::new(AdminSession::default()),
            retry_window: RwLock::new(retry_window),
            initial_retry_window: retry_window,
            health: RwLock::new(HealthStatus::default()),
            service_account: watch::channel(false).0,
        }
    }

    /// Token reuse window.
    pub fn retry_window(&self) -> Duration {
        *self.retry_window.read()
    }

    /// Replace the token reuse window, typically with a rate-limit delay.
    pub fn set_retry_window(&self, window: Duration) {
        *self.retry_window.write() = window;
    }

    /// Cached session for `email` (case-insensitive).
    pub fn user_session(&self, email: &str) -> Option<UserSession> {
        self.users.read().get(&email.to_lowercase()).cloned()
    }

    /// Cache a session for `email` (case-insensitive).
    pub fn store_user_session(&self, email: &str, session: UserSession) {
        self.users.write().insert(email.to_lowercase(), session);
    }

    /// Forget the session for `email`.
    pub fn remove_user_session(&self, email: &str) -> Option<UserSession> {
        self.users.write().remove(&email.to_lowercase())
    }

    /// Snapshot of the admin slot.
    pub fn admin(&self) -> AdminSession {
        self.admin.read().clone()
    }

    /// Record the start of an admin login attempt.
    pub fn record_admin_attempt(&self, at: Instant) {
        self.admin.write().last_attempt = Some(at);
    }

    /// Store a fresh admin login.
    pub fn store_admin(&self, token: String, user: Option<Value>) {
        let mut admin = self.admin.write();
        admin.token = Some(token);
        admin.user = user;
    }

    /// Drop the admin token, keeping the attempt time.
    pub fn clear_admin_token(&self) {
        self.admin.write().token = None;
    }

    /// Last known health.
    pub fn health(&self) -> HealthStatus {
        *self.health.read()
    }

    /// Record a probe result.
    pub fn record_health(&self, healthy: bool, at: Instant) {
        *self.health.write() = HealthStatus {
            healthy,
            last_check: Some(at),
        };
    }

    /// Whether the default service account has been registered.
    pub fn service_account_ready(&self) -> bool {
        *self.service_account.borrow()
    }

    /// Mark the service account as registered (or gone), waking waiters.
    pub fn set_service_account_ready(&self, ready: bool) {
        self.service_account.send_replace(ready);
    }

    /// Wait until the service account is registered, for at most `limit`.
    ///
    /// Returns whether it became ready in time.
    pub async fn wait_for_service_account(&self, limit: Duration) -> bool {
        let mut ready = self.service_account.subscribe();
        matches!(
            tokio::time::timeout(limit, ready.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        )
    }

    /// Forget all tokens and health, and restore the initial retry window.
    pub fn reset(&self) {
        self.users.write().clear();
        *self.admin.write() = AdminSession::default();
        *self.retry_window.write() = self.initial_retry_window;
        *self.health.write() = HealthStatus::default();
        self.service_account.send_replace(false);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Duration::from_secs(180))
    }
}
