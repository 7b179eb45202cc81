//! Login and token caching.

use crate::error::{Result, StrapiError};
use crate::health::HealthGate;
use crate::http::{CmsHttp, CmsRequest};
use crate::state::{SessionState, UserSession};
use reqwest::Method;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use storesync_config::{AdminCredentials, UserCredentials};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Email and password of a CMS account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &storesync_log::REDACTED)
            .finish()
    }
}

impl From<&UserCredentials> for Credentials {
    fn from(user: &UserCredentials) -> Self {
        Self::new(&user.email, &user.password)
    }
}

impl From<&AdminCredentials> for Credentials {
    fn from(admin: &AdminCredentials) -> Self {
        Self::new(&admin.email, &admin.password)
    }
}

/// Obtains and caches CMS tokens.
///
/// Content-API tokens are cached per lowercased email. The super-admin
/// token lives in a single slot. Both are reused while younger than the
/// session retry window.
#[derive(Debug, Clone)]
pub struct SessionManager {
    http: CmsHttp,
    health: HealthGate,
    base_url: String,
    admin: Credentials,
    state: Arc<SessionState>,
}

impl SessionManager {
    pub fn new(
        http: CmsHttp,
        health: HealthGate,
        base_url: impl Into<String>,
        admin: Credentials,
        state: Arc<SessionState>,
    ) -> Self {
        Self {
            http,
            health,
            base_url: base_url.into(),
            admin,
            state,
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Log in through `POST {base}/api/auth/local` and cache the session.
    pub async fn login(&self, creds: &Credentials) -> Result<UserSession> {
        self.health.wait_until_healthy().await?;

        let url = format!("{}/api/auth/local", self.base_url);
        let request = CmsRequest::new(Method::POST, &url).json(json!({
            "identifier": creds.email.to_lowercase(),
            "password": creds.password,
        }));

        let response = self.http.execute(&request).await?;
        if !response.is_success() {
            error!(email = %creds.email, status = response.status, "CMS login failed");
            return Err(StrapiError::Login {
                email: creds.email.clone(),
                message: format!("status {}", response.status),
            });
        }

        let token = response
            .body
            .get("jwt")
            .and_then(Value::as_str)
            .ok_or_else(|| StrapiError::MissingToken(creds.email.clone()))?;

        let session = UserSession {
            token: token.to_string(),
            acquired_at: Instant::now(),
            user: response.body.get("user").cloned().unwrap_or(Value::Null),
        };
        self.state.store_user_session(&creds.email, session.clone());
        info!(email = %creds.email, "Logged in to CMS");
        Ok(session)
    }

    /// Token for `creds`, reusing a cached one unless `force_refresh`.
    pub async fn get_token(&self, creds: &Credentials, force_refresh: bool) -> Result<String> {
        if !force_refresh
            && let Some(session) = self.state.user_session(&creds.email)
            && session.acquired_at.elapsed() < self.state.retry_window()
        {
            debug!(email = %creds.email, "Using cached CMS token");
            return Ok(session.token);
        }

        Ok(self.login(creds).await?.token)
    }

    /// Cached token for `email`, if any, regardless of age.
    pub fn cached_token(&self, email: &str) -> Option<String> {
        self.state.user_session(email).map(|s| s.token)
    }

    /// Forget the cached session for `email`.
    pub fn invalidate(&self, email: &str) {
        self.state.remove_user_session(email);
    }

    /// Super-admin token through `POST {base}/admin/login`.
    ///
    /// A cached token is reused while the last login attempt is younger than
    /// the retry window, which also throttles attempts against the admin
    /// login endpoint.
    pub async fn admin_token(&self, force_refresh: bool) -> Result<String> {
        let slot = self.state.admin();
        if !force_refresh
            && let (Some(token), Some(last_attempt)) = (slot.token, slot.last_attempt)
            && last_attempt.elapsed() < self.state.retry_window()
        {
            return Ok(token);
        }

        self.state.record_admin_attempt(Instant::now());
        self.health.wait_until_healthy().await?;

        let url = format!("{}/admin/login", self.base_url);
        let request = CmsRequest::new(Method::POST, &url).json(json!({
            "email": self.admin.email,
            "password": self.admin.password,
        }));

        let response = self.http.execute(&request).await?;
        if !response.is_success() {
            error!(email = %self.admin.email, status = response.status, "Admin login failed");
            return Err(StrapiError::Login {
                email: self.admin.email.clone(),
                message: format!("status {}", response.status),
            });
        }

        let data = response.body.get("data").cloned().unwrap_or(Value::Null);
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| StrapiError::MissingToken(self.admin.email.clone()))?
            .to_string();

        self.state.store_admin(token.clone(), data.get("user").cloned());
        info!(email = %self.admin.email, "Logged in as CMS admin");
        Ok(token)
    }

    /// Admin user record from the last successful admin login.
    pub fn admin_profile(&self) -> Option<Value> {
        self.state.admin().user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthConfig;
    use crate::retry::RateLimitPolicy;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager(base: &str) -> SessionManager {
        let state = Arc::new(SessionState::default());
        let http = CmsHttp::new(Duration::from_secs(5), RateLimitPolicy::default(), state.clone())
            .unwrap();
        let health = HealthGate::new(
            http.client().clone(),
            base,
            HealthConfig::self_test(),
            state.clone(),
        );
        SessionManager::new(
            http,
            health,
            base,
            Credentials::new("admin@example.com", "admin-pw"),
            state,
        )
    }

    #[tokio::test]
    async fn test_login_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/local"))
            .and(body_json(json!({"identifier": "svc@example.com", "password": "pw"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"jwt": "tok-1", "user": {"id": 7}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(&server.uri());
        let creds = Credentials::new("Svc@Example.com", "pw");

        assert_eq!(manager.get_token(&creds, false).await.unwrap(), "tok-1");
        assert_eq!(manager.get_token(&creds, false).await.unwrap(), "tok-1");
        assert_eq!(manager.cached_token("svc@example.com").as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_force_refresh_logs_in_again() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/local"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwt": "tok"})))
            .expect(2)
            .mount(&server)
            .await;

        let manager = manager(&server.uri());
        let creds = Credentials::new("svc@example.com", "pw");
        manager.get_token(&creds, false).await.unwrap();
        manager.get_token(&creds, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_jwt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/local"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {}})))
            .mount(&server)
            .await;

        let manager = manager(&server.uri());
        let err = manager
            .login(&Credentials::new("svc@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrapiError::MissingToken(_)));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/local"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let manager = manager(&server.uri());
        let err = manager
            .get_token(&Credentials::new("svc@example.com", "bad"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StrapiError::Login { .. }));
    }

    #[tokio::test]
    async fn test_admin_token_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"token": "admin-tok", "user": {"id": 1}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager(&server.uri());
        assert_eq!(manager.admin_token(false).await.unwrap(), "admin-tok");
        assert_eq!(manager.admin_token(false).await.unwrap(), "admin-tok");
        assert_eq!(manager.admin_profile(), Some(json!({"id": 1})));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("a@b.c", "hunter2");
        let printed = format!("{creds:?}");
        assert!(!printed.contains("hunter2"));
    }
}
