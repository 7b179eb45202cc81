//! Admin API and account management.

use crate::error::{Result, StrapiError};
use crate::http::{CmsRequest, CmsResponse};
use crate::session::Credentials;
use crate::transport::{SendRequest, StrapiClient, StrapiResult, id_string};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use storesync_config::{AdminCredentials, UserCredentials};
use tracing::{error, info, warn};

/// Plugin route creating the service account.
pub const CREATE_USER_PATH: &str = "strapi-plugin-medusajs/create-medusa-user";

/// Plugin route starting a full CMS-side sync.
pub const SYNC_PATH: &str = "strapi-plugin-medusajs/synchronise-medusa-tables";

/// Changes applied by [`AdminApi::update_admin_user`].
#[derive(Debug, Clone)]
pub struct AdminUserUpdate {
    pub email: String,
    pub firstname: String,
    pub password: String,
    pub role: String,
    pub is_active: bool,
}

impl AdminUserUpdate {
    pub fn new(email: impl Into<String>, firstname: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            firstname: firstname.into(),
            password: password.into(),
            role: "Author".to_string(),
            is_active: true,
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminUserBody<'a> {
    email: String,
    firstname: &'a str,
    password: &'a str,
    is_active: bool,
    roles: [i64; 1],
}

/// Super-admin operations and service-account lifecycle.
#[derive(Debug, Clone)]
pub struct AdminApi {
    client: StrapiClient,
    admin: AdminCredentials,
    default_user: UserCredentials,
    plugin_timeout: Duration,
}

impl AdminApi {
    pub fn new(
        client: StrapiClient,
        admin: AdminCredentials,
        default_user: UserCredentials,
        plugin_timeout: Duration,
    ) -> Self {
        Self {
            client,
            admin,
            default_user,
            plugin_timeout,
        }
    }

    pub fn client(&self) -> &StrapiClient {
        &self.client
    }

    /// Credentials of the service account.
    pub fn default_credentials(&self) -> Credentials {
        Credentials::from(&self.default_user)
    }

    /// Register the configured super admin.
    ///
    /// Fails when one is already registered.
    pub async fn register_super_admin(&self) -> Result<Value> {
        self.client.health().wait_until_healthy().await?;

        let url = format!("{}/admin/register-admin", self.client.base_url());
        let request = CmsRequest::new(Method::POST, &url).json(serde_json::to_value(&self.admin)?);
        let response = self.client.http().execute(&request).await?;

        if !response.is_success() {
            warn!(
                status = response.status,
                "Unable to register super admin, it may already exist"
            );
            return Err(StrapiError::Status {
                status: response.status,
                method: "POST".to_string(),
                url,
                body: storesync_log::redacted_string(&response.body),
            });
        }

        info!(email = %self.admin.email, "Registered CMS super admin");
        Ok(response.body.pointer("/data/user").cloned().unwrap_or(Value::Null))
    }

    /// Admin user with `email`, if any.
    pub async fn get_admin_user(&self, email: &str) -> Result<Option<Value>> {
        let query = serde_urlencoded::to_string([
            ("fields[0]", "email"),
            ("filters[email]", email.to_lowercase().as_str()),
        ])
        .map_err(|e| StrapiError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .admin_send(Method::GET, "users", None, None, None, Some(&query))
            .await?;
        Ok(response
            .body
            .pointer("/data/results/0")
            .filter(|user| !user.is_null())
            .cloned())
    }

    pub async fn list_admin_users(&self) -> Result<Value> {
        let response = self
            .client
            .admin_send(Method::GET, "users", None, None, None, None)
            .await?;
        Ok(response.body)
    }

    /// Id of the admin role called `name`.
    pub async fn get_role_id(&self, name: &str) -> Result<Option<i64>> {
        let response = self
            .client
            .admin_send(Method::GET, "roles", None, None, None, None)
            .await?;

        Ok(response
            .body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|roles| {
                roles
                    .iter()
                    .find(|role| role.get("name").and_then(Value::as_str) == Some(name))
            })
            .and_then(|role| role.get("id"))
            .and_then(Value::as_i64))
    }

    /// Update an existing admin user; `None` when no user has that email.
    pub async fn update_admin_user(&self, update: &AdminUserUpdate) -> Result<Option<Value>> {
        let Some(user) = self.get_admin_user(&update.email).await? else {
            return Ok(None);
        };
        let id = Self::user_id(&user)?;
        let role_id = self.get_role_id(&update.role).await?.unwrap_or(-1);

        let body = serde_json::to_value(AdminUserBody {
            email: update.email.to_lowercase(),
            firstname: &update.firstname,
            password: &update.password,
            is_active: update.is_active,
            roles: [role_id],
        })?;

        let response = self
            .client
            .admin_send(Method::PUT, "users", None, Some(&id), Some(&body), None)
            .await?;
        Ok(Some(response.body))
    }

    /// Delete an admin user; `None` when no user has that email.
    pub async fn delete_admin_user(&self, email: &str) -> Result<Option<Value>> {
        let Some(user) = self.get_admin_user(email).await? else {
            return Ok(None);
        };
        let id = Self::user_id(&user)?;
        let response = self
            .client
            .admin_send(Method::DELETE, "users", None, Some(&id), None, None)
            .await?;
        Ok(Some(response.body))
    }

    fn user_id(user: &Value) -> Result<String> {
        user.get("id")
            .and_then(id_string)
            .ok_or_else(|| StrapiError::InvalidRequest("admin user has no id".to_string()))
    }

    /// Create the service account through the CMS plugin.
    pub async fn register_default_user(&self) -> Result<Value> {
        let token = self.client.sessions().admin_token(false).await?;
        let body = serde_json::to_value(&self.default_user)?;

        let response = self.plugin_post(CREATE_USER_PATH, &token, body).await.inspect_err(|e| {
            error!(email = %self.default_user.email, error = %e, "Unable to register default user");
        })?;

        self.client.sessions().state().set_service_account_ready(true);
        info!(email = %self.default_user.email, "Registered default CMS user");
        Ok(response.body.get("data").cloned().unwrap_or(response.body))
    }

    /// Delete the service account and forget its token.
    pub async fn delete_default_user(&self) -> Result<StrapiResult> {
        let creds = self.default_credentials();
        let me = self
            .client
            .send(&SendRequest::get("users").id("me"), &creds)
            .await?;
        let id = me
            .id
            .as_ref()
            .and_then(id_string)
            .ok_or_else(|| StrapiError::InvalidRequest("current user has no id".to_string()))?;

        let result = self
            .client
            .send(&SendRequest::delete("users").id(id), &creds)
            .await?;
        self.client.sessions().invalidate(&creds.email);
        self.client.sessions().state().set_service_account_ready(false);
        Ok(result)
    }

    /// Ask the CMS to pull every synced table.
    pub async fn execute_sync(&self, token: &str) -> Result<CmsResponse> {
        let response = self.plugin_post(SYNC_PATH, token, json!({})).await?;
        info!("Started two-way sync with the CMS");
        Ok(response)
    }

    async fn plugin_post(&self, path: &str, token: &str, body: Value) -> Result<CmsResponse> {
        self.client.health().wait_until_healthy().await?;

        let url = format!("{}/{path}", self.client.base_url());
        let request = CmsRequest::new(Method::POST, &url)
            .bearer(token)
            .json(body)
            .timeout(self.plugin_timeout);
        let response = self.client.http().execute(&request).await?;

        if !response.is_success() {
            let body = storesync_log::redacted_string(&response.body);
            error!(url = %url, status = response.status, response = %body, "CMS plugin call failed");
            return Err(StrapiError::Status {
                status: response.status,
                method: "POST".to_string(),
                url,
                body,
            });
        }
        Ok(response)
    }
}
