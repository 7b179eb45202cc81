//! Startup sequence against the CMS.

use crate::admin::AdminApi;
use crate::error::Result;
use tracing::{error, info, warn};

/// What [`Bootstrap::initialize`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub admin_registered: bool,
    pub default_user_registered: bool,
    pub synced: bool,
}

/// Accounts setup and optional initial sync.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    admin: AdminApi,
    sync_on_init: bool,
    auto_start: bool,
}

impl Bootstrap {
    pub fn new(admin: AdminApi, sync_on_init: bool, auto_start: bool) -> Self {
        Self {
            admin,
            sync_on_init,
            auto_start,
        }
    }

    /// Register or log in both accounts, then sync when configured.
    ///
    /// Registration failures are expected on restarts and only logged.
    /// Failing to obtain the admin token aborts startup.
    pub async fn initialize(&self) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();
        let sessions = self.admin.client().sessions();

        match self.admin.register_super_admin().await {
            Ok(_) => report.admin_registered = true,
            Err(e) => info!(error = %e, "Super admin registration skipped"),
        }

        let admin_token = sessions.admin_token(false).await.inspect_err(|e| {
            error!(error = %e, "Unable to obtain CMS admin token");
        })?;

        match self.admin.register_default_user().await {
            Ok(_) => report.default_user_registered = true,
            Err(e) => info!(error = %e, "Default user registration skipped"),
        }

        sessions
            .get_token(&self.admin.default_credentials(), false)
            .await?;
        sessions.state().set_service_account_ready(true);

        if self.sync_on_init {
            match self.admin.execute_sync(&admin_token).await {
                Ok(_) => report.synced = true,
                Err(e) => warn!(error = %e, "Initial sync request failed"),
            }
        }

        info!(
            admin_registered = report.admin_registered,
            default_user_registered = report.default_user_registered,
            synced = report.synced,
            "CMS bootstrap complete"
        );
        Ok(report)
    }

    /// Wait for the CMS and initialize when auto start is enabled.
    pub async fn start(&self) -> Result<Option<BootstrapReport>> {
        if !self.auto_start {
            return Ok(None);
        }
        self.admin.client().health().wait_until_healthy().await?;
        self.initialize().await.map(Some)
    }
}
