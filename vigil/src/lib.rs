//! # Vigil
//!
//! Vigil scores every login your application sees against the user's own history,
//! flags the suspicious ones, and locks accounts that keep failing to authenticate.
//!
//! For each attempt it looks at:
//! - whether the client device has been seen (and trusted) before
//! - whether the source address and its approximate location are new for the user
//! - the hour of day, login bursts, and recent failures
//!
//! The result is a bounded risk score, a risk tier, a history row, and when warranted
//! a security alert for a human to review.
//!
//! ## Storage Support
//!
//! - SQLite (the `sqlite` feature, on by default)
//! - Anything else that implements [`RepositoryProvider`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigil::{UserId, VigilBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vigil = VigilBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let user_id = UserId::new("U1");
//!     vigil.ensure_account(&user_id).await?;
//!
//!     if vigil.is_locked(&user_id).await? {
//!         return Ok(());
//!     }
//!
//!     let attempt = vigil
//!         .record_login(&user_id, "203.0.113.7", "Mozilla/5.0 (X11; Linux x86_64)", true, None)
//!         .await?;
//!     println!("risk {} ({})", attempt.risk_score, attempt.risk_level);
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use vigil_core::{
    repositories::{
        AccountRepository, AccountRepositoryAdapter, LoginHistoryRepositoryAdapter,
        SecurityAlertRepositoryAdapter, TrustedDeviceRepositoryAdapter,
        UnitOfWorkRepositoryAdapter,
    },
    services::{LoginRiskService, SecurityAlertService, TrustedDeviceService},
};

mod builder;

pub use builder::{NoStorage, VigilBuilder, VigilBuilderError, WithStorage};

/// Re-export core types from vigil_core
///
/// These types are commonly used when working with the Vigil API.
pub use vigil_core::{
    AlertId, AlertType, DeviceInfo, Event, EventBus, EventHandler, HashedLocationResolver,
    LocationResolver, LockoutStatus, LoginAction, LoginAttempt, LoginRiskConfig, RepositoryProvider,
    RiskAssessment, RiskLevel, RiskSignals, RiskWeights, SecurityAlert, SessionId,
    StaticLocationResolver, TrustLevel, TrustedDevice, UserId,
    services::FailedLoginOutcome,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use vigil_storage_sqlite::{SqliteRepositoryProvider, SqliteStorage};

/// Errors that can occur when using Vigil.
///
/// Collapses [`vigil_core::Error`] into the three outcomes callers act on.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// The request was rejected before any side effect
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A referenced user, device or alert does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// A storage, location or event handler failure
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<vigil_core::Error> for VigilError {
    fn from(error: vigil_core::Error) -> Self {
        if error.is_invalid_input() {
            VigilError::InvalidInput(error.to_string())
        } else if error.is_not_found() {
            VigilError::NotFound(error.to_string())
        } else {
            VigilError::StorageError(error.to_string())
        }
    }
}

type LoginRisk<R> = LoginRiskService<
    LoginHistoryRepositoryAdapter<R>,
    TrustedDeviceRepositoryAdapter<R>,
    AccountRepositoryAdapter<R>,
    UnitOfWorkRepositoryAdapter<R>,
>;

/// The entry point that wires storage, the evaluator and the admin services together.
///
/// Build one with [`VigilBuilder`], or with [`Vigil::new`] when you already hold a
/// repository provider and the defaults suit you.
pub struct Vigil<R: RepositoryProvider> {
    repositories: Arc<R>,
    accounts: Arc<AccountRepositoryAdapter<R>>,
    login_risk: Arc<LoginRisk<R>>,
    alert_service: Arc<SecurityAlertService<SecurityAlertRepositoryAdapter<R>>>,
    device_service: Arc<TrustedDeviceService<TrustedDeviceRepositoryAdapter<R>>>,
}

impl<R: RepositoryProvider> Vigil<R> {
    /// Create a Vigil instance with the default configuration and
    /// [`HashedLocationResolver`]
    pub fn new(repositories: Arc<R>) -> Self {
        let login_risk = Self::login_risk_service(
            &repositories,
            Arc::new(HashedLocationResolver::default()),
            LoginRiskConfig::default(),
        );
        Self::from_parts(repositories, login_risk)
    }

    pub(crate) fn login_risk_service(
        repositories: &Arc<R>,
        resolver: Arc<dyn LocationResolver>,
        config: LoginRiskConfig,
    ) -> LoginRisk<R> {
        LoginRiskService::new(
            Arc::new(LoginHistoryRepositoryAdapter::new(repositories.clone())),
            Arc::new(TrustedDeviceRepositoryAdapter::new(repositories.clone())),
            Arc::new(AccountRepositoryAdapter::new(repositories.clone())),
            Arc::new(UnitOfWorkRepositoryAdapter::new(repositories.clone())),
            resolver,
            config,
        )
    }

    pub(crate) fn from_parts(repositories: Arc<R>, login_risk: LoginRisk<R>) -> Self {
        let alerts = Arc::new(SecurityAlertRepositoryAdapter::new(repositories.clone()));
        let devices = Arc::new(TrustedDeviceRepositoryAdapter::new(repositories.clone()));

        Self {
            accounts: Arc::new(AccountRepositoryAdapter::new(repositories.clone())),
            alert_service: Arc::new(SecurityAlertService::new(alerts)),
            device_service: Arc::new(TrustedDeviceService::new(devices)),
            login_risk: Arc::new(login_risk),
            repositories,
        }
    }

    pub fn config(&self) -> &LoginRiskConfig {
        self.login_risk.config()
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), VigilError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| VigilError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), VigilError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| VigilError::StorageError(e.to_string()))
    }

    /// Register a user so its lockout state can be stored. Safe to call repeatedly.
    pub async fn ensure_account(&self, user_id: &UserId) -> Result<(), VigilError> {
        vigil_core::validation::validate_user_id(user_id).map_err(vigil_core::Error::from)?;
        Ok(self.accounts.ensure_account(user_id).await?)
    }

    /// Score a login without recording it
    pub async fn assess(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<RiskAssessment, VigilError> {
        Ok(self.login_risk.assess(user_id, ip_address, user_agent).await?)
    }

    /// Evaluate and record a login attempt
    ///
    /// # Arguments
    ///
    /// * `user_id` - The user attempting to log in
    /// * `ip_address` - Source address of the request
    /// * `user_agent` - Raw client signature, usually the `User-Agent` header
    /// * `succeeded` - Whether authentication succeeded
    /// * `failure_reason` - Why it failed, if it did
    ///
    /// # Returns
    ///
    /// The stored history row, carrying the score, tier, and for a successful login
    /// the new session id
    pub async fn record_login(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        succeeded: bool,
        failure_reason: Option<&str>,
    ) -> Result<LoginAttempt, VigilError> {
        Ok(self
            .login_risk
            .record_login(user_id, ip_address, user_agent, succeeded, failure_reason)
            .await?)
    }

    /// Record a failed login, locking the account once the failure threshold is reached
    pub async fn record_failed_login(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        reason: &str,
    ) -> Result<FailedLoginOutcome, VigilError> {
        Ok(self
            .login_risk
            .record_failed_login(user_id, ip_address, user_agent, reason)
            .await?)
    }

    pub async fn record_logout(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        session_id: Option<&SessionId>,
    ) -> Result<LoginAttempt, VigilError> {
        Ok(self
            .login_risk
            .record_logout(user_id, ip_address, user_agent, session_id)
            .await?)
    }

    pub async fn should_lock_account(&self, user_id: &UserId) -> Result<bool, VigilError> {
        Ok(self.login_risk.should_lock_account(user_id).await?)
    }

    /// Lock an account for `lockout_minutes`, or the configured default when `None`
    pub async fn lock_account(
        &self,
        user_id: &UserId,
        reason: &str,
        lockout_minutes: Option<i64>,
    ) -> Result<LockoutStatus, VigilError> {
        Ok(self
            .login_risk
            .lock_account(user_id, reason, lockout_minutes)
            .await?)
    }

    pub async fn unlock_account(&self, user_id: &UserId) -> Result<(), VigilError> {
        Ok(self.login_risk.unlock_account(user_id).await?)
    }

    pub async fn lockout_status(&self, user_id: &UserId) -> Result<LockoutStatus, VigilError> {
        Ok(self.login_risk.lockout_status(user_id).await?)
    }

    pub async fn is_locked(&self, user_id: &UserId) -> Result<bool, VigilError> {
        Ok(self.login_risk.is_locked(user_id).await?)
    }

    /// Most recent history rows for a user, newest first
    pub async fn login_history(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LoginAttempt>, VigilError> {
        Ok(self.login_risk.login_history(user_id, limit).await?)
    }

    pub async fn get_alert(&self, alert_id: &AlertId) -> Result<Option<SecurityAlert>, VigilError> {
        Ok(self.alert_service.get_alert(alert_id).await?)
    }

    /// Unresolved alerts for a user, newest first
    pub async fn unresolved_alerts(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<SecurityAlert>, VigilError> {
        Ok(self.alert_service.unresolved_alerts(user_id).await?)
    }

    pub async fn resolve_alert(
        &self,
        alert_id: &AlertId,
        notes: Option<&str>,
    ) -> Result<SecurityAlert, VigilError> {
        Ok(self.alert_service.resolve_alert(alert_id, notes).await?)
    }

    /// Devices a user has logged in from, most recently seen first
    pub async fn trusted_devices(&self, user_id: &UserId) -> Result<Vec<TrustedDevice>, VigilError> {
        Ok(self.device_service.devices(user_id).await?)
    }

    pub async fn block_device(
        &self,
        user_id: &UserId,
        device_signature: &str,
        reason: &str,
    ) -> Result<TrustedDevice, VigilError> {
        Ok(self
            .device_service
            .block_device(user_id, device_signature, reason)
            .await?)
    }

    pub async fn unblock_device(
        &self,
        user_id: &UserId,
        device_signature: &str,
    ) -> Result<TrustedDevice, VigilError> {
        Ok(self
            .device_service
            .unblock_device(user_id, device_signature)
            .await?)
    }
}
