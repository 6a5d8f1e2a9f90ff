use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    alert::{AlertId, NewSecurityAlert, SecurityAlert},
    device::{NewTrustedDevice, TrustedDevice},
    login::{LoginAction, LoginAttempt, NewLoginAttempt},
    repositories::{
        AccountRepository, LoginHistoryRepository, RepositoryProvider, SecurityAlertRepository,
        TrustedDeviceRepository, UnitOfWork, UnitOfWorkRepository,
    },
};

/// Adapter that wraps a RepositoryProvider and implements [`LoginHistoryRepository`]
pub struct LoginHistoryRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LoginHistoryRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LoginHistoryRepository for LoginHistoryRepositoryAdapter<R> {
    async fn append(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        self.provider.login_history().append(attempt).await
    }

    async fn count_since(
        &self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        self.provider
            .login_history()
            .count_since(user_id, action, since)
            .await
    }

    async fn has_location(&self, user_id: &UserId, location: &str) -> Result<bool, Error> {
        self.provider
            .login_history()
            .has_location(user_id, location)
            .await
    }

    async fn has_ip_address(&self, user_id: &UserId, ip_address: &str) -> Result<bool, Error> {
        self.provider
            .login_history()
            .has_ip_address(user_id, ip_address)
            .await
    }

    async fn find_by_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<LoginAttempt>, Error> {
        self.provider.login_history().find_by_user(user_id, limit).await
    }
}

pub struct TrustedDeviceRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> TrustedDeviceRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> TrustedDeviceRepository for TrustedDeviceRepositoryAdapter<R> {
    async fn find(
        &self,
        user_id: &UserId,
        device_signature: &str,
    ) -> Result<Option<TrustedDevice>, Error> {
        self.provider
            .trusted_device()
            .find(user_id, device_signature)
            .await
    }

    async fn create(&self, device: NewTrustedDevice) -> Result<TrustedDevice, Error> {
        self.provider.trusted_device().create(device).await
    }

    async fn set_blocked(
        &self,
        user_id: &UserId,
        device_signature: &str,
        reason: Option<&str>,
    ) -> Result<TrustedDevice, Error> {
        self.provider
            .trusted_device()
            .set_blocked(user_id, device_signature, reason)
            .await
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<TrustedDevice>, Error> {
        self.provider.trusted_device().find_by_user(user_id).await
    }
}

pub struct SecurityAlertRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> SecurityAlertRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> SecurityAlertRepository for SecurityAlertRepositoryAdapter<R> {
    async fn create(&self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error> {
        self.provider.security_alert().create(alert).await
    }

    async fn find_by_id(&self, id: &AlertId) -> Result<Option<SecurityAlert>, Error> {
        self.provider.security_alert().find_by_id(id).await
    }

    async fn find_unresolved_by_user(&self, user_id: &UserId) -> Result<Vec<SecurityAlert>, Error> {
        self.provider
            .security_alert()
            .find_unresolved_by_user(user_id)
            .await
    }

    async fn resolve(
        &self,
        id: &AlertId,
        resolved_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<SecurityAlert, Error> {
        self.provider
            .security_alert()
            .resolve(id, resolved_at, notes)
            .await
    }
}

pub struct AccountRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> AccountRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> AccountRepository for AccountRepositoryAdapter<R> {
    async fn ensure_account(&self, user_id: &UserId) -> Result<(), Error> {
        self.provider.account().ensure_account(user_id).await
    }

    async fn get_locked_until(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error> {
        self.provider.account().get_locked_until(user_id).await
    }

    async fn set_locked_until(
        &self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        self.provider
            .account()
            .set_locked_until(user_id, locked_until)
            .await
    }
}

pub struct UnitOfWorkRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UnitOfWorkRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UnitOfWorkRepository for UnitOfWorkRepositoryAdapter<R> {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, Error> {
        self.provider.unit_of_work().begin().await
    }
}
