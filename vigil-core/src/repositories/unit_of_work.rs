//! Repository trait for all-or-nothing writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    alert::{NewSecurityAlert, SecurityAlert},
    device::{NewTrustedDevice, TrustedDevice},
    login::{LoginAction, LoginAttempt, NewLoginAttempt},
};

/// An open unit of work.
///
/// Writes made through it become visible together on [`commit`](UnitOfWork::commit).
/// Dropping it without committing discards every write. Reads through it see its own
/// uncommitted writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn append_attempt(&mut self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error>;

    /// Count rows for `user_id` with the given action and `attempted_at >= since`
    async fn count_since(
        &mut self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error>;

    async fn create_alert(&mut self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error>;

    /// Register the device with `login_count = 1`, or record another successful login
    /// on it: bump `login_count`, move `last_seen_at`, store the risk score and
    /// recompute the trust level.
    ///
    /// Blocked devices are left unchanged and `None` is returned.
    async fn upsert_trusted_device(
        &mut self,
        device: NewTrustedDevice,
    ) -> Result<Option<TrustedDevice>, Error>;

    async fn get_locked_until(&mut self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error>;

    /// # Errors
    ///
    /// `StorageError::NotFound` when the user record does not exist.
    async fn set_locked_until(
        &mut self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;
}

/// Opens units of work.
#[async_trait]
pub trait UnitOfWorkRepository: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, Error>;
}
