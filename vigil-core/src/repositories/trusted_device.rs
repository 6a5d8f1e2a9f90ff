//! Repository trait for the trusted-device registry.

use async_trait::async_trait;

use crate::{
    Error, UserId,
    device::{NewTrustedDevice, TrustedDevice},
};

/// Registry of devices keyed by `(user_id, device_signature)`.
///
/// The key is unique. Logins register and bump devices through
/// [`UnitOfWork::upsert_trusted_device`](super::UnitOfWork::upsert_trusted_device);
/// this trait covers lookups, administration and explicit registration.
#[async_trait]
pub trait TrustedDeviceRepository: Send + Sync + 'static {
    async fn find(
        &self,
        user_id: &UserId,
        device_signature: &str,
    ) -> Result<Option<TrustedDevice>, Error>;

    /// Register a device with `login_count = 1`, e.g. to pre-trust it
    ///
    /// # Errors
    ///
    /// `StorageError::Constraint` when the key already exists.
    async fn create(&self, device: NewTrustedDevice) -> Result<TrustedDevice, Error>;

    /// Block the device with `reason`, or unblock it when `reason` is `None`
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` when the device is not registered.
    async fn set_blocked(
        &self,
        user_id: &UserId,
        device_signature: &str,
        reason: Option<&str>,
    ) -> Result<TrustedDevice, Error>;

    /// All devices for `user_id`, most recently seen first
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<TrustedDevice>, Error>;
}
