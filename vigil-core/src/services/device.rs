use std::sync::Arc;

use crate::{
    Error, UserId,
    device::TrustedDevice,
    error::ValidationError,
    repositories::TrustedDeviceRepository,
    validation::validate_user_id,
};

/// Operator-facing access to the trusted-device registry
pub struct TrustedDeviceService<D: TrustedDeviceRepository> {
    repository: Arc<D>,
}

impl<D: TrustedDeviceRepository> TrustedDeviceService<D> {
    pub fn new(repository: Arc<D>) -> Self {
        Self { repository }
    }

    /// All devices for a user, most recently seen first
    pub async fn devices(&self, user_id: &UserId) -> Result<Vec<TrustedDevice>, Error> {
        validate_user_id(user_id)?;
        self.repository.find_by_user(user_id).await
    }

    /// Block a device. Logins from it count as coming from a new device until it is
    /// unblocked.
    pub async fn block_device(
        &self,
        user_id: &UserId,
        device_signature: &str,
        reason: &str,
    ) -> Result<TrustedDevice, Error> {
        validate_user_id(user_id)?;
        if reason.trim().is_empty() {
            return Err(ValidationError::MissingField("Block reason is required".to_string()).into());
        }

        let device = self
            .repository
            .set_blocked(user_id, device_signature, Some(reason))
            .await?;
        tracing::warn!(user_id = %user_id, device_signature, reason, "Trusted device blocked");

        Ok(device)
    }

    pub async fn unblock_device(
        &self,
        user_id: &UserId,
        device_signature: &str,
    ) -> Result<TrustedDevice, Error> {
        validate_user_id(user_id)?;

        let device = self
            .repository
            .set_blocked(user_id, device_signature, None)
            .await?;
        tracing::info!(user_id = %user_id, device_signature, "Trusted device unblocked");

        Ok(device)
    }
}
