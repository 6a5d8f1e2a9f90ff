//! Repository trait for security alerts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    alert::{AlertId, NewSecurityAlert, SecurityAlert},
};

/// Alert sink. Has no uniqueness constraint beyond the alert id.
#[async_trait]
pub trait SecurityAlertRepository: Send + Sync + 'static {
    async fn create(&self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error>;

    async fn find_by_id(&self, id: &AlertId) -> Result<Option<SecurityAlert>, Error>;

    /// Unresolved alerts for `user_id`, newest first
    async fn find_unresolved_by_user(&self, user_id: &UserId) -> Result<Vec<SecurityAlert>, Error>;

    /// Mark an alert resolved
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` when the alert does not exist.
    async fn resolve(
        &self,
        id: &AlertId,
        resolved_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<SecurityAlert, Error>;
}
