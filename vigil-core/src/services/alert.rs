use std::sync::Arc;

use chrono::Utc;

use crate::{
    Error, UserId,
    alert::{AlertId, SecurityAlert},
    error::{StorageError, ValidationError},
    repositories::SecurityAlertRepository,
    validation::validate_user_id,
};

/// Operator-facing access to security alerts
pub struct SecurityAlertService<A: SecurityAlertRepository> {
    repository: Arc<A>,
}

impl<A: SecurityAlertRepository> SecurityAlertService<A> {
    pub fn new(repository: Arc<A>) -> Self {
        Self { repository }
    }

    pub async fn get_alert(&self, alert_id: &AlertId) -> Result<Option<SecurityAlert>, Error> {
        self.repository.find_by_id(alert_id).await
    }

    /// Unresolved alerts for a user, newest first
    pub async fn unresolved_alerts(&self, user_id: &UserId) -> Result<Vec<SecurityAlert>, Error> {
        validate_user_id(user_id)?;
        self.repository.find_unresolved_by_user(user_id).await
    }

    /// Mark an alert as handled
    ///
    /// # Errors
    ///
    /// `NotFound` when the alert does not exist, a validation error when it was
    /// already resolved.
    pub async fn resolve_alert(
        &self,
        alert_id: &AlertId,
        notes: Option<&str>,
    ) -> Result<SecurityAlert, Error> {
        let alert = self
            .repository
            .find_by_id(alert_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Alert {alert_id}")))?;

        if alert.is_resolved {
            return Err(ValidationError::InvalidField(format!(
                "Alert {alert_id} is already resolved"
            ))
            .into());
        }

        let alert = self.repository.resolve(alert_id, Utc::now(), notes).await?;
        tracing::info!(alert_id = %alert_id, user_id = %alert.user_id, "Security alert resolved");

        Ok(alert)
    }
}
