//! SQLite implementation of the security alert repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    AlertId, Error, NewSecurityAlert, SecurityAlert, UserId,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::SecurityAlertRepository,
};

use crate::{from_optional_timestamp, from_timestamp, parse_column};

pub struct SqliteSecurityAlertRepository {
    pool: SqlitePool,
}

impl SqliteSecurityAlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteSecurityAlert {
    id: String,
    user_id: String,
    alert_type: String,
    title: String,
    description: String,
    severity: String,
    created_at: i64,
    is_resolved: bool,
    resolved_at: Option<i64>,
    resolution_notes: Option<String>,
    additional_data: Option<String>,
}

impl TryFrom<SqliteSecurityAlert> for SecurityAlert {
    type Error = Error;

    fn try_from(row: SqliteSecurityAlert) -> Result<Self, Self::Error> {
        let additional_data: Option<serde_json::Value> = row
            .additional_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| {
                tracing::error!(alert_id = %row.id, error = %e, "Unreadable alert data");
                Error::Storage(StorageError::Database(
                    "Invalid value in security_alerts.additional_data".to_string(),
                ))
            })?;

        Ok(SecurityAlert {
            alert_type: parse_column(&row.alert_type, "security_alerts.alert_type")?,
            severity: parse_column(&row.severity, "security_alerts.severity")?,
            created_at: from_timestamp(row.created_at, "security_alerts.created_at")?,
            resolved_at: from_optional_timestamp(row.resolved_at, "security_alerts.resolved_at")?,
            id: AlertId::from(row.id),
            user_id: UserId::from(row.user_id),
            title: row.title,
            description: row.description,
            is_resolved: row.is_resolved,
            resolution_notes: row.resolution_notes,
            additional_data,
        })
    }
}

pub(crate) async fn insert_alert<'e, E>(
    executor: E,
    alert: NewSecurityAlert,
) -> Result<SecurityAlert, Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let additional_data = alert
        .additional_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| {
            Error::Storage(StorageError::Database(format!(
                "Failed to serialize alert data: {e}"
            )))
        })?;

    let row = sqlx::query_as::<_, SqliteSecurityAlert>(
        r#"
        INSERT INTO security_alerts (
            id, user_id, alert_type, title, description, severity,
            created_at, is_resolved, additional_data
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(alert.id.as_str())
    .bind(alert.user_id.as_str())
    .bind(alert.alert_type.as_str())
    .bind(&alert.title)
    .bind(&alert.description)
    .bind(alert.severity.as_str())
    .bind(alert.created_at.timestamp())
    .bind(additional_data)
    .fetch_one(executor)
    .await
    .map_db_err("Failed to create security alert")?;

    row.try_into()
}

#[async_trait]
impl SecurityAlertRepository for SqliteSecurityAlertRepository {
    async fn create(&self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error> {
        insert_alert(&self.pool, alert).await
    }

    async fn find_by_id(&self, id: &AlertId) -> Result<Option<SecurityAlert>, Error> {
        let row = sqlx::query_as::<_, SqliteSecurityAlert>(
            "SELECT * FROM security_alerts WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err("Failed to find security alert")?;

        row.map(SecurityAlert::try_from).transpose()
    }

    async fn find_unresolved_by_user(&self, user_id: &UserId) -> Result<Vec<SecurityAlert>, Error> {
        // rowid breaks ties between alerts raised within the same second
        let rows = sqlx::query_as::<_, SqliteSecurityAlert>(
            r#"
            SELECT *
            FROM security_alerts
            WHERE user_id = ? AND is_resolved = 0
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_db_err("Failed to list security alerts")?;

        rows.into_iter().map(SecurityAlert::try_from).collect()
    }

    async fn resolve(
        &self,
        id: &AlertId,
        resolved_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<SecurityAlert, Error> {
        let row = sqlx::query_as::<_, SqliteSecurityAlert>(
            r#"
            UPDATE security_alerts
            SET is_resolved = 1, resolved_at = ?, resolution_notes = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(resolved_at.timestamp())
        .bind(notes)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err("Failed to resolve security alert")?;

        row.ok_or_else(|| Error::Storage(StorageError::NotFound(format!("Alert {id}"))))?
            .try_into()
    }
}
