//! SQLite implementation of the trusted-device registry.

use async_trait::async_trait;
use sqlx::SqlitePool;
use vigil_core::{
    DeviceInfo, Error, NewTrustedDevice, TrustLevel, TrustedDevice, UserId,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::TrustedDeviceRepository,
};

use crate::{from_timestamp, parse_column, score_from_column};

/// SQLite repository for trusted devices, unique per `(user_id, device_signature)`.
pub struct SqliteTrustedDeviceRepository {
    pool: SqlitePool,
}

impl SqliteTrustedDeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteTrustedDevice {
    id: i64,
    user_id: String,
    device_signature: String,
    device_type: String,
    os: String,
    browser: String,
    device_name: String,
    first_seen_at: i64,
    last_seen_at: i64,
    login_count: i64,
    is_active: bool,
    blocked_reason: Option<String>,
    trust_level: String,
    risk_score: i64,
}

impl TryFrom<SqliteTrustedDevice> for TrustedDevice {
    type Error = Error;

    fn try_from(row: SqliteTrustedDevice) -> Result<Self, Self::Error> {
        Ok(TrustedDevice {
            id: row.id,
            user_id: UserId::from(row.user_id),
            device_signature: row.device_signature,
            device: DeviceInfo {
                device_type: parse_column(&row.device_type, "trusted_devices.device_type")?,
                os: row.os,
                browser: row.browser,
                display_name: row.device_name,
            },
            first_seen_at: from_timestamp(row.first_seen_at, "trusted_devices.first_seen_at")?,
            last_seen_at: from_timestamp(row.last_seen_at, "trusted_devices.last_seen_at")?,
            login_count: u32::try_from(row.login_count).unwrap_or(u32::MAX),
            is_active: row.is_active,
            blocked_reason: row.blocked_reason,
            trust_level: parse_column(&row.trust_level, "trusted_devices.trust_level")?,
            risk_score: score_from_column(row.risk_score, "trusted_devices.risk_score")?,
        })
    }
}

fn not_found(device_signature: &str) -> Error {
    Error::Storage(StorageError::NotFound(format!(
        "Trusted device {device_signature}"
    )))
}

/// Register the device, or count another successful login on it.
///
/// The trust level is recomputed from the new login count and must agree with
/// [`TrustLevel::from_login_count`]. Blocked devices are not updated and yield `None`.
pub(crate) async fn upsert_device<'e, E>(
    executor: E,
    device: NewTrustedDevice,
) -> Result<Option<TrustedDevice>, Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let seen_at = device.seen_at.timestamp();

    let row = sqlx::query_as::<_, SqliteTrustedDevice>(
        r#"
        INSERT INTO trusted_devices (
            user_id, device_signature, device_type, os, browser, device_name,
            first_seen_at, last_seen_at, login_count, is_active, trust_level, risk_score
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 1, ?, ?)
        ON CONFLICT (user_id, device_signature) DO UPDATE
        SET login_count = login_count + 1,
            last_seen_at = excluded.last_seen_at,
            risk_score = excluded.risk_score,
            trust_level = CASE
                WHEN login_count + 1 >= 10 THEN 'High'
                WHEN login_count + 1 >= 2 THEN 'Medium'
                ELSE 'Low'
            END
        WHERE trusted_devices.is_active = 1
        RETURNING *
        "#,
    )
    .bind(device.user_id.as_str())
    .bind(&device.device_signature)
    .bind(device.device.device_type.as_str())
    .bind(&device.device.os)
    .bind(&device.device.browser)
    .bind(&device.device.display_name)
    .bind(seen_at)
    .bind(seen_at)
    .bind(TrustLevel::from_login_count(1).as_str())
    .bind(i64::from(device.risk_score))
    .fetch_optional(executor)
    .await
    .map_db_err("Failed to upsert trusted device")?;

    row.map(TrustedDevice::try_from).transpose()
}

#[async_trait]
impl TrustedDeviceRepository for SqliteTrustedDeviceRepository {
    async fn find(
        &self,
        user_id: &UserId,
        device_signature: &str,
    ) -> Result<Option<TrustedDevice>, Error> {
        let row = sqlx::query_as::<_, SqliteTrustedDevice>(
            "SELECT * FROM trusted_devices WHERE user_id = ? AND device_signature = ?",
        )
        .bind(user_id.as_str())
        .bind(device_signature)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("Failed to find trusted device")?;

        row.map(TrustedDevice::try_from).transpose()
    }

    async fn create(&self, device: NewTrustedDevice) -> Result<TrustedDevice, Error> {
        let seen_at = device.seen_at.timestamp();

        let row = sqlx::query_as::<_, SqliteTrustedDevice>(
            r#"
            INSERT INTO trusted_devices (
                user_id, device_signature, device_type, os, browser, device_name,
                first_seen_at, last_seen_at, login_count, is_active, trust_level, risk_score
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 1, ?, ?)
            RETURNING *
            "#,
        )
        .bind(device.user_id.as_str())
        .bind(&device.device_signature)
        .bind(device.device.device_type.as_str())
        .bind(&device.device.os)
        .bind(&device.device.browser)
        .bind(&device.device.display_name)
        .bind(seen_at)
        .bind(seen_at)
        .bind(TrustLevel::from_login_count(1).as_str())
        .bind(i64::from(device.risk_score))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                Error::Storage(StorageError::Constraint(format!(
                    "Trusted device {} already exists",
                    device.device_signature
                )))
            } else {
                tracing::error!(error = %e, "Failed to create trusted device");
                Error::Storage(StorageError::Database(
                    "Failed to create trusted device".to_string(),
                ))
            }
        })?;

        row.try_into()
    }

    async fn set_blocked(
        &self,
        user_id: &UserId,
        device_signature: &str,
        reason: Option<&str>,
    ) -> Result<TrustedDevice, Error> {
        let row = sqlx::query_as::<_, SqliteTrustedDevice>(
            r#"
            UPDATE trusted_devices
            SET is_active = ?, blocked_reason = ?
            WHERE user_id = ? AND device_signature = ?
            RETURNING *
            "#,
        )
        .bind(reason.is_none())
        .bind(reason)
        .bind(user_id.as_str())
        .bind(device_signature)
        .fetch_optional(&self.pool)
        .await
        .map_db_err("Failed to update device block state")?;

        row.ok_or_else(|| not_found(device_signature))?.try_into()
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<TrustedDevice>, Error> {
        let rows = sqlx::query_as::<_, SqliteTrustedDevice>(
            r#"
            SELECT *
            FROM trusted_devices
            WHERE user_id = ?
            ORDER BY last_seen_at DESC, id DESC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_db_err("Failed to list trusted devices")?;

        rows.into_iter().map(TrustedDevice::try_from).collect()
    }
}
