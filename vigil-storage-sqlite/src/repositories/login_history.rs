//! SQLite implementation of the login history repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    DeviceInfo, Error, LoginAction, LoginAttempt, NewLoginAttempt, SessionId, UserId,
    error::utilities::DatabaseResultExt, repositories::LoginHistoryRepository,
};

use crate::{from_optional_timestamp, from_timestamp, parse_column, score_from_column};

/// SQLite repository for the append-only login history.
pub struct SqliteLoginHistoryRepository {
    pool: SqlitePool,
}

impl SqliteLoginHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginAttempt {
    id: i64,
    user_id: String,
    action: String,
    attempted_at: i64,
    ip_address: String,
    user_agent: String,
    device_type: String,
    os: String,
    browser: String,
    device_name: String,
    device_signature: String,
    location: Option<String>,
    success: bool,
    failure_reason: Option<String>,
    is_suspicious: bool,
    risk_score: i64,
    risk_level: String,
    session_id: Option<String>,
    session_expires_at: Option<i64>,
}

impl TryFrom<SqliteLoginAttempt> for LoginAttempt {
    type Error = Error;

    fn try_from(row: SqliteLoginAttempt) -> Result<Self, Self::Error> {
        Ok(LoginAttempt {
            id: row.id,
            user_id: UserId::from(row.user_id),
            action: parse_column(&row.action, "login_attempts.action")?,
            attempted_at: from_timestamp(row.attempted_at, "login_attempts.attempted_at")?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            device: DeviceInfo {
                device_type: parse_column(&row.device_type, "login_attempts.device_type")?,
                os: row.os,
                browser: row.browser,
                display_name: row.device_name,
            },
            device_signature: row.device_signature,
            location: row.location,
            success: row.success,
            failure_reason: row.failure_reason,
            is_suspicious: row.is_suspicious,
            risk_score: score_from_column(row.risk_score, "login_attempts.risk_score")?,
            risk_level: parse_column(&row.risk_level, "login_attempts.risk_level")?,
            session_id: row.session_id.map(SessionId::from),
            session_expires_at: from_optional_timestamp(
                row.session_expires_at,
                "login_attempts.session_expires_at",
            )?,
        })
    }
}

pub(crate) async fn insert_attempt<'e, E>(
    executor: E,
    attempt: NewLoginAttempt,
) -> Result<LoginAttempt, Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO login_attempts (
            user_id, action, attempted_at, ip_address, user_agent,
            device_type, os, browser, device_name, device_signature,
            location, success, failure_reason, is_suspicious,
            risk_score, risk_level, session_id, session_expires_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(attempt.user_id.as_str())
    .bind(attempt.action.as_str())
    .bind(attempt.attempted_at.timestamp())
    .bind(&attempt.ip_address)
    .bind(&attempt.user_agent)
    .bind(attempt.device.device_type.as_str())
    .bind(&attempt.device.os)
    .bind(&attempt.device.browser)
    .bind(&attempt.device.display_name)
    .bind(&attempt.device_signature)
    .bind(&attempt.location)
    .bind(attempt.success)
    .bind(&attempt.failure_reason)
    .bind(attempt.is_suspicious)
    .bind(i64::from(attempt.risk_score))
    .bind(attempt.risk_level.as_str())
    .bind(attempt.session_id.as_ref().map(SessionId::as_str))
    .bind(attempt.session_expires_at.map(|dt| dt.timestamp()))
    .fetch_one(executor)
    .await
    .map_db_err("Failed to append login attempt")?;

    Ok(attempt.into_attempt(id))
}

/// Rows for `user_id` with `action` and `attempted_at >= since`
pub(crate) async fn count_attempts_since<'e, E>(
    executor: E,
    user_id: &UserId,
    action: LoginAction,
    since: DateTime<Utc>,
) -> Result<u32, Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM login_attempts
        WHERE user_id = ? AND action = ? AND attempted_at >= ?
        "#,
    )
    .bind(user_id.as_str())
    .bind(action.as_str())
    .bind(since.timestamp())
    .fetch_one(executor)
    .await
    .map_db_err("Failed to count login attempts")?;

    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

#[async_trait]
impl LoginHistoryRepository for SqliteLoginHistoryRepository {
    async fn append(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        insert_attempt(&self.pool, attempt).await
    }

    async fn count_since(
        &self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        count_attempts_since(&self.pool, user_id, action, since).await
    }

    async fn has_location(&self, user_id: &UserId, location: &str) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM login_attempts WHERE user_id = ? AND location = ?)",
        )
        .bind(user_id.as_str())
        .bind(location)
        .fetch_one(&self.pool)
        .await
        .map_db_err("Failed to look up prior location")?;

        Ok(exists)
    }

    async fn has_ip_address(&self, user_id: &UserId, ip_address: &str) -> Result<bool, Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM login_attempts WHERE user_id = ? AND ip_address = ?)",
        )
        .bind(user_id.as_str())
        .bind(ip_address)
        .fetch_one(&self.pool)
        .await
        .map_db_err("Failed to look up prior IP address")?;

        Ok(exists)
    }

    async fn find_by_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<LoginAttempt>, Error> {
        let rows = sqlx::query_as::<_, SqliteLoginAttempt>(
            r#"
            SELECT *
            FROM login_attempts
            WHERE user_id = ?
            ORDER BY attempted_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_db_err("Failed to load login history")?;

        rows.into_iter().map(LoginAttempt::try_from).collect()
    }
}
