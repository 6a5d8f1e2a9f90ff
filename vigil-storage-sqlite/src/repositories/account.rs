//! SQLite implementation of the account lockout repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{
    Error, UserId,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::AccountRepository,
};

use crate::from_optional_timestamp;

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn select_locked_until<'e, E>(
    executor: E,
    user_id: &UserId,
) -> Result<Option<DateTime<Utc>>, Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT locked_until FROM users WHERE id = ?")
        .bind(user_id.as_str())
        .fetch_optional(executor)
        .await
        .map_db_err("Failed to get locked_until")?;

    from_optional_timestamp(row.and_then(|(ts,)| ts), "users.locked_until")
}

pub(crate) async fn update_locked_until<'e, E>(
    executor: E,
    user_id: &UserId,
    locked_until: Option<DateTime<Utc>>,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
        .bind(locked_until.map(|dt| dt.timestamp()))
        .bind(user_id.as_str())
        .execute(executor)
        .await
        .map_db_err("Failed to set locked_until")?;

    if result.rows_affected() == 0 {
        return Err(Error::Storage(StorageError::NotFound(format!(
            "User {user_id}"
        ))));
    }

    Ok(())
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn ensure_account(&self, user_id: &UserId) -> Result<(), Error> {
        sqlx::query("INSERT OR IGNORE INTO users (id, created_at) VALUES (?, ?)")
            .bind(user_id.as_str())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_db_err("Failed to register account")?;

        Ok(())
    }

    async fn get_locked_until(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error> {
        select_locked_until(&self.pool, user_id).await
    }

    async fn set_locked_until(
        &self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        update_locked_until(&self.pool, user_id, locked_until).await
    }
}
