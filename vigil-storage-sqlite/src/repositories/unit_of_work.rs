//! SQLite unit of work backed by a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use vigil_core::{
    Error, LoginAction, LoginAttempt, NewLoginAttempt, NewSecurityAlert, NewTrustedDevice,
    SecurityAlert, TrustedDevice, UserId,
    error::utilities::DatabaseResultExt,
    repositories::{UnitOfWork, UnitOfWorkRepository},
};

use super::{
    account::{select_locked_until, update_locked_until},
    alert::insert_alert,
    login_history::{count_attempts_since, insert_attempt},
    trusted_device::upsert_device,
};

pub struct SqliteUnitOfWorkRepository {
    pool: SqlitePool,
}

impl SqliteUnitOfWorkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnitOfWorkRepository for SqliteUnitOfWorkRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, Error> {
        let tx = self
            .pool
            .begin()
            .await
            .map_db_err("Failed to begin transaction")?;

        Ok(Box::new(SqliteUnitOfWork { tx }))
    }
}

/// Rolled back when dropped without [`commit`](UnitOfWork::commit)
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn append_attempt(&mut self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        insert_attempt(&mut *self.tx, attempt).await
    }

    async fn count_since(
        &mut self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        count_attempts_since(&mut *self.tx, user_id, action, since).await
    }

    async fn create_alert(&mut self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error> {
        insert_alert(&mut *self.tx, alert).await
    }

    async fn upsert_trusted_device(
        &mut self,
        device: NewTrustedDevice,
    ) -> Result<Option<TrustedDevice>, Error> {
        upsert_device(&mut *self.tx, device).await
    }

    async fn get_locked_until(&mut self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error> {
        select_locked_until(&mut *self.tx, user_id).await
    }

    async fn set_locked_until(
        &mut self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        update_locked_until(&mut *self.tx, user_id, locked_until).await
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx
            .commit()
            .await
            .map_db_err("Failed to commit transaction")
    }
}
