//! Repository implementations for SQLite storage

pub mod account;
pub mod alert;
pub mod login_history;
pub mod trusted_device;
pub mod unit_of_work;

pub use account::SqliteAccountRepository;
pub use alert::SqliteSecurityAlertRepository;
pub use login_history::SqliteLoginHistoryRepository;
pub use trusted_device::SqliteTrustedDeviceRepository;
pub use unit_of_work::{SqliteUnitOfWork, SqliteUnitOfWorkRepository};

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use vigil_core::{
    Error,
    error::StorageError,
    repositories::{
        AccountRepositoryProvider, LoginHistoryRepositoryProvider, RepositoryProvider,
        SecurityAlertRepositoryProvider, TrustedDeviceRepositoryProvider,
        UnitOfWorkRepositoryProvider,
    },
};
use vigil_migration::MigrationManager;

use crate::migrations::{SqliteMigrationManager, all_migrations};

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    login_history: Arc<SqliteLoginHistoryRepository>,
    trusted_device: Arc<SqliteTrustedDeviceRepository>,
    security_alert: Arc<SqliteSecurityAlertRepository>,
    account: Arc<SqliteAccountRepository>,
    unit_of_work: Arc<SqliteUnitOfWorkRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let login_history = Arc::new(SqliteLoginHistoryRepository::new(pool.clone()));
        let trusted_device = Arc::new(SqliteTrustedDeviceRepository::new(pool.clone()));
        let security_alert = Arc::new(SqliteSecurityAlertRepository::new(pool.clone()));
        let account = Arc::new(SqliteAccountRepository::new(pool.clone()));
        let unit_of_work = Arc::new(SqliteUnitOfWorkRepository::new(pool.clone()));

        Self {
            pool,
            login_history,
            trusted_device,
            security_alert,
            account,
            unit_of_work,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl LoginHistoryRepositoryProvider for SqliteRepositoryProvider {
    type LoginHistoryRepo = SqliteLoginHistoryRepository;

    fn login_history(&self) -> &Self::LoginHistoryRepo {
        &self.login_history
    }
}

impl TrustedDeviceRepositoryProvider for SqliteRepositoryProvider {
    type TrustedDeviceRepo = SqliteTrustedDeviceRepository;

    fn trusted_device(&self) -> &Self::TrustedDeviceRepo {
        &self.trusted_device
    }
}

impl SecurityAlertRepositoryProvider for SqliteRepositoryProvider {
    type SecurityAlertRepo = SqliteSecurityAlertRepository;

    fn security_alert(&self) -> &Self::SecurityAlertRepo {
        &self.security_alert
    }
}

impl AccountRepositoryProvider for SqliteRepositoryProvider {
    type AccountRepo = SqliteAccountRepository;

    fn account(&self) -> &Self::AccountRepo {
        &self.account
    }
}

impl UnitOfWorkRepositoryProvider for SqliteRepositoryProvider {
    type UnitOfWorkRepo = SqliteUnitOfWorkRepository;

    fn unit_of_work(&self) -> &Self::UnitOfWorkRepo {
        &self.unit_of_work
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&all_migrations()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}
