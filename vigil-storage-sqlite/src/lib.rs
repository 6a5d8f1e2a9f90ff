//! SQLite storage backend for vigil
//!
//! Implements every repository trait from `vigil-core` on top of a single
//! [`SqlitePool`]. Timestamps are stored as unix seconds.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_storage_sqlite::SqliteStorage;
//! use vigil_core::RepositoryProvider;
//!
//! let storage = SqliteStorage::connect("sqlite::memory:").await?;
//! let provider = storage.into_repository_provider();
//! provider.migrate().await?;
//! ```
pub mod migrations;
pub mod repositories;

pub use migrations::{SqliteMigrationManager, all_migrations};
pub use repositories::{
    SqliteAccountRepository, SqliteLoginHistoryRepository, SqliteRepositoryProvider,
    SqliteSecurityAlertRepository, SqliteTrustedDeviceRepository, SqliteUnitOfWorkRepository,
};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use vigil_core::{Error, error::StorageError};

/// A connected SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`, e.g. `sqlite::memory:` or `sqlite://vigil.db?mode=rwc`
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = SqlitePool::connect(url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            Error::Storage(StorageError::Connection(format!(
                "Failed to connect to SQLite: {e}"
            )))
        })?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_repository_provider(self) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool)
    }
}

/// Convert a stored unix timestamp, rejecting values chrono cannot represent
pub(crate) fn from_timestamp(seconds: i64, column: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        tracing::error!(column, seconds, "Stored timestamp out of range");
        Error::Storage(StorageError::Database(format!(
            "Invalid timestamp in {column}"
        )))
    })
}

pub(crate) fn from_optional_timestamp(
    seconds: Option<i64>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, Error> {
    seconds.map(|s| from_timestamp(s, column)).transpose()
}

/// Map a stored enum string back to its domain type
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| {
        tracing::error!(column, value, error = %e, "Unreadable stored value");
        Error::Storage(StorageError::Database(format!(
            "Invalid value in {column}"
        )))
    })
}

/// Narrow a stored 0..=100 score, guarding against rows written outside this crate
pub(crate) fn score_from_column(value: i64, column: &str) -> Result<u8, Error> {
    u8::try_from(value)
        .ok()
        .filter(|score| *score <= vigil_core::risk::MAX_RISK_SCORE)
        .ok_or_else(|| {
            tracing::error!(column, value, "Stored score out of range");
            Error::Storage(StorageError::Database(format!(
                "Invalid score in {column}"
            )))
        })
}
