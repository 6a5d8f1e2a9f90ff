//! Builder pattern for constructing Vigil instances
//!
//! This module provides a type-safe builder for creating [`Vigil`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil::VigilBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build with SQLite and auto-migration
//!     let vigil = VigilBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     // Or build without auto-migration and run manually
//!     let vigil = VigilBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .build()
//!         .await?;
//!     vigil.migrate().await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use vigil_core::{
    EventBus, HashedLocationResolver, LocationResolver, LoginRiskConfig, RepositoryProvider,
    services::Clock, validation::validate_lockout_minutes,
};

use crate::Vigil;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Vigil instance.
#[derive(Debug, thiserror::Error)]
pub enum VigilBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`VigilBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Vigil`] instances.
///
/// Storage must be configured before [`build`](VigilBuilder::build) becomes available.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
///
/// # Defaults
///
/// - Configuration: [`LoginRiskConfig::default`]
/// - Location resolver: [`HashedLocationResolver::default`]
/// - Event bus: none
/// - Apply migrations: false
pub struct VigilBuilder<Storage> {
    storage: Storage,
    config: LoginRiskConfig,
    resolver: Arc<dyn LocationResolver>,
    event_bus: Option<EventBus>,
    clock: Option<Clock>,
    apply_migrations: bool,
}

impl Default for VigilBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl VigilBuilder<NoStorage> {
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: LoginRiskConfig::default(),
            resolver: Arc::new(HashedLocationResolver::default()),
            event_bus: None,
            clock: None,
            apply_migrations: false,
        }
    }

    /// Use any repository provider, e.g. a custom backend or a shared instance
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> VigilBuilder<WithStorage<R>> {
        VigilBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            resolver: self.resolver,
            event_bus: self.event_bus,
            clock: self.clock,
            apply_migrations: self.apply_migrations,
        }
    }
}

// ============================================================================
// Storage Configuration Methods (NoStorage -> WithStorage)
// ============================================================================

#[cfg(feature = "sqlite")]
impl VigilBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<VigilBuilder<WithStorage<crate::SqliteRepositoryProvider>>, VigilBuilderError> {
        let storage = crate::SqliteStorage::connect(url)
            .await
            .map_err(|e| VigilBuilderError::StorageConnection(e.to_string()))?;

        let repositories = Arc::new(storage.into_repository_provider());

        Ok(self.with_repositories(repositories))
    }

    /// Configure SQLite storage with an existing connection pool.
    ///
    /// Use this when you already have a SQLite connection pool and want to
    /// share it with Vigil.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> VigilBuilder<WithStorage<crate::SqliteRepositoryProvider>> {
        let repositories = Arc::new(crate::SqliteRepositoryProvider::new(pool));
        self.with_repositories(repositories)
    }
}

// ============================================================================
// Configuration Methods (available after storage is configured)
// ============================================================================

impl<R: RepositoryProvider> VigilBuilder<WithStorage<R>> {
    /// Replace the scoring, lockout and session settings.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use vigil::{LoginRiskConfig, VigilBuilder};
    /// use chrono::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let vigil = VigilBuilder::new()
    ///     .with_sqlite("sqlite::memory:")
    ///     .await?
    ///     .with_config(LoginRiskConfig::default().with_lockout(3, Duration::minutes(10), 60))
    ///     .build()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_config(mut self, config: LoginRiskConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the source address to location lookup.
    ///
    /// Default: [`HashedLocationResolver`]
    pub fn with_location_resolver(mut self, resolver: Arc<dyn LocationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Emit events for every recorded attempt, suspicious login, lock and unlock.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Replace the wall clock used to timestamp and evaluate logins.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    /// Build the Vigil instance.
    ///
    /// The configuration is validated first; if `apply_migrations(true)` was called,
    /// migrations are applied before returning.
    pub async fn build(self) -> Result<Vigil<R>, VigilBuilderError> {
        validate_config(&self.config)?;

        if self.apply_migrations {
            tracing::debug!("Applying migrations during build");
            self.storage.repositories.migrate().await.map_err(|e| {
                tracing::error!(error = %e, "Migrations failed during build");
                VigilBuilderError::Migration(e.to_string())
            })?;
        }

        let repositories = self.storage.repositories;
        let mut login_risk =
            Vigil::login_risk_service(&repositories, self.resolver, self.config);
        if let Some(event_bus) = self.event_bus {
            login_risk = login_risk.with_event_bus(event_bus);
        }
        if let Some(clock) = self.clock {
            login_risk = login_risk.with_clock(move || clock());
        }

        Ok(Vigil::from_parts(repositories, login_risk))
    }
}

fn validate_config(config: &LoginRiskConfig) -> Result<(), VigilBuilderError> {
    validate_lockout_minutes(config.lockout_minutes).map_err(|e| {
        tracing::warn!(lockout_minutes = config.lockout_minutes, "Rejected configuration");
        VigilBuilderError::InvalidConfiguration(e.to_string())
    })?;

    if config.lockout_threshold == 0 {
        return Err(VigilBuilderError::InvalidConfiguration(
            "Lockout threshold must be at least 1".to_string(),
        ));
    }

    for (name, window) in [
        ("Lockout window", config.lockout_window),
        ("Failure window", config.failure_window),
        ("Rapid login window", config.rapid_login_window),
        ("Session lifetime", config.session_lifetime),
    ] {
        if window <= chrono::Duration::zero() {
            return Err(VigilBuilderError::InvalidConfiguration(format!(
                "{name} must be positive"
            )));
        }
    }

    Ok(())
}
