//! Repository traits for data access layer
//!
//! Services never talk to a database directly. They are generic over the traits in
//! this module, and storage backends implement them.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits provide access to each repository type
//! - [`RepositoryProvider`] is a supertrait combining all provider traits plus lifecycle methods
//! - The `*RepositoryAdapter` types in [`adapter`] turn a shared provider back into
//!   individual repositories that services can own

pub mod account;
pub mod adapter;
pub mod alert;
pub mod login_history;
#[cfg(test)]
pub(crate) mod mock;
pub mod trusted_device;
pub mod unit_of_work;

pub use account::AccountRepository;
pub use adapter::{
    AccountRepositoryAdapter, LoginHistoryRepositoryAdapter, SecurityAlertRepositoryAdapter,
    TrustedDeviceRepositoryAdapter, UnitOfWorkRepositoryAdapter,
};
pub use alert::SecurityAlertRepository;
pub use login_history::LoginHistoryRepository;
pub use trusted_device::TrustedDeviceRepository;
pub use unit_of_work::{UnitOfWork, UnitOfWorkRepository};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for login history access.
pub trait LoginHistoryRepositoryProvider: Send + Sync + 'static {
    type LoginHistoryRepo: LoginHistoryRepository;

    fn login_history(&self) -> &Self::LoginHistoryRepo;
}

/// Provider trait for trusted-device registry access.
pub trait TrustedDeviceRepositoryProvider: Send + Sync + 'static {
    type TrustedDeviceRepo: TrustedDeviceRepository;

    fn trusted_device(&self) -> &Self::TrustedDeviceRepo;
}

/// Provider trait for alert sink access.
pub trait SecurityAlertRepositoryProvider: Send + Sync + 'static {
    type SecurityAlertRepo: SecurityAlertRepository;

    fn security_alert(&self) -> &Self::SecurityAlertRepo;
}

/// Provider trait for lockout state access.
pub trait AccountRepositoryProvider: Send + Sync + 'static {
    type AccountRepo: AccountRepository;

    fn account(&self) -> &Self::AccountRepo;
}

/// Provider trait for opening units of work.
pub trait UnitOfWorkRepositoryProvider: Send + Sync + 'static {
    type UnitOfWorkRepo: UnitOfWorkRepository;

    fn unit_of_work(&self) -> &Self::UnitOfWorkRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement each individual `*Repository` trait for your backend
/// 2. Implement each individual `*RepositoryProvider` trait
/// 3. Implement this trait with `migrate()` and `health_check()`
///
/// ```rust,ignore
/// use vigil_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl LoginHistoryRepositoryProvider for MyStorage {
///     type LoginHistoryRepo = MyLoginHistoryRepository;
///     fn login_history(&self) -> &Self::LoginHistoryRepo { &self.login_history }
/// }
///
/// // ... implement the other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    LoginHistoryRepositoryProvider
    + TrustedDeviceRepositoryProvider
    + SecurityAlertRepositoryProvider
    + AccountRepositoryProvider
    + UnitOfWorkRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
