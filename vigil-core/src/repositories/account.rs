//! Repository trait for the lockout state on user records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Error, UserId};

/// Reads and writes the `locked_until` timestamp on the user record.
///
/// User records themselves belong to the surrounding application; this trait only
/// makes sure one exists so a lockout has somewhere to live.
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Create the user record if it does not exist yet. Existing records are untouched.
    async fn ensure_account(&self, user_id: &UserId) -> Result<(), Error>;

    /// The stored lockout timestamp. `None` for unlocked and for unknown users.
    async fn get_locked_until(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error>;

    /// Set the lockout timestamp, or clear it with `None`
    ///
    /// # Errors
    ///
    /// `StorageError::NotFound` when the user record does not exist.
    async fn set_locked_until(
        &self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error>;
}
