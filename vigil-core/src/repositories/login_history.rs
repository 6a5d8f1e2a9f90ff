//! Repository trait for the login history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    login::{LoginAction, LoginAttempt, NewLoginAttempt},
};

/// Append-only log of evaluated logins, failed logins and logouts.
///
/// Rows are never updated or deleted through this trait, so concurrent appends for
/// the same user never conflict.
#[async_trait]
pub trait LoginHistoryRepository: Send + Sync + 'static {
    /// Append a row and return it with its assigned id
    async fn append(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error>;

    /// Count rows for `user_id` with the given action and `attempted_at >= since`
    async fn count_since(
        &self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error>;

    /// Whether any prior row for `user_id` carries exactly this location
    async fn has_location(&self, user_id: &UserId, location: &str) -> Result<bool, Error>;

    /// Whether any prior row for `user_id` came from exactly this address
    async fn has_ip_address(&self, user_id: &UserId, ip_address: &str) -> Result<bool, Error>;

    /// Most recent rows for `user_id`, newest first
    async fn find_by_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<LoginAttempt>, Error>;
}
