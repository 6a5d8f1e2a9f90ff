//! Input validation shared by the services
//!
//! Every check here runs before any collaborator is touched, so a rejected request
//! never leaves partial state behind.
use chrono::Duration;

use crate::{UserId, error::ValidationError};

/// Longest user id accepted
pub const MAX_USER_ID_LENGTH: usize = 255;

/// Longest client signature kept in history rows. Classification and the device
/// signature always use the full value.
pub const MAX_STORED_USER_AGENT_LENGTH: usize = 4096;

/// Longest lockout an automated or manual lock may request (one week)
pub const MAX_LOCKOUT_MINUTES: i64 = 7 * 24 * 60;

/// Largest page a history or alert listing may request
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Validates a user id
///
/// # Examples
///
/// ```rust
/// use vigil_core::{UserId, validation::validate_user_id};
///
/// assert!(validate_user_id(&UserId::new("usr_123")).is_ok());
/// assert!(validate_user_id(&UserId::new("")).is_err());
/// ```
pub fn validate_user_id(user_id: &UserId) -> Result<(), ValidationError> {
    let id = user_id.as_str();

    if id.trim().is_empty() {
        return Err(ValidationError::MissingField(
            "User ID is required".to_string(),
        ));
    }

    if id.len() > MAX_USER_ID_LENGTH {
        return Err(ValidationError::InvalidUserId(format!(
            "User ID must be at most {MAX_USER_ID_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Cut a client signature down to [`MAX_STORED_USER_AGENT_LENGTH`] bytes for storage
///
/// Client strings are opaque and never rejected; an oversized one is still recorded.
pub fn truncate_user_agent(user_agent: &str) -> &str {
    if user_agent.len() <= MAX_STORED_USER_AGENT_LENGTH {
        return user_agent;
    }

    let mut end = MAX_STORED_USER_AGENT_LENGTH;
    while !user_agent.is_char_boundary(end) {
        end -= 1;
    }
    &user_agent[..end]
}

/// Validates a lockout length in minutes and converts it to a [`Duration`]
pub fn validate_lockout_minutes(minutes: i64) -> Result<Duration, ValidationError> {
    if minutes <= 0 {
        return Err(ValidationError::InvalidDuration(format!(
            "Lockout must be positive, got {minutes} minutes"
        )));
    }

    if minutes > MAX_LOCKOUT_MINUTES {
        return Err(ValidationError::InvalidDuration(format!(
            "Lockout must be at most {MAX_LOCKOUT_MINUTES} minutes, got {minutes}"
        )));
    }

    Ok(Duration::minutes(minutes))
}

/// Validates a listing page size
pub fn validate_page_size(limit: u32) -> Result<(), ValidationError> {
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidField(format!(
            "Limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    Ok(())
}
