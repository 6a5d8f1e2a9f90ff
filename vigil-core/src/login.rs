//! Login history records
//!
//! Every evaluated login, failed login and logout becomes one [`LoginAttempt`]. The
//! history is append-only: rows are created by
//! [`LoginRiskService`](crate::services::LoginRiskService) and never updated.
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    UserId,
    device::DeviceInfo,
    error::ValidationError,
    id::{generate_prefixed_id, validate_prefixed_id},
    risk::RiskLevel,
};

/// What a history row records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginAction {
    Login,
    FailedLogin,
    Logout,
}

impl LoginAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::FailedLogin => "FailedLogin",
            Self::Logout => "Logout",
        }
    }
}

impl FromStr for LoginAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Login" => Ok(Self::Login),
            "FailedLogin" => Ok(Self::FailedLogin),
            "Logout" => Ok(Self::Logout),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown login action: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for LoginAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of the session opened by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: &str) -> Self {
        SessionId(id.to_string())
    }

    pub fn new_random() -> Self {
        SessionId(generate_prefixed_id("lsn"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_generated(&self) -> bool {
        validate_prefixed_id(&self.0, "lsn")
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,
    pub user_id: UserId,
    pub action: LoginAction,
    pub attempted_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub device: DeviceInfo,
    pub device_signature: String,
    pub location: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub is_suspicious: bool,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub session_id: Option<SessionId>,
    pub session_expires_at: Option<DateTime<Utc>>,
}

impl LoginAttempt {
    /// Whether the session opened by this login is still valid at `now`
    pub fn session_active_at(&self, now: DateTime<Utc>) -> bool {
        self.session_expires_at.is_some_and(|expires| expires > now)
    }
}

/// A history row before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginAttempt {
    pub user_id: UserId,
    pub action: LoginAction,
    pub attempted_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub device: DeviceInfo,
    pub device_signature: String,
    pub location: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub is_suspicious: bool,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub session_id: Option<SessionId>,
    pub session_expires_at: Option<DateTime<Utc>>,
}

impl NewLoginAttempt {
    /// Attach the id assigned by the store
    pub fn into_attempt(self, id: i64) -> LoginAttempt {
        LoginAttempt {
            id,
            user_id: self.user_id,
            action: self.action,
            attempted_at: self.attempted_at,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            device: self.device,
            device_signature: self.device_signature,
            location: self.location,
            success: self.success,
            failure_reason: self.failure_reason,
            is_suspicious: self.is_suspicious,
            risk_score: self.risk_score,
            risk_level: self.risk_level,
            session_id: self.session_id,
            session_expires_at: self.session_expires_at,
        }
    }
}

/// Current lockout state of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub user_id: UserId,
    /// Whether authentication is currently refused
    pub is_locked: bool,
    /// The stored lockout timestamp, which may already have passed
    pub locked_until: Option<DateTime<Utc>>,
    /// When this status was computed
    pub checked_at: DateTime<Utc>,
}

impl LockoutStatus {
    pub fn at(user_id: UserId, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            is_locked: locked_until.is_some_and(|until| until > now),
            user_id,
            locked_until,
            checked_at: now,
        }
    }

    /// Seconds until the lock lifts, or `None` when not locked
    pub fn retry_after_seconds(&self) -> Option<i64> {
        if !self.is_locked {
            return None;
        }
        self.locked_until
            .map(|until| (until - self.checked_at).num_seconds().max(0))
    }
}
