//! Security alerts
//!
//! Alerts are raised by the evaluator and resolved by operators. There is no
//! uniqueness constraint: concurrent suspicious logins may raise duplicate alerts
//! and deduplication is left to whoever consumes them.
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    UserId,
    error::ValidationError,
    id::{generate_prefixed_id, validate_prefixed_id},
    risk::RiskLevel,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(String);

impl AlertId {
    pub fn new(id: &str) -> Self {
        AlertId(id.to_string())
    }

    pub fn new_random() -> Self {
        AlertId(generate_prefixed_id("alrt"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_generated(&self) -> bool {
        validate_prefixed_id(&self.0, "alrt")
    }
}

impl From<String> for AlertId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AlertId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of security alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertType {
    /// A login scored at or above the suspicious threshold
    SuspiciousLogin,
    /// Too many failed logins inside the lockout window
    MultipleFailedAttempts,
    /// The account was locked
    AccountLocked,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuspiciousLogin => "SuspiciousLogin",
            Self::MultipleFailedAttempts => "MultipleFailedAttempts",
            Self::AccountLocked => "AccountLocked",
        }
    }
}

impl FromStr for AlertType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SuspiciousLogin" => Ok(Self::SuspiciousLogin),
            "MultipleFailedAttempts" => Ok(Self::MultipleFailedAttempts),
            "AccountLocked" => Ok(Self::AccountLocked),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown alert type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: AlertId,
    pub user_id: UserId,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub severity: RiskLevel,
    pub created_at: DateTime<Utc>,
    pub is_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    /// Structured context, e.g. the tripped risk signals
    pub additional_data: Option<serde_json::Value>,
}

/// An alert to be raised
#[derive(Debug, Clone, PartialEq)]
pub struct NewSecurityAlert {
    pub id: AlertId,
    pub user_id: UserId,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    pub severity: RiskLevel,
    pub created_at: DateTime<Utc>,
    pub additional_data: Option<serde_json::Value>,
}

impl NewSecurityAlert {
    pub fn new(
        user_id: UserId,
        alert_type: AlertType,
        severity: RiskLevel,
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AlertId::new_random(),
            user_id,
            alert_type,
            title: title.into(),
            description: description.into(),
            severity,
            created_at,
            additional_data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = Some(data);
        self
    }

    /// The alert as stored before anyone resolves it
    pub fn into_alert(self) -> SecurityAlert {
        SecurityAlert {
            id: self.id,
            user_id: self.user_id,
            alert_type: self.alert_type,
            title: self.title,
            description: self.description,
            severity: self.severity,
            created_at: self.created_at,
            is_resolved: false,
            resolved_at: None,
            resolution_notes: None,
            additional_data: self.additional_data,
        }
    }
}
