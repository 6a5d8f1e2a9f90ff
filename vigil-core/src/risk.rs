//! Risk scoring
//!
//! A login's risk is the sum of the weights of the signals it trips, clamped to
//! `0..=100`, then bucketed into a [`RiskLevel`]. Each signal only ever adds, so
//! turning a signal on can never lower a score.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{config::RiskWeights, device::DeviceInfo, error::ValidationError};

/// Highest score a login can receive
pub const MAX_RISK_SCORE: u8 = 100;

/// Bucketed view of a risk score. Also used as alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// `<30` Low, `<50` Medium, `<70` High, otherwise Critical
    pub fn from_score(score: u8) -> Self {
        match score {
            0..30 => Self::Low,
            30..50 => Self::Medium,
            50..70 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            "Critical" => Ok(Self::Critical),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown risk level: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The heuristic signals observed for one login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSignals {
    pub new_device: bool,
    /// Only ever true when a non-empty location was resolved
    pub new_location: bool,
    pub new_ip: bool,
    pub off_hours: bool,
    pub rapid_login: bool,
    /// Failed logins for the user in the trailing failure window
    pub recent_failures: u32,
}

impl RiskSignals {
    /// Sum the weights of the tripped signals and clamp to [`MAX_RISK_SCORE`]
    pub fn score(&self, weights: &RiskWeights) -> u8 {
        let mut total: u64 = 0;

        if self.new_device {
            total += u64::from(weights.new_device);
        }
        if self.new_location {
            total += u64::from(weights.new_location);
        }
        if self.new_ip {
            total += u64::from(weights.new_ip);
        }
        if self.off_hours {
            total += u64::from(weights.off_hours);
        }
        if self.rapid_login {
            total += u64::from(weights.rapid_login);
        }

        let failures = u64::from(self.recent_failures) * u64::from(weights.per_recent_failure);
        total += failures.min(u64::from(weights.recent_failures_cap));

        total.min(u64::from(MAX_RISK_SCORE)) as u8
    }

    /// Names of the tripped signals, for alert payloads and logs
    pub fn reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if self.new_device {
            reasons.push("new_device");
        }
        if self.new_location {
            reasons.push("new_location");
        }
        if self.new_ip {
            reasons.push("new_ip");
        }
        if self.off_hours {
            reasons.push("off_hours");
        }
        if self.rapid_login {
            reasons.push("rapid_login");
        }
        if self.recent_failures > 0 {
            reasons.push("recent_failures");
        }
        reasons
    }
}

/// Outcome of evaluating a login without recording it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub device: DeviceInfo,
    pub device_signature: String,
    pub location: Option<String>,
    pub signals: RiskSignals,
    pub score: u8,
    pub level: RiskLevel,
    pub is_suspicious: bool,
}
