//! Tunables for the login risk evaluator
//!
//! The defaults encode the production rule set. The two failure windows are separate
//! on purpose: failures in the trailing hour add to the risk score, while failures in
//! the trailing fifteen minutes drive the lockout.
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Additive weight of each risk signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub new_device: u32,
    pub new_location: u32,
    pub new_ip: u32,
    pub off_hours: u32,
    pub rapid_login: u32,
    /// Added once per failed login inside [`LoginRiskConfig::failure_window`]
    pub per_recent_failure: u32,
    /// Upper bound of the recent-failure contribution
    pub recent_failures_cap: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            new_device: 30,
            new_location: 25,
            new_ip: 20,
            off_hours: 15,
            rapid_login: 10,
            per_recent_failure: 5,
            recent_failures_cap: 20,
        }
    }
}

/// Configuration for [`LoginRiskService`](crate::services::LoginRiskService)
#[derive(Debug, Clone)]
pub struct LoginRiskConfig {
    pub weights: RiskWeights,

    /// Scores at or above this are suspicious and raise an alert
    pub suspicious_threshold: u8,

    /// Hours (UTC) strictly before this are off hours
    pub off_hours_start_before: u32,
    /// Hours (UTC) strictly after this are off hours
    pub off_hours_end_after: u32,

    /// Trailing window for counting successful logins
    pub rapid_login_window: Duration,
    /// More successful logins than this inside the window is "rapid"
    pub rapid_login_threshold: u32,

    /// Trailing window for the recent-failure risk signal
    pub failure_window: Duration,

    /// Trailing window for the lockout trigger
    pub lockout_window: Duration,
    /// Failed logins inside `lockout_window` that trigger a lockout
    pub lockout_threshold: u32,
    /// Length of an automatic lockout, in minutes
    pub lockout_minutes: i64,

    /// Lifetime of the session attached to a successful login
    pub session_lifetime: Duration,
}

impl Default for LoginRiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            suspicious_threshold: 70,
            off_hours_start_before: 6,
            off_hours_end_after: 22,
            rapid_login_window: Duration::minutes(5),
            rapid_login_threshold: 3,
            failure_window: Duration::hours(1),
            lockout_window: Duration::minutes(15),
            lockout_threshold: 5,
            lockout_minutes: 30,
            session_lifetime: Duration::hours(8),
        }
    }
}

impl LoginRiskConfig {
    /// Whether `hour` (0-23, UTC) falls outside working hours.
    ///
    /// Only whole hours are compared, so with the defaults hours 0-5 and 23 are off
    /// hours. The comparison is `hour > 22`, not `hour >= 22`: a login at 22:30 is
    /// on hours.
    pub fn is_off_hours(&self, hour: u32) -> bool {
        hour < self.off_hours_start_before || hour > self.off_hours_end_after
    }

    pub fn with_lockout(mut self, threshold: u32, window: Duration, minutes: i64) -> Self {
        self.lockout_threshold = threshold;
        self.lockout_window = window;
        self.lockout_minutes = minutes;
        self
    }

    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    pub fn with_weights(mut self, weights: RiskWeights) -> Self {
        self.weights = weights;
        self
    }
}
