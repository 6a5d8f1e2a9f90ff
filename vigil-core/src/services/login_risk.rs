//! Login risk evaluation
//!
//! [`LoginRiskService`] scores every login against the user's history, records it,
//! raises alerts for suspicious logins and repeated failures, and maintains the
//! trusted-device registry and the account lockout.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil_core::services::LoginRiskService;
//!
//! let service = LoginRiskService::new(
//!     history, devices, accounts, unit_of_work,
//!     Arc::new(HashedLocationResolver::default()),
//!     LoginRiskConfig::default(),
//! );
//!
//! if service.is_locked(&user_id).await? {
//!     // refuse authentication
//! }
//!
//! let attempt = service
//!     .record_login(&user_id, "203.0.113.7", user_agent, true, None)
//!     .await?;
//! ```
//!
//! # Atomicity
//!
//! A recorded login writes the history row, the suspicious-login alert (if any) and
//! the trusted-device upsert (on success) inside one [`UnitOfWork`]. A failed login
//! that reaches the lockout threshold adds the failure alert, the lockout and the
//! lock alert to the same unit. Either every write is committed or none is, and the
//! error reaches the caller.
//!
//! Events are emitted after commit. A failing handler is logged and does not turn a
//! committed operation into an error.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::json;

use crate::{
    Error, UserId,
    alert::{AlertType, NewSecurityAlert, SecurityAlert},
    config::LoginRiskConfig,
    device::{DeviceInfo, NewTrustedDevice, TrustedDevice},
    error::ValidationError,
    events::{Event, EventBus},
    location::LocationResolver,
    login::{LockoutStatus, LoginAction, LoginAttempt, NewLoginAttempt, SessionId},
    repositories::{
        AccountRepository, LoginHistoryRepository, TrustedDeviceRepository, UnitOfWork,
        UnitOfWorkRepository,
    },
    risk::{RiskAssessment, RiskLevel, RiskSignals},
    validation::{
        truncate_user_agent, validate_lockout_minutes, validate_page_size, validate_user_id,
    },
};

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What happened when a failed login was recorded
#[derive(Debug, Clone)]
pub struct FailedLoginOutcome {
    pub attempt: LoginAttempt,
    /// Failed logins inside the lockout window, this one included
    pub recent_failures: u32,
    /// Whether this failure is the one that locked the account
    pub locked: bool,
    pub lockout: LockoutStatus,
}

/// Writes of one recorded attempt, waiting for commit
struct Recorded {
    attempt: LoginAttempt,
    alert: Option<SecurityAlert>,
}

/// Writes of one lock, waiting for commit
struct Lock {
    reason: String,
    locked_until: DateTime<Utc>,
    alert: SecurityAlert,
}

/// Service that evaluates, records and reacts to logins.
///
/// # Thread Safety
///
/// The service holds no locks of its own and can be shared across tasks. Races
/// between concurrent logins for the same user are settled by the storage layer:
/// the trusted-device key is unique, history is append-only and duplicate alerts
/// are tolerated.
pub struct LoginRiskService<H, D, U, W>
where
    H: LoginHistoryRepository,
    D: TrustedDeviceRepository,
    U: AccountRepository,
    W: UnitOfWorkRepository,
{
    history: Arc<H>,
    devices: Arc<D>,
    accounts: Arc<U>,
    unit_of_work: Arc<W>,
    resolver: Arc<dyn LocationResolver>,
    config: LoginRiskConfig,
    event_bus: Option<EventBus>,
    clock: Clock,
}

impl<H, D, U, W> LoginRiskService<H, D, U, W>
where
    H: LoginHistoryRepository,
    D: TrustedDeviceRepository,
    U: AccountRepository,
    W: UnitOfWorkRepository,
{
    pub fn new(
        history: Arc<H>,
        devices: Arc<D>,
        accounts: Arc<U>,
        unit_of_work: Arc<W>,
        resolver: Arc<dyn LocationResolver>,
        config: LoginRiskConfig,
    ) -> Self {
        Self {
            history,
            devices,
            accounts,
            unit_of_work,
            resolver,
            config,
            event_bus: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Emit [`Event`]s on `event_bus` after each committed operation
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Replace the wall clock, e.g. to pin the hour of day in tests
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &LoginRiskConfig {
        &self.config
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Evaluate a login without recording anything
    pub async fn assess(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<RiskAssessment, Error> {
        validate_user_id(user_id)?;

        let (assessment, _) = self
            .evaluate(user_id, ip_address, user_agent, self.now())
            .await?;
        Ok(assessment)
    }

    /// Evaluate and record a login attempt.
    ///
    /// A successful login opens a session and upserts the trusted device; a
    /// suspicious one raises a [`AlertType::SuspiciousLogin`] alert. Not idempotent:
    /// every call appends a row.
    pub async fn record_login(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        succeeded: bool,
        failure_reason: Option<&str>,
    ) -> Result<LoginAttempt, Error> {
        validate_user_id(user_id)?;

        let now = self.now();
        let mut work = self.unit_of_work.begin().await?;
        let recorded = self
            .record(
                work.as_mut(),
                user_id,
                ip_address,
                user_agent,
                succeeded,
                failure_reason,
                now,
            )
            .await?;
        work.commit().await?;

        self.announce_recorded(&recorded).await;
        Ok(recorded.attempt)
    }

    /// Record a failed login and lock the account once the failures inside the
    /// lockout window reach the threshold.
    ///
    /// A failure while the account is already locked is recorded but does not lock
    /// again or raise another alert.
    pub async fn record_failed_login(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        reason: &str,
    ) -> Result<FailedLoginOutcome, Error> {
        validate_user_id(user_id)?;
        let lockout = validate_lockout_minutes(self.config.lockout_minutes)?;

        let now = self.now();
        let mut work = self.unit_of_work.begin().await?;
        let recorded = self
            .record(
                work.as_mut(),
                user_id,
                ip_address,
                user_agent,
                false,
                Some(reason),
                now,
            )
            .await?;

        let recent_failures = work
            .count_since(
                user_id,
                LoginAction::FailedLogin,
                now - self.config.lockout_window,
            )
            .await?;
        let locked_until = work.get_locked_until(user_id).await?;
        let already_locked = locked_until.is_some_and(|until| until > now);

        if recent_failures < self.config.lockout_threshold || already_locked {
            work.commit().await?;
            self.announce_recorded(&recorded).await;

            return Ok(FailedLoginOutcome {
                attempt: recorded.attempt,
                recent_failures,
                locked: false,
                lockout: LockoutStatus::at(user_id.clone(), locked_until, now),
            });
        }

        let window_minutes = self.config.lockout_window.num_minutes();
        let alert = NewSecurityAlert::new(
            user_id.clone(),
            AlertType::MultipleFailedAttempts,
            RiskLevel::High,
            "Multiple failed login attempts",
            format!("{recent_failures} failed login attempts within {window_minutes} minutes"),
            now,
        )
        .with_data(json!({
            "failed_attempts": recent_failures,
            "window_minutes": window_minutes,
            "ip_address": ip_address,
        }));
        work.create_alert(alert).await?;

        let lock = self
            .lock_in(
                work.as_mut(),
                user_id,
                &format!("{recent_failures} failed login attempts"),
                lockout,
                now,
            )
            .await?;
        work.commit().await?;

        tracing::warn!(
            user_id = %user_id,
            failed_attempts = recent_failures,
            "Too many failed login attempts, account locked"
        );
        self.announce_recorded(&recorded).await;
        let lockout = self.announce_lock(user_id, lock, now).await;

        Ok(FailedLoginOutcome {
            attempt: recorded.attempt,
            recent_failures,
            locked: true,
            lockout,
        })
    }

    /// Record a logout. No risk evaluation, alerting or trust update takes place.
    pub async fn record_logout(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        session_id: Option<&SessionId>,
    ) -> Result<LoginAttempt, Error> {
        validate_user_id(user_id)?;

        let now = self.now();
        let device = DeviceInfo::classify(user_agent);
        let device_signature = device.signature(user_agent);
        let location = self.resolve_location(ip_address).await?;

        let attempt = self
            .history
            .append(NewLoginAttempt {
                user_id: user_id.clone(),
                action: LoginAction::Logout,
                attempted_at: now,
                ip_address: ip_address.to_string(),
                user_agent: truncate_user_agent(user_agent).to_string(),
                device,
                device_signature,
                location,
                success: true,
                failure_reason: None,
                is_suspicious: false,
                risk_score: 0,
                risk_level: RiskLevel::Low,
                session_id: session_id.cloned(),
                session_expires_at: None,
            })
            .await?;

        tracing::info!(user_id = %user_id, attempt_id = attempt.id, "Recorded logout");

        self.emit(Event::LoginRecorded(attempt.clone())).await;
        Ok(attempt)
    }

    /// Whether the failures inside the lockout window have reached the threshold.
    /// Reads only.
    pub async fn should_lock_account(&self, user_id: &UserId) -> Result<bool, Error> {
        validate_user_id(user_id)?;

        let failures = self
            .history
            .count_since(
                user_id,
                LoginAction::FailedLogin,
                self.now() - self.config.lockout_window,
            )
            .await?;
        Ok(failures >= self.config.lockout_threshold)
    }

    /// Lock an account and raise an [`AlertType::AccountLocked`] alert.
    ///
    /// `lockout_minutes` defaults to the configured lockout length.
    pub async fn lock_account(
        &self,
        user_id: &UserId,
        reason: &str,
        lockout_minutes: Option<i64>,
    ) -> Result<LockoutStatus, Error> {
        validate_user_id(user_id)?;
        if reason.trim().is_empty() {
            return Err(ValidationError::MissingField("Lock reason is required".to_string()).into());
        }
        let lockout =
            validate_lockout_minutes(lockout_minutes.unwrap_or(self.config.lockout_minutes))?;

        let now = self.now();
        let mut work = self.unit_of_work.begin().await?;
        let lock = self
            .lock_in(work.as_mut(), user_id, reason, lockout, now)
            .await?;
        work.commit().await?;

        Ok(self.announce_lock(user_id, lock, now).await)
    }

    /// Clear the lockout. Nothing re-evaluates the failure history afterwards.
    pub async fn unlock_account(&self, user_id: &UserId) -> Result<(), Error> {
        validate_user_id(user_id)?;

        self.accounts.set_locked_until(user_id, None).await?;
        tracing::info!(user_id = %user_id, "Account unlocked");

        self.emit(Event::AccountUnlocked {
            user_id: user_id.clone(),
            timestamp: self.now(),
        })
        .await;
        Ok(())
    }

    pub async fn lockout_status(&self, user_id: &UserId) -> Result<LockoutStatus, Error> {
        validate_user_id(user_id)?;

        let locked_until = self.accounts.get_locked_until(user_id).await?;
        Ok(LockoutStatus::at(user_id.clone(), locked_until, self.now()))
    }

    pub async fn is_locked(&self, user_id: &UserId) -> Result<bool, Error> {
        Ok(self.lockout_status(user_id).await?.is_locked)
    }

    /// The user's most recent history rows, newest first
    pub async fn login_history(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<LoginAttempt>, Error> {
        validate_user_id(user_id)?;
        validate_page_size(limit)?;

        self.history.find_by_user(user_id, limit).await
    }

    async fn resolve_location(&self, ip_address: &str) -> Result<Option<String>, Error> {
        Ok(self
            .resolver
            .resolve(ip_address)
            .await?
            .filter(|location| !location.is_empty()))
    }

    /// Compute the risk of a login at `now`, returning the registered device if any
    async fn evaluate(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<(RiskAssessment, Option<TrustedDevice>), Error> {
        let device = DeviceInfo::classify(user_agent);
        let device_signature = device.signature(user_agent);
        let location = self.resolve_location(ip_address).await?;

        let known_device = self.devices.find(user_id, &device_signature).await?;

        let new_location = match &location {
            Some(location) => !self.history.has_location(user_id, location).await?,
            None => false,
        };

        let signals = RiskSignals {
            // A blocked device stays untrusted
            new_device: known_device.as_ref().is_none_or(TrustedDevice::is_blocked),
            new_location,
            new_ip: !self.history.has_ip_address(user_id, ip_address).await?,
            off_hours: self.config.is_off_hours(now.hour()),
            rapid_login: self
                .count_recent(user_id, LoginAction::Login, now, self.config.rapid_login_window)
                .await?
                > self.config.rapid_login_threshold,
            recent_failures: self
                .count_recent(user_id, LoginAction::FailedLogin, now, self.config.failure_window)
                .await?,
        };

        let score = signals.score(&self.config.weights);
        let level = RiskLevel::from_score(score);
        let is_suspicious = score >= self.config.suspicious_threshold;

        tracing::debug!(
            user_id = %user_id,
            risk_score = score,
            risk_level = %level,
            reasons = ?signals.reasons(),
            "Evaluated login risk"
        );

        Ok((
            RiskAssessment {
                device,
                device_signature,
                location,
                signals,
                score,
                level,
                is_suspicious,
            },
            known_device,
        ))
    }

    async fn count_recent(
        &self,
        user_id: &UserId,
        action: LoginAction,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<u32, Error> {
        self.history.count_since(user_id, action, now - window).await
    }

    /// Evaluate an attempt and stage its writes in `work`
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        work: &mut dyn UnitOfWork,
        user_id: &UserId,
        ip_address: &str,
        user_agent: &str,
        succeeded: bool,
        failure_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Recorded, Error> {
        let (assessment, known_device) = self
            .evaluate(user_id, ip_address, user_agent, now)
            .await?;

        let (action, session_id, session_expires_at) = if succeeded {
            (
                LoginAction::Login,
                Some(SessionId::new_random()),
                Some(now + self.config.session_lifetime),
            )
        } else {
            (LoginAction::FailedLogin, None, None)
        };

        let attempt = work
            .append_attempt(NewLoginAttempt {
                user_id: user_id.clone(),
                action,
                attempted_at: now,
                ip_address: ip_address.to_string(),
                user_agent: truncate_user_agent(user_agent).to_string(),
                device: assessment.device.clone(),
                device_signature: assessment.device_signature.clone(),
                location: assessment.location.clone(),
                success: succeeded,
                failure_reason: if succeeded {
                    None
                } else {
                    failure_reason.map(str::to_string)
                },
                is_suspicious: assessment.is_suspicious,
                risk_score: assessment.score,
                risk_level: assessment.level,
                session_id,
                session_expires_at,
            })
            .await?;

        let alert = if assessment.is_suspicious {
            Some(work.create_alert(suspicious_login_alert(&attempt, &assessment)).await?)
        } else {
            None
        };

        if succeeded {
            self.trust_device(work, &attempt, known_device.as_ref())
                .await?;
        }

        Ok(Recorded { attempt, alert })
    }

    async fn trust_device(
        &self,
        work: &mut dyn UnitOfWork,
        attempt: &LoginAttempt,
        known_device: Option<&TrustedDevice>,
    ) -> Result<(), Error> {
        let user_id = &attempt.user_id;
        let signature = attempt.device_signature.as_str();

        if known_device.is_some_and(TrustedDevice::is_blocked) {
            tracing::warn!(
                user_id = %user_id,
                device_signature = signature,
                "Successful login from a blocked device, trust left unchanged"
            );
            return Ok(());
        }

        let device = NewTrustedDevice {
            user_id: user_id.clone(),
            device_signature: signature.to_string(),
            device: attempt.device.clone(),
            seen_at: attempt.attempted_at,
            risk_score: attempt.risk_score,
        };

        if work.upsert_trusted_device(device).await?.is_none() {
            tracing::warn!(
                user_id = %user_id,
                device_signature = signature,
                "Device was blocked concurrently, trust left unchanged"
            );
        }
        Ok(())
    }

    /// Stage a lockout and its alert in `work`
    async fn lock_in(
        &self,
        work: &mut dyn UnitOfWork,
        user_id: &UserId,
        reason: &str,
        lockout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Lock, Error> {
        let locked_until = now + lockout;

        work.set_locked_until(user_id, Some(locked_until)).await?;

        let alert = NewSecurityAlert::new(
            user_id.clone(),
            AlertType::AccountLocked,
            RiskLevel::High,
            "Account locked",
            format!(
                "Account locked until {}: {reason}",
                locked_until.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            now,
        )
        .with_data(json!({
            "reason": reason,
            "lockout_minutes": lockout.num_minutes(),
            "locked_until": locked_until.to_rfc3339(),
        }));
        let alert = work.create_alert(alert).await?;

        Ok(Lock {
            reason: reason.to_string(),
            locked_until,
            alert,
        })
    }

    async fn announce_recorded(&self, recorded: &Recorded) {
        let attempt = &recorded.attempt;
        tracing::info!(
            user_id = %attempt.user_id,
            attempt_id = attempt.id,
            action = %attempt.action,
            risk_score = attempt.risk_score,
            risk_level = %attempt.risk_level,
            "Recorded login attempt"
        );

        self.emit(Event::LoginRecorded(attempt.clone())).await;

        if let Some(alert) = &recorded.alert {
            tracing::warn!(
                user_id = %attempt.user_id,
                alert_id = %alert.id,
                risk_score = attempt.risk_score,
                "Suspicious login detected"
            );
            self.emit(Event::SuspiciousLogin {
                attempt: attempt.clone(),
                alert: alert.clone(),
            })
            .await;
        }
    }

    async fn announce_lock(&self, user_id: &UserId, lock: Lock, now: DateTime<Utc>) -> LockoutStatus {
        tracing::warn!(
            user_id = %user_id,
            locked_until = %lock.locked_until,
            reason = %lock.reason,
            "Account locked"
        );

        let status = LockoutStatus::at(user_id.clone(), Some(lock.locked_until), now);
        self.emit(Event::AccountLocked {
            user_id: user_id.clone(),
            reason: lock.reason,
            locked_until: lock.locked_until,
            alert: lock.alert,
        })
        .await;
        status
    }

    /// Deliver an event for an already committed operation
    async fn emit(&self, event: Event) {
        if let Some(event_bus) = &self.event_bus {
            if let Err(e) = event_bus.emit(&event).await {
                tracing::error!(
                    user_id = %event.user_id(),
                    error = %e,
                    "Event handler failed after commit"
                );
            }
        }
    }
}

fn suspicious_login_alert(attempt: &LoginAttempt, assessment: &RiskAssessment) -> NewSecurityAlert {
    let location = attempt.location.as_deref().unwrap_or("an unknown location");
    let description = format!(
        "Login from {} at {} ({}) with risk score {} ({})",
        attempt.device.display_name,
        location,
        attempt.ip_address,
        attempt.risk_score,
        attempt.risk_level,
    );

    NewSecurityAlert::new(
        attempt.user_id.clone(),
        AlertType::SuspiciousLogin,
        attempt.risk_level,
        "Suspicious login detected",
        description,
        attempt.attempted_at,
    )
    .with_data(json!({
        "login_attempt_id": attempt.id,
        "ip_address": attempt.ip_address,
        "location": attempt.location,
        "device": attempt.device.display_name,
        "device_signature": attempt.device_signature,
        "risk_score": attempt.risk_score,
        "reasons": assessment.signals.reasons(),
    }))
}
