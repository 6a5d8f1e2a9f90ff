//! In-memory repositories for service tests

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error, UserId,
    alert::{AlertId, NewSecurityAlert, SecurityAlert},
    device::{NewTrustedDevice, TrustLevel, TrustedDevice},
    error::StorageError,
    login::{LoginAction, LoginAttempt, NewLoginAttempt},
    repositories::{
        AccountRepository, LoginHistoryRepository, SecurityAlertRepository,
        TrustedDeviceRepository, UnitOfWork, UnitOfWorkRepository,
    },
};

fn injected_failure(what: &str) -> Error {
    Error::Storage(StorageError::Database(format!("Injected failure: {what}")))
}

#[derive(Default)]
pub struct MockLoginHistoryRepository {
    pub attempts: Mutex<Vec<LoginAttempt>>,
    pub fail_appends: AtomicBool,
}

impl MockLoginHistoryRepository {
    pub fn all(&self) -> Vec<LoginAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginHistoryRepository for MockLoginHistoryRepository {
    async fn append(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(injected_failure("append login attempt"));
        }
        let mut attempts = self.attempts.lock().unwrap();
        let attempt = attempt.into_attempt(attempts.len() as i64 + 1);
        attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn count_since(
        &self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let attempts = self.attempts.lock().unwrap();
        Ok(attempts
            .iter()
            .filter(|a| &a.user_id == user_id && a.action == action && a.attempted_at >= since)
            .count() as u32)
    }

    async fn has_location(&self, user_id: &UserId, location: &str) -> Result<bool, Error> {
        let attempts = self.attempts.lock().unwrap();
        Ok(attempts
            .iter()
            .any(|a| &a.user_id == user_id && a.location.as_deref() == Some(location)))
    }

    async fn has_ip_address(&self, user_id: &UserId, ip_address: &str) -> Result<bool, Error> {
        let attempts = self.attempts.lock().unwrap();
        Ok(attempts
            .iter()
            .any(|a| &a.user_id == user_id && a.ip_address == ip_address))
    }

    async fn find_by_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<LoginAttempt>, Error> {
        let attempts = self.attempts.lock().unwrap();
        let mut matching: Vec<_> = attempts
            .iter()
            .filter(|a| &a.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at).then(b.id.cmp(&a.id)));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[derive(Default)]
pub struct MockTrustedDeviceRepository {
    pub devices: Mutex<Vec<TrustedDevice>>,
    pub fail_upserts: AtomicBool,
}

impl MockTrustedDeviceRepository {
    pub fn all(&self) -> Vec<TrustedDevice> {
        self.devices.lock().unwrap().clone()
    }

    fn update<F>(&self, user_id: &UserId, device_signature: &str, f: F) -> Result<TrustedDevice, Error>
    where
        F: FnOnce(&mut TrustedDevice),
    {
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .iter_mut()
            .find(|d| &d.user_id == user_id && d.device_signature == device_signature)
            .ok_or_else(|| {
                Error::Storage(StorageError::NotFound(format!(
                    "Trusted device {device_signature}"
                )))
            })?;
        f(device);
        Ok(device.clone())
    }
}

fn register(devices: &mut Vec<TrustedDevice>, device: &NewTrustedDevice) -> TrustedDevice {
    let id = devices.len() as i64 + 1;
    let registered = TrustedDevice {
        id,
        user_id: device.user_id.clone(),
        device_signature: device.device_signature.clone(),
        device: device.device.clone(),
        first_seen_at: device.seen_at,
        last_seen_at: device.seen_at,
        login_count: 1,
        is_active: true,
        blocked_reason: None,
        trust_level: TrustLevel::from_login_count(1),
        risk_score: device.risk_score,
    };
    devices.push(registered.clone());
    registered
}

fn upsert(devices: &mut Vec<TrustedDevice>, device: &NewTrustedDevice) -> Option<TrustedDevice> {
    let existing = devices
        .iter_mut()
        .find(|d| d.user_id == device.user_id && d.device_signature == device.device_signature);

    match existing {
        Some(d) if d.is_blocked() => None,
        Some(d) => {
            d.login_count += 1;
            d.last_seen_at = device.seen_at;
            d.risk_score = device.risk_score;
            d.trust_level = TrustLevel::from_login_count(d.login_count);
            Some(d.clone())
        }
        None => Some(register(devices, device)),
    }
}

#[async_trait]
impl TrustedDeviceRepository for MockTrustedDeviceRepository {
    async fn find(
        &self,
        user_id: &UserId,
        device_signature: &str,
    ) -> Result<Option<TrustedDevice>, Error> {
        let devices = self.devices.lock().unwrap();
        Ok(devices
            .iter()
            .find(|d| &d.user_id == user_id && d.device_signature == device_signature)
            .cloned())
    }

    async fn create(&self, device: NewTrustedDevice) -> Result<TrustedDevice, Error> {
        let mut devices = self.devices.lock().unwrap();
        let exists = devices
            .iter()
            .any(|d| d.user_id == device.user_id && d.device_signature == device.device_signature);
        if exists {
            return Err(Error::Storage(StorageError::Constraint(
                "Trusted device already exists".to_string(),
            )));
        }

        Ok(register(&mut devices, &device))
    }

    async fn set_blocked(
        &self,
        user_id: &UserId,
        device_signature: &str,
        reason: Option<&str>,
    ) -> Result<TrustedDevice, Error> {
        self.update(user_id, device_signature, |d| {
            d.is_active = reason.is_none();
            d.blocked_reason = reason.map(str::to_string);
        })
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<TrustedDevice>, Error> {
        let devices = self.devices.lock().unwrap();
        let mut matching: Vec<_> = devices
            .iter()
            .filter(|d| &d.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct MockSecurityAlertRepository {
    pub alerts: Mutex<Vec<SecurityAlert>>,
    pub fail_creates: AtomicBool,
}

impl MockSecurityAlertRepository {
    pub fn all(&self) -> Vec<SecurityAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityAlertRepository for MockSecurityAlertRepository {
    async fn create(&self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(injected_failure("create alert"));
        }
        let alert = alert.into_alert();
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(alert)
    }

    async fn find_by_id(&self, id: &AlertId) -> Result<Option<SecurityAlert>, Error> {
        let alerts = self.alerts.lock().unwrap();
        Ok(alerts.iter().find(|a| &a.id == id).cloned())
    }

    async fn find_unresolved_by_user(&self, user_id: &UserId) -> Result<Vec<SecurityAlert>, Error> {
        let alerts = self.alerts.lock().unwrap();
        // Reverse insertion order breaks ties between alerts created in the same instant
        let mut matching: Vec<_> = alerts
            .iter()
            .rev()
            .filter(|a| &a.user_id == user_id && !a.is_resolved)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn resolve(
        &self,
        id: &AlertId,
        resolved_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<SecurityAlert, Error> {
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or_else(|| Error::Storage(StorageError::NotFound(format!("Alert {id}"))))?;
        alert.is_resolved = true;
        alert.resolved_at = Some(resolved_at);
        alert.resolution_notes = notes.map(str::to_string);
        Ok(alert.clone())
    }
}

#[derive(Default)]
pub struct MockAccountRepository {
    pub locked_until: Mutex<HashMap<UserId, Option<DateTime<Utc>>>>,
}

impl MockAccountRepository {
    pub fn with_accounts<'a>(user_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let repo = Self::default();
        {
            let mut accounts = repo.locked_until.lock().unwrap();
            for id in user_ids {
                accounts.insert(UserId::new(id), None);
            }
        }
        repo
    }
}

#[async_trait]
impl AccountRepository for MockAccountRepository {
    async fn ensure_account(&self, user_id: &UserId) -> Result<(), Error> {
        self.locked_until
            .lock()
            .unwrap()
            .entry(user_id.clone())
            .or_insert(None);
        Ok(())
    }

    async fn get_locked_until(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self
            .locked_until
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .flatten())
    }

    async fn set_locked_until(
        &self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let mut accounts = self.locked_until.lock().unwrap();
        match accounts.get_mut(user_id) {
            Some(slot) => {
                *slot = locked_until;
                Ok(())
            }
            None => Err(Error::Storage(StorageError::NotFound(format!(
                "User {user_id}"
            )))),
        }
    }
}

/// Buffers writes and applies them to the mock repositories on commit
pub struct MockUnitOfWorkRepository {
    history: Arc<MockLoginHistoryRepository>,
    devices: Arc<MockTrustedDeviceRepository>,
    alerts: Arc<MockSecurityAlertRepository>,
    accounts: Arc<MockAccountRepository>,
    pub fail_commits: AtomicBool,
}

impl MockUnitOfWorkRepository {
    pub fn new(
        history: Arc<MockLoginHistoryRepository>,
        devices: Arc<MockTrustedDeviceRepository>,
        alerts: Arc<MockSecurityAlertRepository>,
        accounts: Arc<MockAccountRepository>,
    ) -> Self {
        Self {
            history,
            devices,
            alerts,
            accounts,
            fail_commits: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl UnitOfWorkRepository for MockUnitOfWorkRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, Error> {
        Ok(Box::new(MockUnitOfWork {
            history: self.history.clone(),
            devices: self.devices.clone(),
            alerts: self.alerts.clone(),
            accounts: self.accounts.clone(),
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
            attempts: Vec::new(),
            new_alerts: Vec::new(),
            device_upserts: Vec::new(),
            locks: Vec::new(),
        }))
    }
}

struct MockUnitOfWork {
    history: Arc<MockLoginHistoryRepository>,
    devices: Arc<MockTrustedDeviceRepository>,
    alerts: Arc<MockSecurityAlertRepository>,
    accounts: Arc<MockAccountRepository>,
    fail_commit: bool,
    attempts: Vec<LoginAttempt>,
    new_alerts: Vec<SecurityAlert>,
    device_upserts: Vec<NewTrustedDevice>,
    locks: Vec<(UserId, Option<DateTime<Utc>>)>,
}

#[async_trait]
impl UnitOfWork for MockUnitOfWork {
    async fn append_attempt(&mut self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        if self.history.fail_appends.load(Ordering::SeqCst) {
            return Err(injected_failure("append login attempt"));
        }
        let id = (self.history.attempts.lock().unwrap().len() + self.attempts.len()) as i64 + 1;
        let attempt = attempt.into_attempt(id);
        self.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn count_since(
        &mut self,
        user_id: &UserId,
        action: LoginAction,
        since: DateTime<Utc>,
    ) -> Result<u32, Error> {
        let committed = self.history.count_since(user_id, action, since).await?;
        let pending = self
            .attempts
            .iter()
            .filter(|a| &a.user_id == user_id && a.action == action && a.attempted_at >= since)
            .count() as u32;
        Ok(committed + pending)
    }

    async fn create_alert(&mut self, alert: NewSecurityAlert) -> Result<SecurityAlert, Error> {
        if self.alerts.fail_creates.load(Ordering::SeqCst) {
            return Err(injected_failure("create alert"));
        }
        let alert = alert.into_alert();
        self.new_alerts.push(alert.clone());
        Ok(alert)
    }

    async fn upsert_trusted_device(
        &mut self,
        device: NewTrustedDevice,
    ) -> Result<Option<TrustedDevice>, Error> {
        if self.devices.fail_upserts.load(Ordering::SeqCst) {
            return Err(injected_failure("upsert trusted device"));
        }
        let mut preview = self.devices.all();
        for pending in &self.device_upserts {
            upsert(&mut preview, pending);
        }
        let result = upsert(&mut preview, &device);
        self.device_upserts.push(device);
        Ok(result)
    }

    async fn get_locked_until(&mut self, user_id: &UserId) -> Result<Option<DateTime<Utc>>, Error> {
        match self.locks.iter().rev().find(|(id, _)| id == user_id) {
            Some((_, locked_until)) => Ok(*locked_until),
            None => self.accounts.get_locked_until(user_id).await,
        }
    }

    async fn set_locked_until(
        &mut self,
        user_id: &UserId,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        if !self.accounts.locked_until.lock().unwrap().contains_key(user_id) {
            return Err(Error::Storage(StorageError::NotFound(format!(
                "User {user_id}"
            ))));
        }
        self.locks.push((user_id.clone(), locked_until));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let MockUnitOfWork {
            history,
            devices,
            alerts,
            accounts,
            fail_commit,
            attempts,
            new_alerts,
            device_upserts,
            locks,
        } = *self;

        if fail_commit {
            return Err(injected_failure("commit"));
        }

        history.attempts.lock().unwrap().extend(attempts);
        alerts.alerts.lock().unwrap().extend(new_alerts);
        {
            let mut devices = devices.devices.lock().unwrap();
            for device in &device_upserts {
                upsert(&mut devices, device);
            }
        }
        let mut accounts = accounts.locked_until.lock().unwrap();
        for (user_id, locked_until) in locks {
            accounts.insert(user_id, locked_until);
        }
        Ok(())
    }
}
