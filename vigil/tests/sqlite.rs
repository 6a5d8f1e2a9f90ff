//! End-to-end login flows against an in-memory SQLite database

#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use vigil::{
    AlertType, Event, EventBus, EventHandler, LoginAction, RiskLevel, SqliteRepositoryProvider,
    StaticLocationResolver, TrustLevel, UserId, Vigil, VigilBuilder, VigilError,
};
use vigil_core::{error::EventError, validation::MAX_STORED_USER_AGENT_LENGTH};

const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const FIREFOX_LINUX: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    fn at(now: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }

    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

async fn setup(now: DateTime<Utc>) -> (Vigil<SqliteRepositoryProvider>, TestClock) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let clock = TestClock::at(now);
    let shared = clock.0.clone();
    let resolver: StaticLocationResolver = [
        ("1.2.3.4", "Berlin, DE"),
        ("1.2.3.5", "Berlin, DE"),
        ("5.6.7.8", "Paris, FR"),
    ]
    .into_iter()
    .collect();

    let vigil = VigilBuilder::new()
        .with_sqlite("sqlite::memory:")
        .await
        .expect("Failed to connect to SQLite")
        .with_location_resolver(Arc::new(resolver))
        .with_clock(move || *shared.lock().unwrap())
        .apply_migrations(true)
        .build()
        .await
        .expect("Failed to build Vigil");

    (vigil, clock)
}

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap()
}

#[tokio::test]
async fn test_first_login_is_critical_then_repeat_is_low() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U1");
    vigil.ensure_account(&user_id).await.unwrap();

    let first = vigil
        .record_login(&user_id, "5.6.7.8", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    assert_eq!(first.risk_score, 75);
    assert_eq!(first.risk_level, RiskLevel::Critical);
    assert!(first.is_suspicious);
    assert_eq!(first.location.as_deref(), Some("Paris, FR"));
    assert_eq!(first.session_expires_at, Some(morning() + Duration::hours(8)));
    assert!(first.session_id.as_ref().is_some_and(|s| s.is_generated()));

    let alerts = vigil.unresolved_alerts(&user_id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::SuspiciousLogin);
    assert_eq!(alerts[0].severity, RiskLevel::Critical);
    assert!(alerts[0].description.contains("Chrome on Windows"));
    assert!(alerts[0].description.contains("Paris, FR"));
    assert!(alerts[0].description.contains("75"));

    let devices = vigil.trusted_devices(&user_id).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].login_count, 1);
    assert_eq!(devices[0].trust_level, TrustLevel::Low);
    assert_eq!(devices[0].risk_score, 75);

    clock.advance(Duration::minutes(1));
    let second = vigil
        .record_login(&user_id, "5.6.7.8", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    assert_eq!(second.risk_score, 0);
    assert_eq!(second.risk_level, RiskLevel::Low);
    assert!(!second.is_suspicious);

    let devices = vigil.trusted_devices(&user_id).await.unwrap();
    assert_eq!(devices[0].login_count, 2);
    assert_eq!(devices[0].trust_level, TrustLevel::Medium);
    assert_eq!(devices[0].last_seen_at, clock.now());
    assert_eq!(vigil.unresolved_alerts(&user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_new_ip_then_new_device() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U1");

    vigil
        .record_login(&user_id, "1.2.3.4", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    clock.advance(Duration::hours(1));

    let attempt = vigil
        .record_login(&user_id, "1.2.3.5", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    assert_eq!(attempt.risk_score, 20);
    assert_eq!(attempt.risk_level, RiskLevel::Low);

    clock.advance(Duration::hours(1));
    let new_device = vigil
        .record_login(&user_id, "1.2.3.5", FIREFOX_LINUX, true, None)
        .await
        .unwrap();
    assert_eq!(new_device.risk_score, 30);
    assert_eq!(new_device.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn test_off_hours_login_adds_weight() {
    let night = Utc.with_ymd_and_hms(2024, 3, 14, 3, 0, 0).unwrap();
    let (vigil, _clock) = setup(night).await;

    let attempt = vigil
        .record_login(&UserId::new("U1"), "5.6.7.8", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    assert_eq!(attempt.risk_score, 90);
    assert_eq!(attempt.risk_level, RiskLevel::Critical);
}

#[tokio::test]
async fn test_repeated_failures_lock_the_account_at_the_fifth() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U2");
    vigil.ensure_account(&user_id).await.unwrap();

    // A trusted device from a known address, so failures are the only signal
    vigil
        .record_login(&user_id, "1.2.3.4", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    clock.advance(Duration::hours(2));

    for n in 1..=4u32 {
        let outcome = vigil
            .record_failed_login(&user_id, "1.2.3.4", CHROME_WINDOWS, "Invalid password")
            .await
            .unwrap();
        assert_eq!(outcome.recent_failures, n);
        assert!(!outcome.locked);
        assert_eq!(outcome.attempt.risk_score, 5 * (n as u8 - 1));
        assert_eq!(outcome.attempt.action, LoginAction::FailedLogin);
        clock.advance(Duration::minutes(1));
    }
    assert!(!vigil.should_lock_account(&user_id).await.unwrap());
    assert!(!vigil.is_locked(&user_id).await.unwrap());

    let fifth = vigil
        .record_failed_login(&user_id, "1.2.3.4", CHROME_WINDOWS, "Invalid password")
        .await
        .unwrap();
    assert!(fifth.locked);
    assert_eq!(fifth.recent_failures, 5);
    assert_eq!(fifth.lockout.locked_until, Some(clock.now() + Duration::minutes(30)));
    assert!(vigil.should_lock_account(&user_id).await.unwrap());
    assert!(vigil.is_locked(&user_id).await.unwrap());

    clock.advance(Duration::minutes(1));
    let sixth = vigil
        .record_failed_login(&user_id, "1.2.3.4", CHROME_WINDOWS, "Invalid password")
        .await
        .unwrap();
    assert!(!sixth.locked);
    assert!(sixth.lockout.is_locked);
    assert_eq!(sixth.attempt.risk_score, 20);

    let alert_types: Vec<_> = vigil
        .unresolved_alerts(&user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.alert_type)
        .collect();
    assert_eq!(
        alert_types,
        vec![
            AlertType::AccountLocked,
            AlertType::MultipleFailedAttempts,
            AlertType::SuspiciousLogin,
        ]
    );

    // The lockout lapses on its own
    clock.advance(Duration::minutes(30));
    assert!(!vigil.is_locked(&user_id).await.unwrap());
}

#[tokio::test]
async fn test_manual_lock_and_unlock() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U3");
    vigil.ensure_account(&user_id).await.unwrap();

    let status = vigil
        .lock_account(&user_id, "Reported stolen credentials", Some(60))
        .await
        .unwrap();
    assert!(status.is_locked);
    assert_eq!(status.locked_until, Some(clock.now() + Duration::minutes(60)));
    assert_eq!(status.retry_after_seconds(), Some(3600));

    let alerts = vigil.unresolved_alerts(&user_id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, AlertType::AccountLocked);
    assert!(alerts[0].description.contains("Reported stolen credentials"));

    vigil.unlock_account(&user_id).await.unwrap();
    assert!(!vigil.is_locked(&user_id).await.unwrap());
}

#[tokio::test]
async fn test_lock_rejects_bad_input_and_unknown_users() {
    let (vigil, _clock) = setup(morning()).await;
    let user_id = UserId::new("U4");
    vigil.ensure_account(&user_id).await.unwrap();

    assert!(matches!(
        vigil.lock_account(&user_id, "Fraud", Some(0)).await,
        Err(VigilError::InvalidInput(_))
    ));
    assert!(matches!(
        vigil.lock_account(&user_id, "  ", None).await,
        Err(VigilError::InvalidInput(_))
    ));
    assert!(matches!(
        vigil
            .lock_account(&UserId::new("ghost"), "Fraud", None)
            .await,
        Err(VigilError::NotFound(_))
    ));
    assert!(
        vigil
            .unresolved_alerts(&UserId::new("ghost"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_resolve_alert_flow() {
    let (vigil, _clock) = setup(morning()).await;
    let user_id = UserId::new("U1");

    vigil
        .record_login(&user_id, "5.6.7.8", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    let alert = vigil.unresolved_alerts(&user_id).await.unwrap().remove(0);

    let resolved = vigil
        .resolve_alert(&alert.id, Some("User confirmed the trip"))
        .await
        .unwrap();
    assert!(resolved.is_resolved);
    assert_eq!(
        resolved.resolution_notes.as_deref(),
        Some("User confirmed the trip")
    );
    assert!(vigil.unresolved_alerts(&user_id).await.unwrap().is_empty());

    assert!(matches!(
        vigil.resolve_alert(&alert.id, None).await,
        Err(VigilError::InvalidInput(_))
    ));
    assert!(matches!(
        vigil.resolve_alert(&vigil::AlertId::new("alrt_missing"), None).await,
        Err(VigilError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blocked_device_counts_as_new() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U1");

    let first = vigil
        .record_login(&user_id, "1.2.3.4", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    vigil
        .block_device(&user_id, &first.device_signature, "Lost laptop")
        .await
        .unwrap();

    clock.advance(Duration::hours(1));
    let attempt = vigil
        .record_login(&user_id, "1.2.3.4", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    assert_eq!(attempt.risk_score, 30);

    let devices = vigil.trusted_devices(&user_id).await.unwrap();
    assert_eq!(devices[0].login_count, 1);
    assert!(devices[0].is_blocked());

    vigil
        .unblock_device(&user_id, &first.device_signature)
        .await
        .unwrap();
    clock.advance(Duration::hours(1));
    let attempt = vigil
        .record_login(&user_id, "1.2.3.4", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    assert_eq!(attempt.risk_score, 0);
}

#[tokio::test]
async fn test_history_and_logout() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U1");

    let login = vigil
        .record_login(&user_id, "1.2.3.4", CHROME_WINDOWS, true, None)
        .await
        .unwrap();
    clock.advance(Duration::minutes(30));
    let logout = vigil
        .record_logout(&user_id, "1.2.3.4", CHROME_WINDOWS, login.session_id.as_ref())
        .await
        .unwrap();
    assert_eq!(logout.action, LoginAction::Logout);
    assert_eq!(logout.risk_score, 0);
    assert_eq!(logout.session_id, login.session_id);

    let history = vigil.login_history(&user_id, 10).await.unwrap();
    let actions: Vec<_> = history.iter().map(|a| a.action).collect();
    assert_eq!(actions, vec![LoginAction::Logout, LoginAction::Login]);

    assert!(matches!(
        vigil.login_history(&user_id, 0).await,
        Err(VigilError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_assess_does_not_write() {
    let (vigil, _clock) = setup(morning()).await;
    let user_id = UserId::new("U1");

    let assessment = vigil
        .assess(&user_id, "5.6.7.8", CHROME_WINDOWS)
        .await
        .unwrap();
    assert_eq!(assessment.score, 75);
    assert!(assessment.is_suspicious);

    assert!(vigil.login_history(&user_id, 10).await.unwrap().is_empty());
    assert!(vigil.unresolved_alerts(&user_id).await.unwrap().is_empty());
    assert!(vigil.trusted_devices(&user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_events_are_emitted_for_suspicious_login() {
    let handler = Arc::new(RecordingHandler::default());
    let event_bus = EventBus::default();
    event_bus.register(handler.clone()).await;

    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let vigil = VigilBuilder::new()
        .with_sqlite_pool(pool)
        .with_location_resolver(Arc::new(
            StaticLocationResolver::new().with_entry("5.6.7.8", "Paris, FR"),
        ))
        .with_event_bus(event_bus)
        .with_clock(morning)
        .apply_migrations(true)
        .build()
        .await
        .unwrap();

    vigil
        .record_login(&UserId::new("U1"), "5.6.7.8", CHROME_WINDOWS, true, None)
        .await
        .unwrap();

    let events = handler.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], Event::LoginRecorded(_)));
    match &events[1] {
        Event::SuspiciousLogin { attempt, alert } => {
            assert_eq!(attempt.risk_score, 75);
            assert_eq!(alert.alert_type, AlertType::SuspiciousLogin);
        }
        other => panic!("Expected a suspicious login event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_six_failures_without_history() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U5");
    vigil.ensure_account(&user_id).await.unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..6 {
        outcomes.push(
            vigil
                .record_failed_login(&user_id, "1.2.3.4", FIREFOX_LINUX, "Invalid password")
                .await
                .unwrap(),
        );
        clock.advance(Duration::minutes(2));
    }

    let locked: Vec<_> = outcomes.iter().map(|o| o.locked).collect();
    assert_eq!(locked, vec![false, false, false, false, true, false]);
    assert!(outcomes[5].lockout.is_locked);

    // Failed logins never register the device, so it stays new
    let scores: Vec<_> = outcomes.iter().map(|o| o.attempt.risk_score).collect();
    assert_eq!(scores, vec![75, 35, 40, 45, 50, 50]);
    assert!(vigil.trusted_devices(&user_id).await.unwrap().is_empty());

    assert_eq!(vigil.login_history(&user_id, 10).await.unwrap().len(), 6);
    let alerts = vigil.unresolved_alerts(&user_id).await.unwrap();
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[2].alert_type, AlertType::SuspiciousLogin);
}

#[tokio::test]
async fn test_oversized_user_agent_still_locks() {
    let (vigil, clock) = setup(morning()).await;
    let user_id = UserId::new("U6");
    vigil.ensure_account(&user_id).await.unwrap();
    let user_agent = "A".repeat(5000);

    let mut locked = Vec::new();
    for _ in 0..6 {
        let outcome = vigil
            .record_failed_login(&user_id, "1.2.3.4", &user_agent, "Invalid password")
            .await
            .unwrap();
        locked.push(outcome.locked);
        clock.advance(Duration::minutes(1));
    }

    assert_eq!(locked, vec![false, false, false, false, true, false]);
    assert!(vigil.is_locked(&user_id).await.unwrap());

    let history = vigil.login_history(&user_id, 10).await.unwrap();
    assert_eq!(history.len(), 6);
    assert!(
        history
            .iter()
            .all(|a| a.user_agent.len() == MAX_STORED_USER_AGENT_LENGTH)
    );
}

struct FailingHandler;

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle_event(&self, _event: &Event) -> Result<(), EventError> {
        Err(EventError::HandlerError("audit sink down".to_string()))
    }
}

#[tokio::test]
async fn test_failing_handler_keeps_committed_lockout() {
    let event_bus = EventBus::default();
    event_bus.register(Arc::new(FailingHandler)).await;

    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let vigil = VigilBuilder::new()
        .with_sqlite_pool(pool)
        .with_event_bus(event_bus)
        .with_clock(morning)
        .apply_migrations(true)
        .build()
        .await
        .unwrap();
    let user_id = UserId::new("U7");
    vigil.ensure_account(&user_id).await.unwrap();

    for _ in 0..5 {
        vigil
            .record_failed_login(&user_id, "1.2.3.4", FIREFOX_LINUX, "Invalid password")
            .await
            .unwrap();
    }

    assert!(vigil.is_locked(&user_id).await.unwrap());
    assert_eq!(vigil.login_history(&user_id, 10).await.unwrap().len(), 5);
}
