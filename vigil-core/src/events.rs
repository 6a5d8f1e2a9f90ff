use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{LoginAttempt, SecurityAlert, UserId, error::EventError};

/// Represents events that can be emitted by the event bus
///
/// Events are emitted after the corresponding write has succeeded, so a handler never
/// observes a login or lockout that was not persisted.
#[derive(Debug, Clone)]
pub enum Event {
    /// Any login, failed login or logout was appended to the history
    LoginRecorded(LoginAttempt),

    /// A login scored at or above the suspicious threshold and an alert was raised.
    ///
    /// This is a security-critical event that should reach a human.
    SuspiciousLogin {
        attempt: LoginAttempt,
        alert: SecurityAlert,
    },

    /// An account was locked, automatically or by an operator
    AccountLocked {
        user_id: UserId,
        reason: String,
        locked_until: DateTime<Utc>,
        alert: SecurityAlert,
    },

    /// An account's lockout was cleared
    AccountUnlocked {
        user_id: UserId,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn user_id(&self) -> &UserId {
        match self {
            Event::LoginRecorded(attempt) => &attempt.user_id,
            Event::SuspiciousLogin { attempt, .. } => &attempt.user_id,
            Event::AccountLocked { user_id, .. } => user_id,
            Event::AccountUnlocked { user_id, .. } => user_id,
        }
    }
}

/// A trait for handling events emitted by the event bus
///
/// # Errors
///
/// Returns an [`EventError`] if event handling fails. The bus returns it to the emitting
/// service, which logs it. The writes behind the event are already committed and stay.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that can emit events and register event handlers
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use vigil_core::events::EventBus;
///
/// let event_bus = EventBus::default();
/// event_bus.register(Arc::new(MyHandler)).await;
/// ```
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an event handler with the event bus
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers, in registration order
    ///
    /// Stops at the first handler that fails and returns its error.
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }
}
