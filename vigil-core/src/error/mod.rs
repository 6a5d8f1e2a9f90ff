pub mod utilities;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event bus error: {0}")]
    BusError(String),

    #[error("Event handler error: {0}")]
    HandlerError(String),
}

impl Error {
    /// A referenced user, device, alert or session does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(StorageError::NotFound(_)))
    }

    /// A read or write against a collaborator failed.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Error::Storage(
                StorageError::Database(_)
                    | StorageError::Migration(_)
                    | StorageError::Connection(_)
                    | StorageError::Constraint(_)
            ) | Error::Location(_)
                | Error::Event(_)
        )
    }

    /// The request was rejected before any side effect.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::Storage(StorageError::Constraint(_)))
    }
}
