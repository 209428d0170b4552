use serde::Serialize;
use ulid::Ulid;

use crate::model::{BookingStatus, Ms};

/// A single rejected input field, reported back to the caller as `{path, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    /// `start >= end`.
    InvalidRange {
        start: Ms,
        end: Ms,
    },
    /// Field-level validation failures; nothing was written.
    Invalid(Vec<FieldError>),
    /// The requested slot overlaps a non-cancelled booking.
    SlotUnavailable {
        space_id: Ulid,
        conflicting: Ulid,
    },
    /// A location with the same (name, city, address) exists.
    AlreadyExists(Ulid),
    /// A space with this name already exists in the location.
    DuplicateName(String),
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
    },
    Forbidden(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Invalid(vec![FieldError::new(path, message)])
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::SlotUnavailable { .. }
                | EngineError::AlreadyExists(_)
                | EngineError::DuplicateName(_)
                | EngineError::InvalidTransition { .. }
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid time range [{start}, {end}): start must be before end")
            }
            EngineError::Invalid(errors) => {
                write!(f, "validation failed")?;
                for (i, e) in errors.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{} {}", e.path, e.message)?;
                }
                Ok(())
            }
            EngineError::SlotUnavailable { space_id, conflicting } => {
                write!(f, "space {space_id} is not available in the requested slot (booking {conflicting})")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateName(name) => write!(f, "duplicate space name: {name}"),
            EngineError::InvalidTransition { id, from } => {
                write!(f, "booking {id} cannot change state from {from}")
            }
            EngineError::Forbidden(id) => write!(f, "not permitted on {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
