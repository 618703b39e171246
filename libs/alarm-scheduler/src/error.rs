//! Alarm Scheduler Error Types

use thiserror::Error;

/// Result type for alarm store operations
pub type Result<T> = std::result::Result<T, AlarmError>;

/// Alarm store errors
///
/// All of these are local and recoverable; the store is left unchanged
/// whenever one is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// Insert attempted while every slot is taken
    #[error("Alarm store is full ({max} alarms)")]
    CapacityExceeded { max: usize },

    /// No customizable alarm carries this web id
    #[error("Alarm not found: web id {0}")]
    NotFound(i32),

    /// Mutation attempted on a system alarm
    #[error("Alarm is not customizable: web id {0}")]
    NotCustomizable(i32),

    /// Modify called without an action to bind
    #[error("Missing callback for alarm: web id {0}")]
    InvalidCallback(i32),

    /// Field values rejected before touching the store
    #[error("Invalid alarm: {0}")]
    InvalidAlarm(String),
}

/// Persistence collaborator errors
///
/// Never fatal: the in-memory store stays authoritative.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// File system error
    #[error("Persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document could not be encoded or decoded
    #[error("Persistence parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Parse(err.to_string())
    }
}
