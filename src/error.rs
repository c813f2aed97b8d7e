use crate::types::Timestamp;
use thiserror::Error;

/// Custom error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Point too old: timestamp {timestamp} is before retention cutoff {cutoff}")]
    PointTooOld {
        timestamp: Timestamp,
        cutoff: Timestamp,
    },

    #[error("Invalid WAL line: {0}")]
    InvalidLine(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Background task error: {0}")]
    BackgroundTaskError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StoreError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}
