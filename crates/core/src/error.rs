// Central Error Type for redq

use thiserror::Error;

use crate::domain::{ConfigurationError, LockGate};
use crate::port::HandlerError;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Lock acquisition failed: {gate} gate for '{name}' not obtained")]
    LockAcquisitionFailed { name: String, gate: LockGate },

    #[error("Wait interrupted: {0}")]
    Interrupted(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Lock backend error: {0}")]
    LockBackend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn lock_failed(name: impl Into<String>, gate: LockGate) -> Self {
        AppError::LockAcquisitionFailed {
            name: name.into(),
            gate,
        }
    }

    /// True for the error a lock caller is expected to retry on
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, AppError::LockAcquisitionFailed { .. })
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
