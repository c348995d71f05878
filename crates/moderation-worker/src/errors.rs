//! Worker error taxonomy with retry classification.
//!
//! Per-item failures are classified so the orchestrator can map them onto
//! the item lifecycle without string matching.
//!
//! | Category   | Retriable | Lifecycle outcome                 |
//! |------------|-----------|-----------------------------------|
//! | Transient  | yes       | `retry` (or `failed` at the bound) |
//! | Validation | no        | `failed` immediately              |

use std::fmt;

use moderation::{ComplaintId, ConfigError, ValidationError};
use thiserror::Error;

/// Classification used by the orchestrator to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Store, object store or network hiccup, or a crashed item pipeline.
    Transient,
    /// Content that reprocessing cannot fix.
    Validation,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Complaint store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Complaint store unavailable: {0}")]
    Unavailable(String),

    #[error("Complaint {0} not found")]
    NotFound(ComplaintId),

    #[error("Failed to write result for {id}: {message}")]
    Write { id: ComplaintId, message: String },

    #[error("Complaint store data error: {0}")]
    Data(String),
}

/// Object store failure while keeping a flagged payload.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object store rejected {key}: {message}")]
    Rejected { key: String, message: String },
}

/// Notification sink failure. Logged only; never changes an outcome.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport failure: {0}")]
    Transport(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Failure of one item's pipeline.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Invalid complaint content: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to store flagged payload: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("Failed to persist result: {0}")]
    Persist(#[source] StoreError),

    #[error("Item pipeline panicked: {0}")]
    Panicked(String),
}

impl ItemError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Validation(_) => RetryCategory::Validation,
            Self::ObjectStore(_) | Self::Persist(_) | Self::Panicked(_) => {
                RetryCategory::Transient
            }
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

/// Worker configuration could not be loaded.
#[derive(Debug, Error)]
pub enum WorkerConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse worker config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid worker config: {0}")]
    Invalid(#[from] ConfigError),

    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
}

/// Invocation-level failure; the only way a batch call fails outright.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid batch request: {0}")]
    InvalidRequest(String),

    #[error("Complaint store unreachable: {0}")]
    StoreUnreachable(#[source] StoreError),

    #[error("Invalid moderation configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retriable() {
        let err = ItemError::from(ValidationError::Empty);
        assert!(!err.is_retriable());
        assert_eq!(err.retry_category(), RetryCategory::Validation);
    }

    #[test]
    fn test_persistence_and_panics_are_transient() {
        let err = ItemError::Persist(StoreError::Unavailable("connection reset".into()));
        assert!(err.is_retriable());
        assert!(ItemError::Panicked("boom".into()).is_retriable());
    }

    #[test]
    fn test_object_store_io_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ItemError::from(ObjectStoreError::from(io));
        assert_eq!(err.retry_category(), RetryCategory::Transient);
        assert!(err.to_string().contains("disk full"));
    }
}
