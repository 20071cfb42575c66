//! Error taxonomy.
//!
//! Expected rejections (bad rule, wrong event, already used) are never errors:
//! they come back as a [`crate::pipeline::Verdict`] with `success == false`.
//! The enums here cover what the caller has to handle differently:
//! undecodable payloads, an unreachable authority, and local storage faults.

use thiserror::Error;

/// Why a scanned payload could not be turned into a ticket reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("empty payload")]
    Empty,
    #[error("payload too large: {size} bytes (limit {limit})")]
    Oversized { size: usize, limit: usize },
    #[error("payload is not JSON, base64 JSON or key-value encoded")]
    Undecodable,
    #[error("missing ticket id")]
    MissingTicketId,
    #[error("missing event id")]
    MissingEventId,
}

/// Local persistence failures. Always fatal to the current operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt data under key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported schema version {found} under key {key} (max {supported})")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },
}

/// Failures talking to the remote ticket authority.
///
/// None of these mean "the ticket is invalid".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("authority unreachable: {0}")]
    Transport(String),
    #[error("authority call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("malformed authority response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the validation engine.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Online validation could not reach the authority. Retryable.
    #[error("online validation failed: {0}")]
    Transport(#[from] AuthorityError),
    #[error("offline check-in store failed: {0}")]
    Storage(#[from] StorageError),
}

impl ValidationError {
    /// Whether the host can retry the same scan as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ValidationError::Transport(_))
    }
}

/// Errors surfaced by the sync coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync already in progress")]
    AlreadyInProgress,
    #[error("sync batch submission failed: {0}")]
    Transport(#[from] AuthorityError),
    #[error("offline check-in store failed during sync: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_is_retryable() {
        let err = ValidationError::from(AuthorityError::Transport("connection refused".into()));
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "online validation failed: authority unreachable: connection refused"
        );
    }

    #[test]
    fn test_storage_is_not_retryable() {
        let err = ValidationError::from(StorageError::UnsupportedVersion {
            key: "k".into(),
            found: 9,
            supported: 1,
        });
        assert!(!err.is_retryable());
    }
}
