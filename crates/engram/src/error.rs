//! Error types for Engram

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::memory::types::EntityKind;

/// Main error type for Engram operations
#[derive(Error, Debug)]
pub enum EngramError {
    /// Entity absent; callers proceed with an empty result
    #[error("{kind} {id} not found in namespace '{namespace}'")]
    NotFound {
        namespace: String,
        kind: EntityKind,
        id: Uuid,
    },

    /// Advisory lock could not be acquired within the bounded backoff window
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// On-disk record was unreadable and has been moved to quarantine
    #[error("Corrupt entity quarantined: {}", path.display())]
    CorruptEntity { path: PathBuf },

    /// Cross-namespace reference or malformed namespace; programmer error
    #[error("Namespace violation: {0}")]
    NamespaceViolation(String),

    /// Configuration errors (unreadable config file, unusable store root)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage-related errors (file system, layout)
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),
}

impl EngramError {
    /// Stable machine-readable kind, used by the CLI and HTTP error bodies.
    pub fn kind_str(&self) -> &'static str {
        match self {
            EngramError::NotFound { .. } => "not_found",
            EngramError::LockTimeout(_) => "lock_timeout",
            EngramError::CorruptEntity { .. } => "corrupt_entity",
            EngramError::NamespaceViolation(_) => "namespace_violation",
            EngramError::Config(_) => "config",
            EngramError::Storage(_) => "storage",
            EngramError::Io(_) => "io",
            EngramError::Serialization(_) => "serialization",
            EngramError::Server(_) => "server",
        }
    }

}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, EngramError>;
