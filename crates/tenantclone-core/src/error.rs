//! Error types for tenantclone.

use thiserror::Error;

use crate::models::OrganizationId;

/// Result type alias using tenantclone's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for clone operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Organization not found
    #[error("Organization not found: {0}")]
    OrganizationNotFound(OrganizationId),

    /// Clone plan is invalid (cycle, unknown target, bad identifier)
    #[error("Clone plan error: {0}")]
    Plan(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write conflicts with existing state (duplicate mapping, unique value)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Operation refused for the given organization
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error means the whole clone job cannot continue.
    ///
    /// Storage connectivity, missing organizations, and plan errors abort the
    /// job. Constraint violations, decode problems, and timeouts on a single
    /// row are recovered by skipping that row.
    pub fn is_structural(&self) -> bool {
        match self {
            Error::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::Configuration(_)
                    | sqlx::Error::WorkerCrashed
            ),
            Error::OrganizationNotFound(_)
            | Error::Plan(_)
            | Error::Config(_)
            | Error::Forbidden(_)
            | Error::Internal(_) => true,
            Error::NotFound(_)
            | Error::InvalidInput(_)
            | Error::Conflict(_)
            | Error::Serialization(_)
            | Error::Timeout(_) => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
