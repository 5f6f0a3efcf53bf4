use thiserror::Error;

use crate::{SagaId, SagaStatus};

/// Errors that can occur when reading or writing saga runs.
#[derive(Debug, Error)]
pub enum SagaStoreError {
    /// The run being updated was never created in this store.
    #[error("Saga run not found: {0}")]
    RunNotFound(SagaId),

    /// The requested status change would move a run backwards or out of a
    /// terminal status.
    #[error("Invalid saga status transition for run {saga_id}: {from} -> {to}")]
    InvalidTransition {
        saga_id: SagaId,
        from: SagaStatus,
        to: SagaStatus,
    },

    /// A persisted status string did not match any known status.
    #[error("Unknown saga status: {0}")]
    InvalidStatus(String),

    /// The backend refused or failed the write.
    #[error("Saga store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, SagaStoreError>;
