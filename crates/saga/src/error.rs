//! Saga error types.

use common::AggregateId;
use resilience::RemoteCallError;
use saga_store::SagaStoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga state store rejected or failed a write.
    #[error("Saga store error: {0}")]
    Store(#[from] SagaStoreError),

    /// A saga step failed.
    #[error("Saga step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// The compensating action could not undo the aggregate.
    #[error("Compensation failed: {0}")]
    CompensationFailed(String),

    /// The aggregate the saga acts upon does not exist.
    #[error("not found")]
    ApplicationNotFound(AggregateId),

    /// The applicant already applied for this job.
    #[error("Applicant {applicant_id} has already applied for job {job_id}")]
    DuplicateApplication { applicant_id: i64, job_id: i64 },

    /// The aggregate repository failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// A remote dependency failed outside a guarded call.
    #[error("Remote call error: {0}")]
    Remote(#[from] RemoteCallError),

    /// A saga definition was built with conflicting steps.
    #[error("Invalid saga definition: {0}")]
    InvalidDefinition(String),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
