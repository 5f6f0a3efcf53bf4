use async_trait::async_trait;

use crate::{AggregateId, Result, SagaId, SagaRun, SagaStatus, SagaStoreError};

/// Core trait for saga run persistence.
///
/// Every method returns only after the backend acknowledged the write, so
/// the orchestrator can rely on the recorded step preceding the action it
/// is about to take.
#[async_trait]
pub trait SagaRunStore: Send + Sync {
    /// Creates and persists a new run in `STARTED` at the `INIT` step.
    async fn create(&self, aggregate_id: AggregateId, saga_type: &str) -> Result<SagaRun>;

    /// Persists the current state of `run` and stamps its `updated_at`.
    ///
    /// Fails with `RunNotFound` for a run this store never created and with
    /// `InvalidTransition` if the persisted status may not move to the new
    /// one.
    async fn update(&self, run: &mut SagaRun) -> Result<()>;

    /// Returns the most recently created run for an aggregate.
    async fn find_by_aggregate_id(&self, aggregate_id: &AggregateId) -> Result<Option<SagaRun>>;

    /// Returns every run for an aggregate, oldest first.
    async fn find_all_by_aggregate_id(&self, aggregate_id: &AggregateId) -> Result<Vec<SagaRun>>;

    /// Retrieves a run by its ID.
    async fn find_by_id(&self, saga_id: SagaId) -> Result<Option<SagaRun>>;

    /// Returns all runs currently in `status`, oldest first.
    async fn find_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRun>>;
}

/// Checks that a persisted status may be overwritten with the run's status.
pub(crate) fn ensure_transition(persisted: SagaStatus, run: &SagaRun) -> Result<()> {
    if persisted.can_transition_to(run.status()) {
        Ok(())
    } else {
        Err(SagaStoreError::InvalidTransition {
            saga_id: run.id(),
            from: persisted,
            to: run.status(),
        })
    }
}
