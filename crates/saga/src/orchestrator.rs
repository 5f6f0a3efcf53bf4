//! Drives one saga run from `STARTED` to a terminal status.

use std::time::Instant;

use common::AggregateId;
use saga_store::{SagaRun, SagaRunStore, SagaStatus};

use crate::definition::{SagaContext, SagaDefinition};
use crate::error::Result;
use crate::step::{StepDefinition, StepOutcome};

/// Executes a [`SagaDefinition`] and records every transition in a
/// [`SagaRunStore`] before acting on it.
///
/// The current step is persisted before its action runs, so a crash
/// leaves the run pointing at the step that was in flight.
pub struct SagaOrchestrator<S, C>
where
    S: SagaRunStore,
    C: SagaContext,
{
    store: S,
    definition: SagaDefinition<C>,
}

impl<S, C> SagaOrchestrator<S, C>
where
    S: SagaRunStore,
    C: SagaContext,
{
    pub fn new(store: S, definition: SagaDefinition<C>) -> Self {
        Self { store, definition }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn definition(&self) -> &SagaDefinition<C> {
        &self.definition
    }

    /// Runs the saga against `aggregate_id` and returns the terminal run.
    ///
    /// Step failures never surface here; they end in `COMPLETED`,
    /// `COMPENSATED` or `FAILED`. A store error aborts the run as-is and
    /// is returned.
    #[tracing::instrument(
        skip_all,
        fields(
            saga_type = self.definition.saga_type(),
            aggregate_id = %aggregate_id,
            saga_id = tracing::field::Empty,
        )
    )]
    pub async fn run(&self, aggregate_id: AggregateId) -> Result<SagaRun> {
        let started_at = Instant::now();

        let mut run = self
            .store
            .create(aggregate_id.clone(), self.definition.saga_type())
            .await?;
        tracing::Span::current().record("saga_id", tracing::field::display(run.id()));
        metrics::counter!("saga_runs_started_total").increment(1);
        tracing::info!(status = %run.status(), "saga started");

        let mut ctx = C::for_aggregate(&aggregate_id);
        let mut fatal = None;

        for step in self.definition.steps() {
            fatal = self.run_step(&mut run, &mut ctx, step).await?;
            if fatal.is_some() {
                break;
            }
        }

        match fatal {
            None => {
                run.mark_completed()?;
                self.store.update(&mut run).await?;
                metrics::counter!("saga_runs_completed_total").increment(1);
                tracing::info!(step = run.current_step(), status = %run.status(), "saga completed");
            }
            Some(cause) => self.compensate(&mut run, cause).await?,
        }

        metrics::histogram!("saga_duration_seconds").record(started_at.elapsed().as_secs_f64());
        Ok(run)
    }

    /// Persists `step` as current, runs it and returns the cause if it was
    /// fatal. Marks the run `IN_PROGRESS` after its first non-fatal step.
    #[tracing::instrument(name = "saga_step", skip_all, fields(step = step.name()))]
    async fn run_step(
        &self,
        run: &mut SagaRun,
        ctx: &mut C,
        step: &StepDefinition<C>,
    ) -> Result<Option<String>> {
        run.enter_step(step.name())?;
        self.store.update(run).await?;
        tracing::info!(status = %run.status(), "saga step entered");

        let outcome = step.run(ctx).await;
        metrics::counter!(
            "saga_step_outcomes_total",
            "step" => step.name(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        match outcome {
            StepOutcome::Success => {
                tracing::info!(outcome = "SUCCESS", "saga step finished");
            }
            StepOutcome::ToleratedFailure { cause } => {
                tracing::warn!(outcome = "TOLERATED_FAILURE", %cause, "saga step failed, continuing");
            }
            StepOutcome::FatalFailure { cause } => {
                tracing::error!(outcome = "FATAL_FAILURE", %cause, "saga step failed");
                return Ok(Some(cause));
            }
        }

        if run.status() == SagaStatus::Started {
            run.mark_in_progress()?;
            self.store.update(run).await?;
            tracing::info!(status = %run.status(), "saga in progress");
        }
        Ok(None)
    }

    /// Runs the single compensating action once and records its result.
    async fn compensate(&self, run: &mut SagaRun, cause: String) -> Result<()> {
        run.begin_compensation(cause)?;
        self.store.update(run).await?;
        tracing::warn!(
            step = run.current_step(),
            status = %run.status(),
            error_detail = run.error_detail(),
            "saga compensating"
        );

        let aggregate_id = run.aggregate_id().clone();
        match self.definition.compensation().compensate(&aggregate_id).await {
            Ok(()) => {
                run.mark_compensated()?;
                self.store.update(run).await?;
                metrics::counter!("saga_runs_compensated_total").increment(1);
                tracing::info!(status = %run.status(), "saga compensated");
            }
            Err(err) => {
                run.mark_failed(err.to_string())?;
                self.store.update(run).await?;
                metrics::counter!("saga_runs_failed_total").increment(1);
                tracing::error!(
                    status = %run.status(),
                    error_detail = run.error_detail(),
                    "saga compensation failed, manual follow-up required"
                );
            }
        }
        Ok(())
    }
}

impl<S, C> std::fmt::Debug for SagaOrchestrator<S, C>
where
    S: SagaRunStore,
    C: SagaContext,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaOrchestrator")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
