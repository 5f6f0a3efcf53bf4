//! Saga definitions: an ordered list of steps plus one compensating action.

use std::collections::HashSet;

use async_trait::async_trait;
use common::AggregateId;

use crate::error::{Result, SagaError};
use crate::step::{Criticality, StepAction, StepDefinition};

/// Per-run state shared by the steps of one saga.
pub trait SagaContext: Send + Sized + 'static {
    /// Builds a fresh context for a run against `aggregate_id`.
    fn for_aggregate(aggregate_id: &AggregateId) -> Self;
}

/// The single compensating action of a saga.
///
/// Must be idempotent: the orchestrator cannot tell a compensation that
/// never ran from one that partially applied.
#[async_trait]
pub trait Compensation: Send + Sync {
    async fn compensate(&self, aggregate_id: &AggregateId) -> Result<()>;
}

/// A named, statically ordered sequence of steps.
pub struct SagaDefinition<C: SagaContext> {
    saga_type: &'static str,
    steps: Vec<StepDefinition<C>>,
    compensation: Box<dyn Compensation>,
}

impl<C: SagaContext> SagaDefinition<C> {
    pub fn builder(
        saga_type: &'static str,
        compensation: impl Compensation + 'static,
    ) -> SagaDefinitionBuilder<C> {
        SagaDefinitionBuilder {
            saga_type,
            steps: Vec::new(),
            compensation: Box::new(compensation),
        }
    }

    pub fn saga_type(&self) -> &'static str {
        self.saga_type
    }

    pub fn steps(&self) -> &[StepDefinition<C>] {
        &self.steps
    }

    /// Name of the last declared step, if any.
    pub fn last_step(&self) -> Option<&'static str> {
        self.steps.last().map(StepDefinition::name)
    }

    pub fn compensation(&self) -> &dyn Compensation {
        self.compensation.as_ref()
    }
}

impl<C: SagaContext> std::fmt::Debug for SagaDefinition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("saga_type", &self.saga_type)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SagaDefinition`].
pub struct SagaDefinitionBuilder<C: SagaContext> {
    saga_type: &'static str,
    steps: Vec<StepDefinition<C>>,
    compensation: Box<dyn Compensation>,
}

impl<C: SagaContext> SagaDefinitionBuilder<C> {
    /// Appends a step whose failure aborts the saga.
    pub fn critical(mut self, name: &'static str, action: impl StepAction<C> + 'static) -> Self {
        self.steps
            .push(StepDefinition::new(name, Criticality::Critical, action));
        self
    }

    /// Appends a step whose failure is logged and tolerated.
    pub fn advisory(mut self, name: &'static str, action: impl StepAction<C> + 'static) -> Self {
        self.steps
            .push(StepDefinition::new(name, Criticality::Advisory, action));
        self
    }

    /// Validates step names and builds the definition.
    pub fn build(self) -> Result<SagaDefinition<C>> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name() == saga_store::INITIAL_STEP {
                return Err(SagaError::InvalidDefinition(format!(
                    "step name '{}' is reserved",
                    step.name()
                )));
            }
            if !seen.insert(step.name()) {
                return Err(SagaError::InvalidDefinition(format!(
                    "duplicate step name '{}'",
                    step.name()
                )));
            }
        }

        Ok(SagaDefinition {
            saga_type: self.saga_type,
            steps: self.steps,
            compensation: self.compensation,
        })
    }
}
