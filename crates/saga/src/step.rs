//! Step definitions and step outcome classification.

use async_trait::async_trait;

use crate::error::SagaError;

/// Whether a failing step aborts the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criticality {
    /// A failure is fatal and triggers compensation.
    Critical,
    /// A failure is logged and the saga continues.
    Advisory,
}

/// What a step action reports when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSignal {
    /// The step did its work.
    Done,
    /// A guarded dependency fell back; the step carries on without its result.
    Degraded(String),
}

/// Result of one step execution, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    ToleratedFailure { cause: String },
    FatalFailure { cause: String },
}

impl StepOutcome {
    /// Folds an action result and the step's criticality into an outcome.
    pub fn classify(criticality: Criticality, result: Result<StepSignal, SagaError>) -> Self {
        match result {
            Ok(StepSignal::Done) => StepOutcome::Success,
            Ok(StepSignal::Degraded(cause)) => StepOutcome::ToleratedFailure { cause },
            Err(err) => match criticality {
                Criticality::Critical => StepOutcome::FatalFailure {
                    cause: err.to_string(),
                },
                Criticality::Advisory => StepOutcome::ToleratedFailure {
                    cause: err.to_string(),
                },
            },
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StepOutcome::FatalFailure { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Success => "SUCCESS",
            StepOutcome::ToleratedFailure { .. } => "TOLERATED_FAILURE",
            StepOutcome::FatalFailure { .. } => "FATAL_FAILURE",
        }
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Forward action of a saga step.
///
/// `C` is the per-run context shared by the steps of one saga.
#[async_trait]
pub trait StepAction<C: Send>: Send + Sync {
    async fn execute(&self, ctx: &mut C) -> Result<StepSignal, SagaError>;
}

/// A named step with a static criticality.
pub struct StepDefinition<C: Send> {
    name: &'static str,
    criticality: Criticality,
    action: Box<dyn StepAction<C>>,
}

impl<C: Send> StepDefinition<C> {
    pub fn new(
        name: &'static str,
        criticality: Criticality,
        action: impl StepAction<C> + 'static,
    ) -> Self {
        Self {
            name,
            criticality,
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn criticality(&self) -> Criticality {
        self.criticality
    }

    /// Runs the forward action and classifies its result.
    pub async fn run(&self, ctx: &mut C) -> StepOutcome {
        StepOutcome::classify(self.criticality, self.action.execute(ctx).await)
    }
}

impl<C: Send> std::fmt::Debug for StepDefinition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("criticality", &self.criticality)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> Result<StepSignal, SagaError> {
        Err(SagaError::StepFailed {
            step: "VALIDATE_USER".to_string(),
            reason: "boom".to_string(),
        })
    }

    #[test]
    fn test_done_is_success_regardless_of_criticality() {
        for criticality in [Criticality::Critical, Criticality::Advisory] {
            assert_eq!(
                StepOutcome::classify(criticality, Ok(StepSignal::Done)),
                StepOutcome::Success
            );
        }
    }

    #[test]
    fn test_degraded_is_tolerated_even_when_critical() {
        let outcome = StepOutcome::classify(
            Criticality::Critical,
            Ok(StepSignal::Degraded("circuit open".to_string())),
        );
        assert_eq!(
            outcome,
            StepOutcome::ToleratedFailure {
                cause: "circuit open".to_string()
            }
        );
    }

    #[test]
    fn test_error_follows_criticality() {
        assert!(StepOutcome::classify(Criticality::Critical, failure()).is_fatal());
        assert!(!StepOutcome::classify(Criticality::Advisory, failure()).is_fatal());
    }

    #[test]
    fn test_not_found_cause_text() {
        let outcome = StepOutcome::classify(
            Criticality::Critical,
            Err(SagaError::ApplicationNotFound("A2".into())),
        );
        assert_eq!(
            outcome,
            StepOutcome::FatalFailure {
                cause: "not found".to_string()
            }
        );
    }
}
