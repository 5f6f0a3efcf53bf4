//! Saga run record and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Result, SagaId, SagaStoreError};

/// Step name recorded when a run is created, before any step is entered.
pub const INITIAL_STEP: &str = "INIT";

/// The status of a saga run.
///
/// State transitions:
/// ```text
/// Started ──► InProgress ──► Completed
///    │            │
///    ├────────────┼──► Completed            (no steps declared)
///    └────────────┴──► Compensating ──┬──► Compensated
///                                     └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Run record created, no step has finished yet.
    #[default]
    Started,

    /// At least one step finished without a fatal outcome.
    InProgress,

    /// Every step ran without a fatal outcome (terminal state).
    Completed,

    /// A fatal outcome was recorded and compensation is running.
    Compensating,

    /// Compensation finished (terminal state).
    Compensated,

    /// Compensation itself failed; needs manual follow-up (terminal state).
    Failed,
}

impl SagaStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SagaStatus; 6] = [
        SagaStatus::Started,
        SagaStatus::InProgress,
        SagaStatus::Completed,
        SagaStatus::Compensating,
        SagaStatus::Compensated,
        SagaStatus::Failed,
    ];

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns true if the run is on the failure path.
    pub fn is_failure_path(&self) -> bool {
        matches!(
            self,
            SagaStatus::Compensating | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns true if a run in this status may be moved to `next`.
    ///
    /// Re-writing a non-terminal status with itself is allowed so that the
    /// current step can be recorded without a status change.
    pub fn can_transition_to(&self, next: SagaStatus) -> bool {
        use SagaStatus::*;
        match (self, next) {
            (from, to) if from == &to => !from.is_terminal(),
            (Started, InProgress | Completed | Compensating) => true,
            (InProgress, Completed | Compensating) => true,
            (Compensating, Compensated | Failed) => true,
            _ => false,
        }
    }

    /// Returns the status name as stored and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InProgress => "IN_PROGRESS",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaStatus {
    type Err = SagaStoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SagaStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SagaStoreError::InvalidStatus(s.to_string()))
    }
}

/// One saga execution against one business aggregate.
///
/// Mutators only change the in-memory value; the orchestrator hands the
/// run to [`SagaRunStore::update`](crate::SagaRunStore::update) after each
/// change, which stamps `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRun {
    id: SagaId,
    aggregate_id: AggregateId,
    saga_type: String,
    status: SagaStatus,
    current_step: String,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaRun {
    /// Creates a fresh run in `STARTED` at the `INIT` step.
    pub fn new(aggregate_id: AggregateId, saga_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SagaId::new(),
            aggregate_id,
            saga_type: saga_type.into(),
            status: SagaStatus::Started,
            current_step: INITIAL_STEP.to_string(),
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a run from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: SagaId,
        aggregate_id: AggregateId,
        saga_type: String,
        status: SagaStatus,
        current_step: String,
        error_detail: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            aggregate_id,
            saga_type,
            status,
            current_step,
            error_detail,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn current_step(&self) -> &str {
        &self.current_step
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records the step about to run. Only allowed while the run is active.
    pub fn enter_step(&mut self, step: impl Into<String>) -> Result<()> {
        self.check_transition(self.status)?;
        self.current_step = step.into();
        Ok(())
    }

    /// Marks that at least one step has finished without a fatal outcome.
    pub fn mark_in_progress(&mut self) -> Result<()> {
        self.transition(SagaStatus::InProgress)
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(SagaStatus::Completed)
    }

    /// Enters compensation, recording the fatal cause.
    pub fn begin_compensation(&mut self, cause: impl Into<String>) -> Result<()> {
        self.check_transition(SagaStatus::Compensating)?;
        self.error_detail = Some(non_empty(cause.into()));
        self.status = SagaStatus::Compensating;
        Ok(())
    }

    pub fn mark_compensated(&mut self) -> Result<()> {
        self.transition(SagaStatus::Compensated)
    }

    /// Marks compensation as failed, keeping the original cause next to the
    /// compensation cause.
    pub fn mark_failed(&mut self, compensation_cause: impl Into<String>) -> Result<()> {
        self.check_transition(SagaStatus::Failed)?;
        let original = self.error_detail.take().unwrap_or_default();
        self.error_detail = Some(format!(
            "original failure: {original}; compensation failure: {}",
            compensation_cause.into()
        ));
        self.status = SagaStatus::Failed;
        Ok(())
    }

    pub(crate) fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn transition(&mut self, next: SagaStatus) -> Result<()> {
        self.check_transition(next)?;
        self.status = next;
        Ok(())
    }

    fn check_transition(&self, next: SagaStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(SagaStoreError::InvalidTransition {
                saga_id: self.id,
                from: self.status,
                to: next,
            })
        }
    }
}

fn non_empty(cause: String) -> String {
    if cause.trim().is_empty() {
        "unknown failure".to_string()
    } else {
        cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run() -> SagaRun {
        SagaRun::new(AggregateId::from("A1"), "ApplicationSubmitted")
    }

    #[test]
    fn test_new_run_starts_at_init() {
        let run = new_run();
        assert_eq!(run.status(), SagaStatus::Started);
        assert_eq!(run.current_step(), INITIAL_STEP);
        assert!(run.error_detail().is_none());
        assert_eq!(run.created_at(), run.updated_at());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut run = new_run();
        run.enter_step("VALIDATE_APPLICATION").unwrap();
        run.mark_in_progress().unwrap();
        run.enter_step("SEND_NOTIFICATIONS").unwrap();
        run.mark_in_progress().unwrap();
        run.mark_completed().unwrap();

        assert_eq!(run.status(), SagaStatus::Completed);
        assert_eq!(run.current_step(), "SEND_NOTIFICATIONS");
        assert!(run.error_detail().is_none());
    }

    #[test]
    fn test_compensation_keeps_error_detail() {
        let mut run = new_run();
        run.begin_compensation("not found").unwrap();
        assert_eq!(run.status(), SagaStatus::Compensating);
        assert_eq!(run.error_detail(), Some("not found"));

        run.mark_compensated().unwrap();
        assert_eq!(run.status(), SagaStatus::Compensated);
        assert_eq!(run.error_detail(), Some("not found"));
    }

    #[test]
    fn test_failed_records_both_causes() {
        let mut run = new_run();
        run.mark_in_progress().unwrap();
        run.begin_compensation("not found").unwrap();
        run.mark_failed("database offline").unwrap();

        assert_eq!(run.status(), SagaStatus::Failed);
        assert_eq!(
            run.error_detail(),
            Some("original failure: not found; compensation failure: database offline")
        );
    }

    #[test]
    fn test_empty_cause_is_replaced() {
        let mut run = new_run();
        run.begin_compensation("  ").unwrap();
        assert_eq!(run.error_detail(), Some("unknown failure"));
    }

    #[test]
    fn test_terminal_status_cannot_be_left() {
        let mut run = new_run();
        run.mark_completed().unwrap();

        assert!(matches!(
            run.begin_compensation("late"),
            Err(SagaStoreError::InvalidTransition { .. })
        ));
        assert!(run.enter_step("AGAIN").is_err());
        assert!(run.mark_in_progress().is_err());
        assert_eq!(run.status(), SagaStatus::Completed);
        assert!(run.error_detail().is_none());
    }

    #[test]
    fn test_cannot_skip_compensating() {
        let mut run = new_run();
        assert!(run.mark_compensated().is_err());
        assert!(run.mark_failed("boom").is_err());
        assert!(run.error_detail().is_none());
    }

    #[test]
    fn test_can_transition_to_matrix() {
        use SagaStatus::*;
        assert!(Started.can_transition_to(Started));
        assert!(Started.can_transition_to(InProgress));
        assert!(Started.can_transition_to(Compensating));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Started));
        assert!(!Compensating.can_transition_to(Completed));
        assert!(!Compensating.can_transition_to(InProgress));
        for terminal in [Completed, Compensated, Failed] {
            for next in SagaStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in SagaStatus::ALL {
            let parsed: SagaStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("RUNNING".parse::<SagaStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&SagaStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
