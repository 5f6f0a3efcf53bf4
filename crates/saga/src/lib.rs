//! Saga orchestration for the application-submitted workflow.
//!
//! A saga is a statically ordered list of steps, each either critical or
//! advisory, plus one idempotent compensating action. The
//! [`SagaOrchestrator`] persists the current step before running it, keeps
//! going past advisory failures, and compensates once on the first
//! critical failure. The [`SagaLauncher`] runs sagas on their own tasks so
//! callers only ever see [`Accepted`].
//!
//! The [`application`] module wires the reference saga:
//! 1. Load the application (critical)
//! 2. Validate the applicant against the user service (advisory)
//! 3. Validate the job against the job service (advisory)
//! 4. Notify the applicant (advisory)
//!
//! If loading fails, the application is deleted.

pub mod application;
pub mod definition;
pub mod error;
pub mod launcher;
pub mod orchestrator;
pub mod services;
pub mod step;

pub use application::{
    Application, ApplicationRepository, ApplicationSagaContext, ApplicationSagaDeps,
    ApplicationService, ApplicationStatus, InMemoryApplicationRepository, NewApplication,
    application_submitted_saga,
};
pub use definition::{Compensation, SagaContext, SagaDefinition, SagaDefinitionBuilder};
pub use error::{Result, SagaError};
pub use launcher::{Accepted, DEFAULT_MAX_CONCURRENT, SagaLauncher};
pub use orchestrator::SagaOrchestrator;
pub use services::{
    InMemoryJobCatalog, InMemoryNotificationDispatcher, InMemoryUserDirectory, JobCatalog,
    JobRecord, NotificationDispatcher, NotificationEvent, UserDirectory, UserRecord,
};
pub use step::{Criticality, StepAction, StepDefinition, StepOutcome, StepSignal};
