//! The application-submitted saga and the application aggregate it acts on.
//!
//! Once an application is persisted, the saga loads it, validates the
//! applicant and the job against their services, and notifies the
//! applicant. Only a failed load is fatal; it deletes the application.
//! The remote validations and the notification are advisory and run
//! through the [`RemoteCallGuard`](resilience::RemoteCallGuard).

pub mod model;
pub mod repository;
pub mod service;
pub mod steps;

use std::sync::Arc;

use resilience::RemoteCallGuard;

use crate::definition::SagaDefinition;
use crate::error::Result;
use crate::services::{JobCatalog, NotificationDispatcher, UserDirectory};

pub use model::{Application, ApplicationStatus, NewApplication};
pub use repository::{ApplicationRepository, InMemoryApplicationRepository};
pub use service::ApplicationService;
pub use steps::{
    ApplicationSagaContext, DeleteApplication, LoadApplication, SendNotifications, ValidateJob,
    ValidateUser,
};

/// Saga type recorded on every run of this saga.
pub const SAGA_TYPE: &str = "ApplicationSubmitted";

pub const STEP_VALIDATE_APPLICATION: &str = "VALIDATE_APPLICATION";
pub const STEP_VALIDATE_USER: &str = "VALIDATE_USER";
pub const STEP_VALIDATE_JOB: &str = "VALIDATE_JOB";
pub const STEP_SEND_NOTIFICATIONS: &str = "SEND_NOTIFICATIONS";

pub const USER_SERVICE: &str = "user-service";
pub const JOB_SERVICE: &str = "job-service";
pub const NOTIFICATION_SERVICE: &str = "notification-service";

/// Collaborators of the application-submitted saga.
#[derive(Clone)]
pub struct ApplicationSagaDeps {
    pub repository: Arc<dyn ApplicationRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub jobs: Arc<dyn JobCatalog>,
    pub notifications: Arc<dyn NotificationDispatcher>,
    pub guard: RemoteCallGuard,
}

/// Builds the application-submitted saga.
pub fn application_submitted_saga(
    deps: ApplicationSagaDeps,
) -> Result<SagaDefinition<ApplicationSagaContext>> {
    SagaDefinition::builder(
        SAGA_TYPE,
        DeleteApplication::new(Arc::clone(&deps.repository)),
    )
    .critical(
        STEP_VALIDATE_APPLICATION,
        LoadApplication::new(Arc::clone(&deps.repository)),
    )
    .advisory(
        STEP_VALIDATE_USER,
        ValidateUser::new(deps.users, deps.guard.clone()),
    )
    .advisory(
        STEP_VALIDATE_JOB,
        ValidateJob::new(deps.jobs, deps.guard.clone()),
    )
    .advisory(
        STEP_SEND_NOTIFICATIONS,
        SendNotifications::new(deps.notifications, deps.guard),
    )
    .build()
}
