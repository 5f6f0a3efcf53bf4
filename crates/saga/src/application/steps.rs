//! Steps and compensation of the application-submitted saga.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use resilience::{RemoteCallError, RemoteCallGuard};

use super::model::Application;
use super::repository::ApplicationRepository;
use super::{
    JOB_SERVICE, NOTIFICATION_SERVICE, STEP_SEND_NOTIFICATIONS, STEP_VALIDATE_JOB,
    STEP_VALIDATE_USER, USER_SERVICE,
};
use crate::definition::{Compensation, SagaContext};
use crate::error::{Result, SagaError};
use crate::services::{JobCatalog, NotificationDispatcher, NotificationEvent, UserDirectory};
use crate::step::{StepAction, StepSignal};

/// Per-run state: the application once it has been loaded.
#[derive(Debug, Clone)]
pub struct ApplicationSagaContext {
    pub aggregate_id: AggregateId,
    pub application: Option<Application>,
}

impl ApplicationSagaContext {
    fn loaded(&self, step: &str) -> Result<&Application> {
        self.application.as_ref().ok_or_else(|| SagaError::StepFailed {
            step: step.to_string(),
            reason: "application not loaded".to_string(),
        })
    }
}

impl SagaContext for ApplicationSagaContext {
    fn for_aggregate(aggregate_id: &AggregateId) -> Self {
        Self {
            aggregate_id: aggregate_id.clone(),
            application: None,
        }
    }
}

/// Loads the application the saga was started for.
pub struct LoadApplication {
    repository: Arc<dyn ApplicationRepository>,
}

impl LoadApplication {
    pub fn new(repository: Arc<dyn ApplicationRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl StepAction<ApplicationSagaContext> for LoadApplication {
    async fn execute(&self, ctx: &mut ApplicationSagaContext) -> Result<StepSignal> {
        let application = self
            .repository
            .load(&ctx.aggregate_id)
            .await?
            .ok_or_else(|| SagaError::ApplicationNotFound(ctx.aggregate_id.clone()))?;

        tracing::debug!(
            applicant_id = application.applicant_id,
            job_id = application.job_id,
            "application loaded"
        );
        ctx.application = Some(application);
        Ok(StepSignal::Done)
    }
}

/// Checks that the applicant exists and is active.
pub struct ValidateUser {
    users: Arc<dyn UserDirectory>,
    guard: RemoteCallGuard,
}

impl ValidateUser {
    pub fn new(users: Arc<dyn UserDirectory>, guard: RemoteCallGuard) -> Self {
        Self { users, guard }
    }
}

#[async_trait]
impl StepAction<ApplicationSagaContext> for ValidateUser {
    async fn execute(&self, ctx: &mut ApplicationSagaContext) -> Result<StepSignal> {
        let applicant_id = ctx.loaded(STEP_VALIDATE_USER)?.applicant_id;
        let users = self.users.as_ref();

        let signal = self
            .guard
            .guard(
                USER_SERVICE,
                move || async move {
                    match users.fetch_user(applicant_id).await {
                        Ok(user) if user.active => Ok(StepSignal::Done),
                        Ok(_) => Err(RemoteCallError::Rejected(
                            "Invalid or inactive user".to_string(),
                        )),
                        Err(err) => Err(err),
                    }
                },
                |cause| async move { StepSignal::Degraded(cause.to_string()) },
            )
            .await;
        Ok(signal)
    }
}

/// Checks that the job posting exists.
pub struct ValidateJob {
    jobs: Arc<dyn JobCatalog>,
    guard: RemoteCallGuard,
}

impl ValidateJob {
    pub fn new(jobs: Arc<dyn JobCatalog>, guard: RemoteCallGuard) -> Self {
        Self { jobs, guard }
    }
}

#[async_trait]
impl StepAction<ApplicationSagaContext> for ValidateJob {
    async fn execute(&self, ctx: &mut ApplicationSagaContext) -> Result<StepSignal> {
        let job_id = ctx.loaded(STEP_VALIDATE_JOB)?.job_id;
        let jobs = self.jobs.as_ref();

        let signal = self
            .guard
            .guard(
                JOB_SERVICE,
                move || async move {
                    jobs.fetch_job(job_id).await.map(|job| {
                        tracing::debug!(job_id = job.id, title = %job.title, "job validated");
                        StepSignal::Done
                    })
                },
                |cause| async move { StepSignal::Degraded(cause.to_string()) },
            )
            .await;
        Ok(signal)
    }
}

/// Tells the applicant their application was received.
pub struct SendNotifications {
    notifications: Arc<dyn NotificationDispatcher>,
    guard: RemoteCallGuard,
}

impl SendNotifications {
    pub fn new(notifications: Arc<dyn NotificationDispatcher>, guard: RemoteCallGuard) -> Self {
        Self {
            notifications,
            guard,
        }
    }
}

#[async_trait]
impl StepAction<ApplicationSagaContext> for SendNotifications {
    async fn execute(&self, ctx: &mut ApplicationSagaContext) -> Result<StepSignal> {
        let applicant_id = ctx.loaded(STEP_SEND_NOTIFICATIONS)?.applicant_id;
        let notifications = self.notifications.as_ref();

        let signal = self
            .guard
            .guard(
                NOTIFICATION_SERVICE,
                move || async move {
                    notifications
                        .send(NotificationEvent::application_submitted(applicant_id))
                        .await
                        .map(|()| StepSignal::Done)
                },
                |cause| async move { StepSignal::Degraded(cause.to_string()) },
            )
            .await;
        Ok(signal)
    }
}

/// Removes the application. Safe to run against an already deleted one.
pub struct DeleteApplication {
    repository: Arc<dyn ApplicationRepository>,
}

impl DeleteApplication {
    pub fn new(repository: Arc<dyn ApplicationRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Compensation for DeleteApplication {
    async fn compensate(&self, aggregate_id: &AggregateId) -> Result<()> {
        let existed = self
            .repository
            .delete(aggregate_id)
            .await
            .map_err(|err| SagaError::CompensationFailed(err.to_string()))?;
        tracing::info!(%aggregate_id, existed, "application deleted");
        Ok(())
    }
}
