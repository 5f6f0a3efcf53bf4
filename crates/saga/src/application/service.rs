//! Caller side of the saga: persists an application, then hands it off.

use std::sync::Arc;

use saga_store::SagaRunStore;

use super::model::{Application, NewApplication};
use super::repository::ApplicationRepository;
use super::steps::ApplicationSagaContext;
use crate::error::{Result, SagaError};
use crate::launcher::{Accepted, SagaLauncher};

/// Accepts new applications and starts their saga asynchronously.
pub struct ApplicationService<S>
where
    S: SagaRunStore + 'static,
{
    repository: Arc<dyn ApplicationRepository>,
    launcher: SagaLauncher<S, ApplicationSagaContext>,
}

impl<S> ApplicationService<S>
where
    S: SagaRunStore + 'static,
{
    pub fn new(
        repository: Arc<dyn ApplicationRepository>,
        launcher: SagaLauncher<S, ApplicationSagaContext>,
    ) -> Self {
        Self {
            repository,
            launcher,
        }
    }

    pub fn repository(&self) -> &Arc<dyn ApplicationRepository> {
        &self.repository
    }

    pub fn launcher(&self) -> &SagaLauncher<S, ApplicationSagaContext> {
        &self.launcher
    }

    /// Stores the application and submits its saga.
    ///
    /// Returns as soon as the saga is scheduled; its outcome is observable
    /// only through the saga run store.
    #[tracing::instrument(skip(self, new), fields(applicant_id = new.applicant_id, job_id = new.job_id))]
    pub async fn submit(&self, new: NewApplication) -> Result<(Application, Accepted)> {
        if self
            .repository
            .find_by_applicant_and_job(new.applicant_id, new.job_id)
            .await?
            .is_some()
        {
            tracing::info!("duplicate application rejected");
            return Err(SagaError::DuplicateApplication {
                applicant_id: new.applicant_id,
                job_id: new.job_id,
            });
        }

        let application = Application::submit(new);
        self.repository.insert(application.clone()).await?;
        metrics::counter!("applications_submitted_total").increment(1);
        tracing::info!(application_id = %application.id, "application created");

        let accepted = self.launcher.submit(application.id.clone());
        Ok((application, accepted))
    }
}
