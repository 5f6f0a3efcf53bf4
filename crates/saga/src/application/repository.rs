//! Application persistence trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use tokio::sync::RwLock;

use super::model::Application;
use crate::error::{Result, SagaError};

/// Storage of application aggregates.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Stores a new application.
    ///
    /// Fails with `DuplicateApplication` if the applicant already applied
    /// for the same job; the check and the write are atomic.
    async fn insert(&self, application: Application) -> Result<()>;

    async fn load(&self, id: &AggregateId) -> Result<Option<Application>>;

    async fn find_by_applicant_and_job(
        &self,
        applicant_id: i64,
        job_id: i64,
    ) -> Result<Option<Application>>;

    /// Removes an application. Returns whether it existed; deleting an
    /// absent application is not an error.
    async fn delete(&self, id: &AggregateId) -> Result<bool>;
}

/// In-memory application repository with failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApplicationRepository {
    applications: Arc<RwLock<HashMap<AggregateId, Application>>>,
    fail_on_load: Arc<AtomicBool>,
    fail_on_delete: Arc<AtomicBool>,
}

impl InMemoryApplicationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `load` fail.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.fail_on_load.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `delete` fail.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.fail_on_delete.store(fail, Ordering::SeqCst);
    }

    pub async fn count(&self) -> usize {
        self.applications.read().await.len()
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(&self, application: Application) -> Result<()> {
        let mut applications = self.applications.write().await;
        let duplicate = applications.values().any(|existing| {
            existing.applicant_id == application.applicant_id
                && existing.job_id == application.job_id
        });
        if duplicate {
            return Err(SagaError::DuplicateApplication {
                applicant_id: application.applicant_id,
                job_id: application.job_id,
            });
        }

        applications.insert(application.id.clone(), application);
        Ok(())
    }

    async fn load(&self, id: &AggregateId) -> Result<Option<Application>> {
        if self.fail_on_load.load(Ordering::SeqCst) {
            return Err(SagaError::Repository(
                "application store unavailable".to_string(),
            ));
        }
        Ok(self.applications.read().await.get(id).cloned())
    }

    async fn find_by_applicant_and_job(
        &self,
        applicant_id: i64,
        job_id: i64,
    ) -> Result<Option<Application>> {
        Ok(self
            .applications
            .read()
            .await
            .values()
            .find(|a| a.applicant_id == applicant_id && a.job_id == job_id)
            .cloned())
    }

    async fn delete(&self, id: &AggregateId) -> Result<bool> {
        if self.fail_on_delete.load(Ordering::SeqCst) {
            return Err(SagaError::Repository(
                "application store unavailable".to_string(),
            ));
        }
        Ok(self.applications.write().await.remove(id).is_some())
    }
}
