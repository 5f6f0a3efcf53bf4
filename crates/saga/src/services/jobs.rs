//! Job catalog client trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use resilience::RemoteCallError;
use serde::{Deserialize, Serialize};

/// A job posting as reported by the job service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub title: String,
}

/// Lookup of job postings held by the job service.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    async fn fetch_job(&self, job_id: i64) -> Result<JobRecord, RemoteCallError>;
}

#[derive(Debug, Default)]
struct InMemoryJobState {
    jobs: HashMap<i64, JobRecord>,
    unavailable: bool,
    calls: u32,
}

/// In-memory job catalog with failure injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobCatalog {
    state: Arc<RwLock<InMemoryJobState>>,
}

impl InMemoryJobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: JobRecord) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .jobs
            .insert(job.id, job);
    }

    /// Makes every subsequent call fail as if the service were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    pub fn call_count(&self) -> u32 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
    }
}

#[async_trait]
impl JobCatalog for InMemoryJobCatalog {
    async fn fetch_job(&self, job_id: i64) -> Result<JobRecord, RemoteCallError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.calls += 1;

        if state.unavailable {
            return Err(RemoteCallError::Unavailable(
                "job-service connection refused".to_string(),
            ));
        }

        state
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| RemoteCallError::NotFound(format!("job {job_id}")))
    }
}
