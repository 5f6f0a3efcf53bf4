use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    AggregateId, Result, SagaId, SagaRun, SagaStatus, SagaStoreError,
    store::{SagaRunStore, ensure_transition},
};

/// In-memory saga run store.
///
/// Provides the same interface as the PostgreSQL implementation and keeps
/// runs in creation order.
#[derive(Clone, Default)]
pub struct InMemorySagaRunStore {
    runs: Arc<RwLock<Vec<SagaRun>>>,
    fail_on_update: Arc<AtomicBool>,
}

impl InMemorySagaRunStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of runs stored.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Makes every subsequent `update` fail as if the backend were down.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.fail_on_update.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SagaRunStore for InMemorySagaRunStore {
    async fn create(&self, aggregate_id: AggregateId, saga_type: &str) -> Result<SagaRun> {
        let run = SagaRun::new(aggregate_id, saga_type);
        self.runs.write().await.push(run.clone());
        tracing::debug!(saga_id = %run.id(), aggregate_id = %run.aggregate_id(), "saga run created");
        Ok(run)
    }

    async fn update(&self, run: &mut SagaRun) -> Result<()> {
        if self.fail_on_update.load(Ordering::SeqCst) {
            return Err(SagaStoreError::Unavailable(
                "in-memory store configured to fail".to_string(),
            ));
        }

        let mut runs = self.runs.write().await;
        let stored = runs
            .iter_mut()
            .find(|r| r.id() == run.id())
            .ok_or(SagaStoreError::RunNotFound(run.id()))?;

        ensure_transition(stored.status(), run)?;

        run.set_updated_at(Utc::now());
        *stored = run.clone();
        Ok(())
    }

    async fn find_by_aggregate_id(&self, aggregate_id: &AggregateId) -> Result<Option<SagaRun>> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .rev()
            .find(|r| r.aggregate_id() == aggregate_id)
            .cloned())
    }

    async fn find_all_by_aggregate_id(&self, aggregate_id: &AggregateId) -> Result<Vec<SagaRun>> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|r| r.aggregate_id() == aggregate_id)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, saga_id: SagaId) -> Result<Option<SagaRun>> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|r| r.id() == saga_id).cloned())
    }

    async fn find_by_status(&self, status: SagaStatus) -> Result<Vec<SagaRun>> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|r| r.status() == status)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_persists_started_run() {
        let store = InMemorySagaRunStore::new();
        let run = store
            .create(AggregateId::from("A1"), "ApplicationSubmitted")
            .await
            .unwrap();

        assert_eq!(run.status(), SagaStatus::Started);
        assert_eq!(store.run_count().await, 1);

        let found = store.find_by_id(run.id()).await.unwrap().unwrap();
        assert_eq!(found, run);
    }

    #[tokio::test]
    async fn update_stamps_updated_at() {
        let store = InMemorySagaRunStore::new();
        let mut run = store.create(AggregateId::from("A1"), "T").await.unwrap();
        let created = run.updated_at();

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        run.enter_step("VALIDATE_APPLICATION").unwrap();
        store.update(&mut run).await.unwrap();

        assert!(run.updated_at() > created);
        let found = store.find_by_id(run.id()).await.unwrap().unwrap();
        assert_eq!(found.current_step(), "VALIDATE_APPLICATION");
        assert_eq!(found.updated_at(), run.updated_at());
        assert_eq!(found.created_at(), created);
    }

    #[tokio::test]
    async fn update_unknown_run_fails() {
        let store = InMemorySagaRunStore::new();
        let mut run = SagaRun::new(AggregateId::from("A1"), "T");

        let result = store.update(&mut run).await;
        assert!(matches!(result, Err(SagaStoreError::RunNotFound(_))));
    }

    #[tokio::test]
    async fn update_rejects_leaving_terminal_status() {
        let store = InMemorySagaRunStore::new();
        let mut run = store.create(AggregateId::from("A1"), "T").await.unwrap();
        let stale = run.clone();

        run.mark_completed().unwrap();
        store.update(&mut run).await.unwrap();

        // A stale copy still in STARTED tries to push the run onto the failure path.
        let mut stale = stale;
        stale.begin_compensation("late failure").unwrap();
        let result = store.update(&mut stale).await;
        assert!(matches!(
            result,
            Err(SagaStoreError::InvalidTransition {
                from: SagaStatus::Completed,
                to: SagaStatus::Compensating,
                ..
            })
        ));

        let found = store.find_by_id(run.id()).await.unwrap().unwrap();
        assert_eq!(found.status(), SagaStatus::Completed);
    }

    #[tokio::test]
    async fn find_by_aggregate_id_returns_latest_run() {
        let store = InMemorySagaRunStore::new();
        let aggregate = AggregateId::from("A1");
        let first = store.create(aggregate.clone(), "T").await.unwrap();
        let second = store.create(aggregate.clone(), "T").await.unwrap();
        store.create(AggregateId::from("B1"), "T").await.unwrap();

        let latest = store.find_by_aggregate_id(&aggregate).await.unwrap().unwrap();
        assert_eq!(latest.id(), second.id());

        let all = store.find_all_by_aggregate_id(&aggregate).await.unwrap();
        assert_eq!(
            all.iter().map(SagaRun::id).collect::<Vec<_>>(),
            vec![first.id(), second.id()]
        );
    }

    #[tokio::test]
    async fn find_by_aggregate_id_missing() {
        let store = InMemorySagaRunStore::new();
        let found = store
            .find_by_aggregate_id(&AggregateId::from("nope"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn find_by_status_filters() {
        let store = InMemorySagaRunStore::new();
        let mut done = store.create(AggregateId::from("A1"), "T").await.unwrap();
        done.mark_completed().unwrap();
        store.update(&mut done).await.unwrap();
        let pending = store.create(AggregateId::from("A2"), "T").await.unwrap();

        let started = store.find_by_status(SagaStatus::Started).await.unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id(), pending.id());

        let completed = store.find_by_status(SagaStatus::Completed).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id(), done.id());
    }

    #[tokio::test]
    async fn fail_on_update_leaves_record_untouched() {
        let store = InMemorySagaRunStore::new();
        let mut run = store.create(AggregateId::from("A1"), "T").await.unwrap();
        store.set_fail_on_update(true);

        run.enter_step("VALIDATE_APPLICATION").unwrap();
        assert!(matches!(
            store.update(&mut run).await,
            Err(SagaStoreError::Unavailable(_))
        ));

        let found = store.find_by_id(run.id()).await.unwrap().unwrap();
        assert_eq!(found.current_step(), crate::INITIAL_STEP);
    }
}
