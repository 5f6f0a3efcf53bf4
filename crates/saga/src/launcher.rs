//! Fire-and-forget submission of saga runs onto the tokio runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::AggregateId;
use saga_store::SagaRunStore;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};

use crate::definition::SagaContext;
use crate::orchestrator::SagaOrchestrator;

/// Default bound on concurrently executing runs.
pub const DEFAULT_MAX_CONCURRENT: usize = 64;

/// Acknowledgement that a run was scheduled. Says nothing about its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the submitted task ends, even if
/// it unwinds.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("saga_runs_in_flight").increment(1.0);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics::gauge!("saga_runs_in_flight").decrement(1.0);
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Spawns saga runs and tracks them until they finish.
///
/// `submit` never waits: the spawned task queues on a semaphore sized to
/// the concurrency limit. Failures and panics of a run are logged and
/// never reach the submitter.
pub struct SagaLauncher<S, C>
where
    S: SagaRunStore + 'static,
    C: SagaContext,
{
    orchestrator: Arc<SagaOrchestrator<S, C>>,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
}

impl<S, C> SagaLauncher<S, C>
where
    S: SagaRunStore + 'static,
    C: SagaContext,
{
    pub fn new(orchestrator: SagaOrchestrator<S, C>, max_concurrent: usize) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn orchestrator(&self) -> &SagaOrchestrator<S, C> {
        &self.orchestrator
    }

    /// Number of submitted runs that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Schedules a run for `aggregate_id` and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, aggregate_id: AggregateId) -> Accepted {
        let guard = InFlightGuard::enter(&self.in_flight);
        let orchestrator = Arc::clone(&self.orchestrator);
        let permits = Arc::clone(&self.permits);
        let target = aggregate_id.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(aggregate_id = %target, "launcher closed, saga not started");
                return;
            };

            let run = tokio::spawn({
                let target = target.clone();
                async move { orchestrator.run(target).await }
            });

            match run.await {
                Ok(Ok(run)) => {
                    tracing::debug!(
                        saga_id = %run.id(),
                        aggregate_id = %target,
                        status = %run.status(),
                        "saga run finished"
                    );
                }
                Ok(Err(err)) => {
                    tracing::error!(aggregate_id = %target, error = %err, "saga run aborted");
                }
                Err(err) => {
                    tracing::error!(aggregate_id = %target, error = %err, "saga run panicked");
                }
            }
        });

        tracing::debug!(%aggregate_id, "saga submitted");
        Accepted { aggregate_id }
    }

    /// Waits until every submitted run has finished.
    pub async fn drain(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl<S, C> Clone for SagaLauncher<S, C>
where
    S: SagaRunStore + 'static,
    C: SagaContext,
{
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            permits: Arc::clone(&self.permits),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use async_trait::async_trait;
    use saga_store::{InMemorySagaRunStore, SagaStatus};

    use super::*;
    use crate::definition::{Compensation, SagaDefinition};
    use crate::error::Result;
    use crate::step::{StepAction, StepSignal};

    struct Ctx;

    impl SagaContext for Ctx {
        fn for_aggregate(_: &AggregateId) -> Self {
            Ctx
        }
    }

    /// Sleeps, and tracks the highest number of concurrent executions.
    struct Slow {
        running: Arc<AtomicU32>,
        peak: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StepAction<Ctx> for Slow {
        async fn execute(&self, _: &mut Ctx) -> Result<StepSignal> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(StepSignal::Done)
        }
    }

    struct Panics;

    #[async_trait]
    impl StepAction<Ctx> for Panics {
        async fn execute(&self, _: &mut Ctx) -> Result<StepSignal> {
            panic!("step exploded");
        }
    }

    struct Noop;

    #[async_trait]
    impl Compensation for Noop {
        async fn compensate(&self, _: &AggregateId) -> Result<()> {
            Ok(())
        }
    }

    fn slow_launcher(
        max_concurrent: usize,
    ) -> (SagaLauncher<InMemorySagaRunStore, Ctx>, Arc<AtomicU32>) {
        let peak = Arc::new(AtomicU32::new(0));
        let definition = SagaDefinition::builder("Test", Noop)
            .critical(
                "SLOW",
                Slow {
                    running: Arc::new(AtomicU32::new(0)),
                    peak: Arc::clone(&peak),
                },
            )
            .build()
            .unwrap();
        let orchestrator = SagaOrchestrator::new(InMemorySagaRunStore::new(), definition);
        (SagaLauncher::new(orchestrator, max_concurrent), peak)
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_returns_before_run_finishes() {
        let (launcher, _) = slow_launcher(4);

        let accepted = launcher.submit("agg-1".into());
        assert_eq!(accepted.aggregate_id.as_str(), "agg-1");
        assert_eq!(launcher.in_flight(), 1);

        launcher.drain().await;
        assert_eq!(launcher.in_flight(), 0);

        let run = launcher
            .orchestrator()
            .store()
            .find_by_aggregate_id(&"agg-1".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.status(), SagaStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let (launcher, peak) = slow_launcher(2);

        for i in 0..6 {
            launcher.submit(format!("agg-{i}").into());
        }
        launcher.drain().await;

        assert_eq!(launcher.orchestrator().store().run_count().await, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_drain_without_submissions_returns() {
        let (launcher, _) = slow_launcher(1);
        launcher.drain().await;
    }

    #[tokio::test]
    async fn test_panicking_run_is_contained() {
        let definition = SagaDefinition::builder("Test", Noop)
            .critical("BOOM", Panics)
            .build()
            .unwrap();
        let launcher = SagaLauncher::new(
            SagaOrchestrator::new(InMemorySagaRunStore::new(), definition),
            1,
        );

        launcher.submit("agg-1".into());
        launcher.drain().await;
        assert_eq!(launcher.in_flight(), 0);

        // The permit was released, so the next run still gets scheduled.
        launcher.submit("agg-2".into());
        launcher.drain().await;
        assert_eq!(launcher.orchestrator().store().run_count().await, 2);
    }
}
