//! HTTP API server with observability for the application saga engine.
//!
//! Accepts job applications, runs their saga in the background and
//! exposes saga runs and circuit breakers for inspection, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use resilience::{BreakerRegistry, RemoteCallGuard};
use saga::{
    ApplicationSagaDeps, ApplicationService, InMemoryApplicationRepository, InMemoryJobCatalog,
    InMemoryNotificationDispatcher, InMemoryUserDirectory, JobRecord, SagaLauncher,
    SagaOrchestrator, UserRecord, application_submitted_saga,
};
use saga_store::SagaRunStore;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::applications::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaRunStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/applications", post(routes::applications::create::<S>))
        .route(
            "/applications/{id}/saga",
            get(routes::applications::saga_status::<S>),
        )
        .route("/sagas", get(routes::sagas::list::<S>))
        .route("/breakers", get(routes::breakers::list::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-memory collaborators of the application saga, shared with the state
/// so callers can seed them or inject failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServices {
    pub repository: InMemoryApplicationRepository,
    pub users: InMemoryUserDirectory,
    pub jobs: InMemoryJobCatalog,
    pub notifications: InMemoryNotificationDispatcher,
}

impl InMemoryServices {
    /// Loads users and jobs into the in-memory directories.
    pub fn seed(&self, seed: Seed) {
        for user in seed.users {
            self.users.insert(user);
        }
        for job in seed.jobs {
            self.jobs.insert(job);
        }
    }
}

/// Users and jobs known to the in-memory user directory and job catalog.
///
/// Without a seed both start empty and every validation degrades to
/// "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

impl Seed {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Creates the application state around `saga_store` with in-memory
/// services, one breaker registry and one launcher.
pub fn create_default_state<S: SagaRunStore + 'static>(
    saga_store: S,
    config: &Config,
) -> saga::Result<(Arc<AppState<S>>, InMemoryServices)> {
    let services = InMemoryServices::default();
    let breakers = Arc::new(BreakerRegistry::new(config.breaker_config()));
    let repository = Arc::new(services.repository.clone());

    let saga = application_submitted_saga(ApplicationSagaDeps {
        repository: repository.clone(),
        users: Arc::new(services.users.clone()),
        jobs: Arc::new(services.jobs.clone()),
        notifications: Arc::new(services.notifications.clone()),
        guard: RemoteCallGuard::new(Arc::clone(&breakers), config.guard_config()),
    })?;
    let launcher = SagaLauncher::new(
        SagaOrchestrator::new(saga_store, saga),
        config.max_concurrent_sagas,
    );

    let state = Arc::new(AppState {
        applications: ApplicationService::new(repository, launcher),
        breakers,
    });

    Ok((state, services))
}
