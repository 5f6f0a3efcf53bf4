//! API server entry point.

use std::time::Duration;

use api::Seed;
use api::config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::{InMemorySagaRunStore, PostgresSagaRunStore, SagaRunStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How long shutdown waits for in-flight sagas.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Registers help text for the metrics emitted by the saga engine.
fn describe_metrics() {
    metrics::describe_counter!("saga_runs_started_total", "Saga runs created");
    metrics::describe_counter!("saga_runs_completed_total", "Saga runs that completed");
    metrics::describe_counter!(
        "saga_runs_compensated_total",
        "Saga runs undone by their compensation"
    );
    metrics::describe_counter!(
        "saga_runs_failed_total",
        "Saga runs whose compensation failed"
    );
    metrics::describe_counter!("saga_step_outcomes_total", "Step outcomes by step and outcome");
    metrics::describe_histogram!(
        "saga_duration_seconds",
        metrics::Unit::Seconds,
        "Wall time of a saga run"
    );
    metrics::describe_gauge!("saga_runs_in_flight", "Submitted saga runs not yet finished");
    metrics::describe_counter!("applications_submitted_total", "Applications accepted");
    metrics::describe_counter!(
        "remote_guard_calls_total",
        "Guarded remote calls by dependency and outcome"
    );
    metrics::describe_counter!(
        "circuit_breaker_transitions_total",
        "Circuit breaker state changes by dependency and target state"
    );
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Serves the API on top of `saga_store` until shutdown, then drains sagas.
async fn serve<S: SagaRunStore + 'static>(
    saga_store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let (state, services) =
        api::create_default_state(saga_store, config).expect("invalid saga definition");
    match &config.seed_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).expect("failed to read seed file");
            let seed = Seed::from_json(&raw).expect("invalid seed file");
            tracing::info!(
                %path,
                users = seed.users.len(),
                jobs = seed.jobs.len(),
                "seeding user directory and job catalog"
            );
            services.seed(seed);
        }
        None => {
            tracing::warn!("SEED_PATH not set, user directory and job catalog are empty");
        }
    }
    let app = api::create_app(state.clone(), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let launcher = state.applications.launcher();
    tracing::info!(in_flight = launcher.in_flight(), "draining sagas");
    if tokio::time::timeout(DRAIN_TIMEOUT, launcher.drain())
        .await
        .is_err()
    {
        tracing::warn!(
            in_flight = launcher.in_flight(),
            "sagas still running at shutdown"
        );
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    describe_metrics();

    // 3. Pick the saga run store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresSagaRunStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL saga run store");
            serve(store, &config, metrics_handle).await;
        }
        None => {
            tracing::info!("using in-memory saga run store");
            serve(InMemorySagaRunStore::new(), &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
