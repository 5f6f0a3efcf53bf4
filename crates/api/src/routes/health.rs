//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use resilience::CircuitState;
use saga_store::SagaRunStore;
use serde::Serialize;

use crate::routes::applications::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub in_flight_sagas: usize,
    pub open_circuits: Vec<String>,
}

/// GET /health: liveness plus sagas in flight and open circuits.
///
/// Open circuits degrade sagas but never fail them, so the status stays
/// `ok`.
pub async fn check<S: SagaRunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let open_circuits = state
        .breakers
        .snapshot()
        .into_iter()
        .filter(|b| b.state != CircuitState::Closed)
        .map(|b| b.name)
        .collect();

    Json(HealthResponse {
        status: "ok",
        in_flight_sagas: state.applications.launcher().in_flight(),
        open_circuits,
    })
}
