//! Circuit breaker diagnostics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use resilience::BreakerSnapshot;
use saga_store::SagaRunStore;

use crate::routes::applications::AppState;

/// GET /breakers: state of every breaker created so far.
pub async fn list<S: SagaRunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshot())
}
