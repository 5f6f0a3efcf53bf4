//! Saga run queries.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use saga_store::{SagaRun, SagaRunStore, SagaStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::applications::AppState;

#[derive(Debug, Deserialize)]
pub struct SagaQuery {
    pub status: String,
}

#[derive(Serialize)]
pub struct SagaRunResponse {
    pub saga_id: String,
    pub aggregate_id: String,
    pub saga_type: String,
    pub status: SagaStatus,
    pub current_step: String,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SagaRun> for SagaRunResponse {
    fn from(run: &SagaRun) -> Self {
        Self {
            saga_id: run.id().to_string(),
            aggregate_id: run.aggregate_id().to_string(),
            saga_type: run.saga_type().to_string(),
            status: run.status(),
            current_step: run.current_step().to_string(),
            error_detail: run.error_detail().map(str::to_string),
            created_at: run.created_at(),
            updated_at: run.updated_at(),
        }
    }
}

/// GET /sagas?status=IN_PROGRESS: runs currently in the given status.
///
/// Runs left in `IN_PROGRESS` or `COMPENSATING` after a crash are only
/// discoverable this way.
#[tracing::instrument(skip(state))]
pub async fn list<S: SagaRunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<SagaQuery>,
) -> Result<Json<Vec<SagaRunResponse>>, ApiError> {
    let status: SagaStatus = query.status.parse()?;
    let runs = state.store().find_by_status(status).await?;
    Ok(Json(runs.iter().map(SagaRunResponse::from).collect()))
}
