//! Application submission and saga status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::AggregateId;
use resilience::BreakerRegistry;
use saga::{ApplicationService, ApplicationStatus, NewApplication};
use saga_store::SagaRunStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::sagas::SagaRunResponse;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SagaRunStore + 'static> {
    pub applications: ApplicationService<S>,
    pub breakers: Arc<BreakerRegistry>,
}

impl<S: SagaRunStore + 'static> AppState<S> {
    /// The store every saga run is recorded in.
    pub fn store(&self) -> &S {
        self.applications.launcher().orchestrator().store()
    }
}

#[derive(Serialize)]
pub struct ApplicationAcceptedResponse {
    pub application_id: String,
    pub status: ApplicationStatus,
}

/// POST /applications: store an application and start its saga.
///
/// Answers 202 as soon as the saga is scheduled; its progress is visible
/// through `GET /applications/{id}/saga`.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: SagaRunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<NewApplication>,
) -> Result<(StatusCode, Json<ApplicationAcceptedResponse>), ApiError> {
    if req.applicant_email.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "applicant_email must not be empty".to_string(),
        ));
    }

    let (application, accepted) = state.applications.submit(req).await?;

    let response = ApplicationAcceptedResponse {
        application_id: accepted.aggregate_id.to_string(),
        status: application.status,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /applications/{id}/saga: latest saga run for an application.
#[tracing::instrument(skip(state))]
pub async fn saga_status<S: SagaRunStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaRunResponse>, ApiError> {
    let run = state
        .store()
        .find_by_aggregate_id(&AggregateId::from(id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No saga found for application {id}")))?;

    Ok(Json(SagaRunResponse::from(&run)))
}
