//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;
use saga_store::SagaStoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga or application error.
    Saga(SagaError),
    /// Saga run store error.
    Store(SagaStoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match err {
        SagaError::DuplicateApplication { .. } => (StatusCode::CONFLICT, err.to_string()),
        SagaError::ApplicationNotFound(ref id) => (
            StatusCode::NOT_FOUND,
            format!("Application {id} not found"),
        ),
        SagaError::Store(store_err) => store_error_to_response(store_err),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn store_error_to_response(err: SagaStoreError) -> (StatusCode, String) {
    match &err {
        SagaStoreError::RunNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaStoreError::InvalidStatus(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<SagaStoreError> for ApiError {
    fn from(err: SagaStoreError) -> Self {
        ApiError::Store(err)
    }
}
