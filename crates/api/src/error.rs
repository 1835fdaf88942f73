use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use skyguard_core::error::CoreError;
use skyguard_db::catalog::CatalogError;
use skyguard_pipeline::PipelineError;
use skyguard_store::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain error taxonomy and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses
/// of the shape `{ "error": ..., "code": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `skyguard_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A result-store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A durable catalog error.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A pipeline error surfaced synchronously (upload probing, the
    /// synchronous analysis endpoints).
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::SourceUnreadable(msg) => (
                    StatusCode::BAD_REQUEST,
                    "SOURCE_UNREADABLE",
                    msg.clone(),
                ),
                CoreError::Inference(msg) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFERENCE_FAILURE",
                    msg.clone(),
                ),
                CoreError::Store(msg) => {
                    tracing::error!(error = %msg, "Result store error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORE_UNAVAILABLE",
                        "Result store unavailable".to_string(),
                    )
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Result store ---
            AppError::Store(store) => match store {
                StoreError::JobNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("No results for job {id}"),
                ),
                StoreError::Terminal { job_id, status } => (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Job {job_id} is already {status}"),
                ),
            },

            // --- Durable catalog ---
            AppError::Catalog(catalog) => match catalog {
                CatalogError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Video {id} not found"),
                ),
                CatalogError::Database(err) => classify_sqlx_error(err),
            },

            // --- Pipeline ---
            AppError::Pipeline(pipeline) => match pipeline {
                PipelineError::SourceUnreadable(msg) => (
                    StatusCode::BAD_REQUEST,
                    "SOURCE_UNREADABLE",
                    msg.clone(),
                ),
                PipelineError::Inference(msg) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFERENCE_FAILURE",
                    msg.clone(),
                ),
                other => {
                    tracing::error!(error = %other, "Pipeline error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
