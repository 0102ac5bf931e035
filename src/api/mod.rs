//! REST API
//!
//! All endpoints return the `ApiResponse` envelope. Orchestrator errors map
//! to HTTP statuses here; termination details are user-visible, internal
//! traces are not.

pub mod approvals;
pub mod budget;
pub mod health;
pub mod library;
pub mod projects;
pub mod runs;
pub mod tasks;

#[cfg(test)]
mod tests;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::server::AppState;

/// API response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<T> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Orchestrator error with its HTTP mapping
pub struct ApiError(maestro_core::Error);

impl From<maestro_core::Error> for ApiError {
    fn from(err: maestro_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use maestro_core::Error;
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

/// Handler result carrying the response envelope
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Default identity when the caller supplies none
pub(crate) fn default_user() -> String {
    "default".to_string()
}

/// Assemble the REST routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/ask", post(runs::ask))
        .route("/api/runs", post(runs::ask).get(runs::list_runs))
        .route("/api/runs/:id", get(runs::get_run))
        .route("/api/runs/:id/artifacts", get(runs::run_artifacts))
        .route("/api/task/:id", get(tasks::get_task))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/library",
            get(library::list_entries).post(library::create_entry),
        )
        .route(
            "/api/library/:id",
            get(library::get_entry).delete(library::delete_entry),
        )
        .route("/api/approvals/pending", get(approvals::pending))
        .route("/api/approvals/:id/respond", post(approvals::respond))
        .route("/api/budget", get(budget::budget))
}
