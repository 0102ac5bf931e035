//! Task endpoint

use axum::extract::{Path, State};
use axum::Json;
use maestro_core::Task;
use uuid::Uuid;

use super::{ApiResponse, ApiResult};
use crate::server::AppState;

/// Fetch a full task including per-step results
#[utoipa::path(
    get,
    path = "/api/task/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task with step results", body = Task),
        (status = 404, description = "Task not found")
    )
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Task> {
    let task = state.orchestrator.get_task(id).await?;
    Ok(Json(ApiResponse::success(task)))
}
