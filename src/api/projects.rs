//! Project endpoints

use axum::extract::{Query, State};
use axum::Json;
use maestro_core::Project;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{default_user, ApiResponse, ApiResult};
use crate::server::AppState;

/// Query parameters for GET /api/projects
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProjectsQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
}

/// Request body for POST /api/projects
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    #[serde(default = "default_user")]
    pub user_id: String,
    pub name: String,
}

/// List a user's projects
#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "projects",
    params(ListProjectsQuery),
    responses(
        (status = 200, description = "Projects", body = Vec<Project>)
    )
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Vec<Project>> {
    let projects = state.orchestrator.list_projects(&query.user_id).await?;
    Ok(Json(ApiResponse::success(projects)))
}

/// Create a project (idempotent on name)
#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 200, description = "Project", body = Project)
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    let project = state
        .orchestrator
        .resolve_project(&request.user_id, Some(&request.name))
        .await?;
    Ok(Json(ApiResponse::success(project)))
}
