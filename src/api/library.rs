//! Library endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use maestro_core::LibraryEntry;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{default_user, ApiResponse, ApiResult};
use crate::server::AppState;

/// Query parameters for GET /api/library
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListLibraryQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
}

/// Request body for POST /api/library
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEntryRequest {
    #[serde(default = "default_user")]
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub project_id: Option<String>,
}

/// List a user's library entries
#[utoipa::path(
    get,
    path = "/api/library",
    tag = "library",
    params(ListLibraryQuery),
    responses(
        (status = 200, description = "Library entries", body = Vec<LibraryEntry>)
    )
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListLibraryQuery>,
) -> ApiResult<Vec<LibraryEntry>> {
    let entries = state.orchestrator.list_library(&query.user_id).await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// Add a document to the library
#[utoipa::path(
    post,
    path = "/api/library",
    tag = "library",
    request_body = CreateEntryRequest,
    responses(
        (status = 200, description = "Created entry", body = LibraryEntry)
    )
)]
pub async fn create_entry(
    State(state): State<AppState>,
    Json(request): Json<CreateEntryRequest>,
) -> ApiResult<LibraryEntry> {
    if request.title.trim().is_empty() {
        return Err(maestro_core::Error::InvalidInput(
            "title must not be empty".to_string(),
        )
        .into());
    }
    let mut entry = LibraryEntry::new(&request.user_id, &request.title, &request.content);
    if let Some(project_id) = request.project_id {
        entry = entry.with_project(project_id);
    }
    state.orchestrator.add_library_entry(&entry).await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// Fetch a library entry
#[utoipa::path(
    get,
    path = "/api/library/{id}",
    tag = "library",
    params(("id" = String, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Library entry", body = LibraryEntry),
        (status = 404, description = "Unknown entry")
    )
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<LibraryEntry> {
    let entry = state.orchestrator.get_library_entry(&id).await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// Remove a library entry
#[utoipa::path(
    delete,
    path = "/api/library/{id}",
    tag = "library",
    params(("id" = String, Path, description = "Entry id")),
    responses(
        (status = 200, description = "Entry removed"),
        (status = 404, description = "Unknown entry")
    )
)]
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.orchestrator.delete_library_entry(&id).await?;
    Ok(Json(ApiResponse::success(())))
}
