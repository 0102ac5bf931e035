//! Approval endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use maestro_core::Approval;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{default_user, ApiResponse, ApiResult};
use crate::server::AppState;

/// Query parameters for GET /api/approvals/pending
#[derive(Debug, Deserialize, IntoParams)]
pub struct PendingQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
}

/// Request body for POST /api/approvals/{id}/respond
#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondRequest {
    pub approved: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// List a user's pending approvals, oldest first
#[utoipa::path(
    get,
    path = "/api/approvals/pending",
    tag = "approvals",
    params(PendingQuery),
    responses(
        (status = 200, description = "Pending approvals", body = Vec<Approval>)
    )
)]
pub async fn pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Vec<Approval>> {
    let approvals = state.orchestrator.pending_approvals(&query.user_id).await?;
    Ok(Json(ApiResponse::success(approvals)))
}

/// Apply a user's decision to a pending approval.
///
/// Approving resumes the suspended run in the background; rejecting
/// terminates it.
#[utoipa::path(
    post,
    path = "/api/approvals/{id}/respond",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Approval ID")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Resolved approval", body = Approval),
        (status = 400, description = "Approval already resolved"),
        (status = 404, description = "Approval not found")
    )
)]
pub async fn respond(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RespondRequest>,
) -> ApiResult<Approval> {
    let approval = state
        .orchestrator
        .respond_to_approval(id, request.approved, request.notes)
        .await?;
    Ok(Json(ApiResponse::success(approval)))
}
