//! Run endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use maestro_core::{Run, TerminationRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{default_user, ApiResponse, ApiResult};
use crate::server::AppState;

/// Request body for POST /api/ask and POST /api/runs
#[derive(Debug, Deserialize, ToSchema)]
pub struct AskRequest {
    #[serde(default = "default_user")]
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub project: Option<String>,
}

/// Response for run creation
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    pub run_id: Uuid,
    pub task_id: Uuid,
    pub status: String,
}

/// Query parameters for GET /api/runs
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListRunsQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub status: Option<String>,
}

fn default_limit() -> i64 {
    50
}

/// Run summary for listings
#[derive(Debug, Serialize, ToSchema)]
pub struct RunSummary {
    pub id: Uuid,
    pub task_id: Uuid,
    pub status: String,
    pub termination_reason: Option<String>,
    pub total_tokens: u64,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            task_id: run.task_id,
            status: run.status.as_str().to_string(),
            termination_reason: run.termination_reason.map(|r| r.as_str().to_string()),
            total_tokens: run.total_tokens,
            created_at: run.created_at,
            terminated_at: run.terminated_at,
        }
    }
}

/// Full run view with its termination record, if any
#[derive(Debug, Serialize, ToSchema)]
pub struct RunDetail {
    pub run: Run,
    pub termination: Option<TerminationRecord>,
}

/// Create a run and start executing it in the background
#[utoipa::path(
    post,
    path = "/api/ask",
    tag = "runs",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Run created and started", body = AskResponse),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    let run = state
        .orchestrator
        .create_run(&request.user_id, &request.query, request.project.as_deref())
        .await?;

    let orchestrator = state.orchestrator.clone();
    let run_id = run.id;
    tokio::spawn(async move {
        if let Err(e) = orchestrator.execute_run(run_id).await {
            warn!(%run_id, error = %e, "Background run execution failed");
        }
    });

    Ok(Json(ApiResponse::success(AskResponse {
        run_id: run.id,
        task_id: run.task_id,
        status: run.status.as_str().to_string(),
    })))
}

/// List a user's runs, newest first
#[utoipa::path(
    get,
    path = "/api/runs",
    tag = "runs",
    params(ListRunsQuery),
    responses(
        (status = 200, description = "List of runs", body = Vec<RunSummary>)
    )
)]
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Vec<RunSummary>> {
    let limit = query.limit.clamp(1, 200);
    let runs = state.orchestrator.list_runs(&query.user_id, limit).await?;

    let summaries: Vec<RunSummary> = runs
        .into_iter()
        .filter(|r| {
            query
                .status
                .as_ref()
                .is_none_or(|s| r.status.as_str() == s)
        })
        .map(RunSummary::from)
        .collect();

    Ok(Json(ApiResponse::success(summaries)))
}

/// Fetch a run with its termination record
#[utoipa::path(
    get,
    path = "/api/runs/{id}",
    tag = "runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run details", body = RunDetail),
        (status = 404, description = "Run not found")
    )
)]
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RunDetail> {
    let run = state.orchestrator.get_run(id).await?;
    let termination = state.orchestrator.get_termination(id).await?;
    Ok(Json(ApiResponse::success(RunDetail { run, termination })))
}

/// List artifact ids produced by a run's steps
#[utoipa::path(
    get,
    path = "/api/runs/{id}/artifacts",
    tag = "runs",
    params(("id" = Uuid, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Artifact ids", body = Vec<String>),
        (status = 404, description = "Run not found")
    )
)]
pub async fn run_artifacts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<String>> {
    let artifacts = state.orchestrator.run_artifacts(id).await?;
    Ok(Json(ApiResponse::success(artifacts)))
}
