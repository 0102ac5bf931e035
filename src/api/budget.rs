//! Budget endpoint

use axum::extract::{Query, State};
use axum::Json;
use maestro_models::{BudgetStatus, UsageReport};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{default_user, ApiResponse, ApiResult};
use crate::server::AppState;

/// Query parameters for GET /api/budget
#[derive(Debug, Deserialize, IntoParams)]
pub struct BudgetQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
}

/// Budget position plus per-model breakdown
#[derive(Debug, Serialize, ToSchema)]
pub struct BudgetResponse {
    pub status: BudgetStatus,
    pub usage: UsageReport,
}

/// Current budget status and usage report for a user
#[utoipa::path(
    get,
    path = "/api/budget",
    tag = "budget",
    params(BudgetQuery),
    responses(
        (status = 200, description = "Budget status and usage", body = BudgetResponse)
    )
)]
pub async fn budget(
    State(state): State<AppState>,
    Query(query): Query<BudgetQuery>,
) -> ApiResult<BudgetResponse> {
    let status = state.orchestrator.budget_status(&query.user_id).await;
    let usage = state.orchestrator.usage_report(&query.user_id).await;
    Ok(Json(ApiResponse::success(BudgetResponse { status, usage })))
}
