use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::server::config::AppConfig;
use crate::server::{build_router, AppState};

async fn app() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.database.path = dir
        .path()
        .join("maestro.db")
        .to_string_lossy()
        .into_owned();
    let state = AppState::from_config(&config).await.unwrap();
    (build_router(state), dir)
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_terminated(router: &Router, run_id: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = get(router, &format!("/api/runs/{run_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if body["data"]["run"]["status"] == "terminated" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("run {run_id} did not terminate");
}

#[tokio::test]
async fn test_health() {
    let (router, _dir) = app().await;
    let (status, body) = get(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "healthy");
}

#[tokio::test]
async fn test_ask_runs_to_completion() {
    let (router, _dir) = app().await;
    let (status, body) = post(
        &router,
        "/api/ask",
        serde_json::json!({"user_id": "u1", "query": "research the onboarding flow"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let run_id = body["data"]["run_id"].as_str().unwrap().to_string();
    let task_id = body["data"]["task_id"].as_str().unwrap().to_string();

    let run = wait_terminated(&router, &run_id).await;
    assert_eq!(run["data"]["run"]["termination_reason"], "completed");
    assert!(run["data"]["termination"].is_object());

    let (status, task) = get(&router, &format!("/api/task/{task_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["data"]["status"], "completed");
    assert_eq!(task["data"]["todo_list"][0]["agent_type"], "research");

    let (status, runs) = get(&router, "/api/runs?user_id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let (router, _dir) = app().await;
    let (status, body) = post(
        &router,
        "/api/ask",
        serde_json::json!({"query": "   "}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let (router, _dir) = app().await;
    let (status, body) = get(
        &router,
        "/api/runs/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_budget_starts_clean() {
    let (router, _dir) = app().await;
    let (status, body) = get(&router, "/api/budget?user_id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"]["daily_spent_usd"], 0.0);
    assert_eq!(body["data"]["status"]["can_use_cloud"], true);
}

#[tokio::test]
async fn test_projects_round_trip() {
    let (router, _dir) = app().await;
    let (status, created) = post(
        &router,
        "/api/projects",
        serde_json::json!({"user_id": "u1", "name": "pipelines"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // creating the same name again resolves to the same project
    let (_, again) = post(
        &router,
        "/api/projects",
        serde_json::json!({"user_id": "u1", "name": "pipelines"}),
    )
    .await;
    assert_eq!(created["data"]["id"], again["data"]["id"]);

    let (status, listed) = get(&router, "/api/projects?user_id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_library_round_trip() {
    let (router, _dir) = app().await;
    let (status, created) = post(
        &router,
        "/api/library",
        serde_json::json!({
            "user_id": "u1",
            "title": "style guide",
            "content": "prefer short sentences"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, fetched) = get(&router, &format!("/api/library/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["title"], "style guide");

    let (status, listed) = get(&router, "/api/library?user_id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let response = router
        .clone()
        .oneshot(
            Request::delete(format!("/api/library/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = get(&router, &format!("/api/library/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_library_entry_requires_title() {
    let (router, _dir) = app().await;
    let (status, body) = post(
        &router,
        "/api/library",
        serde_json::json!({"user_id": "u1", "title": "  ", "content": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_no_pending_approvals_initially() {
    let (router, _dir) = app().await;
    let (status, body) = get(&router, "/api/approvals/pending?user_id=u1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}
