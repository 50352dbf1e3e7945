//! Integration tests for the management API (C4), exercised as an HTTP
//! surface via `tower::ServiceExt::oneshot` against the real axum
//! [`router`] - no `TcpListener`, no real auth tokens beyond what
//! [`AuthInterceptor`] is built with for the test.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use dagflow_engine::auth::AuthInterceptor;
use dagflow_engine::db::connection::DatabasePool;
use dagflow_engine::events::StdoutEventLogger;
use dagflow_engine::services::{router, ManagementApi};
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN: &str = "Bearer admin-tok";
const USER: &str = "Bearer user-tok";

async fn test_pool() -> DatabasePool {
    let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn test_router(pool: DatabasePool) -> axum::Router {
    let auth = AuthInterceptor::from_env_var("admin:admin-tok,user:user-tok");
    let api = Arc::new(ManagementApi::new(pool, auth, Arc::new(StdoutEventLogger)));
    router(api)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_workflow_requires_admin_and_returns_id() {
    let app = test_router(test_pool().await);

    let req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "pipeline", "nodes": []}).to_string()))
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert!(!body["workflow_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn create_workflow_rejects_user_token() {
    let app = test_router(test_pool().await);

    let req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, USER)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "pipeline", "nodes": []}).to_string()))
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_auth_header_is_unauthorized() {
    let app = test_router(test_pool().await);

    let req = Request::builder()
        .method("GET")
        .uri("/workflows")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_workflow_not_found_returns_404() {
    let app = test_router(test_pool().await);

    let req = Request::builder()
        .method("GET")
        .uri("/workflows/does-not-exist")
        .header(header::AUTHORIZATION, USER)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_then_get_workflow_round_trips_nodes() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "name": "ingest",
                "nodes": [
                    {"node_id": "a", "agent": "worker", "parent_ids": [], "status": "Unknown", "is_final": false},
                    {"node_id": "b", "agent": "worker", "parent_ids": ["a"], "status": "Unknown", "is_final": true},
                ]
            })
            .to_string(),
        ))
        .unwrap();

    let created = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let get_req = Request::builder()
        .method("GET")
        .uri(format!("/workflows/{}", workflow_id))
        .header(header::AUTHORIZATION, USER)
        .body(Body::empty())
        .unwrap();

    let fetched = app.oneshot(get_req).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let workflow = body_json(fetched).await;
    let nodes = workflow["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);

    let a = nodes.iter().find(|n| n["node_id"] == "a").unwrap();
    assert_eq!(a["child_ids"].as_array().unwrap(), &vec![json!("b")]);
}

#[tokio::test]
async fn list_workflows_reports_created_ids() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"name": "w", "nodes": []}).to_string()))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let list_req = Request::builder()
        .method("GET")
        .uri("/workflows")
        .header(header::AUTHORIZATION, USER)
        .body(Body::empty())
        .unwrap();
    let listed = app.oneshot(list_req).await.unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    let body = body_json(listed).await;
    let ids: Vec<String> = body["workflow_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&workflow_id));
}

#[tokio::test]
async fn update_workflow_with_unchanged_nodes_is_a_no_op() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "w", "nodes": [{"node_id": "a", "agent": "worker", "status": "Unknown", "is_final": false}]})
                .to_string(),
        ))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let get_req = Request::builder()
        .method("GET")
        .uri(format!("/workflows/{}", workflow_id))
        .header(header::AUTHORIZATION, USER)
        .body(Body::empty())
        .unwrap();
    let fetched = app.clone().oneshot(get_req).await.unwrap();
    let workflow = body_json(fetched).await;

    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/workflows/{}", workflow_id))
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"nodes": workflow["nodes"]}).to_string()))
        .unwrap();
    let updated = app.oneshot(update_req).await.unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let body = body_json(updated).await;
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn update_workflow_diff_inserts_updates_and_deletes() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "name": "w",
                "nodes": [
                    {"node_id": "keep", "agent": "worker", "status": "Unknown", "is_final": false},
                    {"node_id": "drop", "agent": "worker", "status": "Unknown", "is_final": false},
                ]
            })
            .to_string(),
        ))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    // "keep" gets a status change, "drop" is omitted, "new" is added.
    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/workflows/{}", workflow_id))
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "nodes": [
                    {"node_id": "keep", "agent": "worker", "status": "Pass", "is_final": false},
                    {"node_id": "new", "agent": "worker", "status": "Unknown", "is_final": false},
                ]
            })
            .to_string(),
        ))
        .unwrap();
    let updated = app.clone().oneshot(update_req).await.unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let get_req = Request::builder()
        .method("GET")
        .uri(format!("/workflows/{}", workflow_id))
        .header(header::AUTHORIZATION, USER)
        .body(Body::empty())
        .unwrap();
    let fetched = app.oneshot(get_req).await.unwrap();
    let workflow = body_json(fetched).await;
    let ids: Vec<String> = workflow["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["node_id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"keep".to_string()));
    assert!(ids.contains(&"new".to_string()));
    assert!(!ids.contains(&"drop".to_string()));
}

#[tokio::test]
async fn update_workflow_missing_workflow_returns_404() {
    let app = test_router(test_pool().await);

    let req = Request::builder()
        .method("PUT")
        .uri("/workflows/does-not-exist")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"nodes": []}).to_string()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_node_returns_persisted_node() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "w", "nodes": [{"node_id": "a", "agent": "worker", "status": "Unknown", "is_final": false}]})
                .to_string(),
        ))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let get_req = Request::builder()
        .method("GET")
        .uri(format!("/workflows/{}/nodes/a", workflow_id))
        .header(header::AUTHORIZATION, USER)
        .body(Body::empty())
        .unwrap();
    let fetched = app.oneshot(get_req).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let node = body_json(fetched).await;
    assert_eq!(node["node_id"], json!("a"));
}

#[tokio::test]
async fn update_node_accepts_forward_status_transition() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "w", "nodes": [{"node_id": "a", "agent": "worker", "status": "Unknown", "is_final": true}]})
                .to_string(),
        ))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/workflows/{}/nodes/a", workflow_id))
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "node_id": "a",
                "agent": "worker",
                "parent_ids": [],
                "status": "Pass",
                "is_final": true
            })
            .to_string(),
        ))
        .unwrap();
    let updated = app.oneshot(update_req).await.unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let body = body_json(updated).await;
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn update_node_marks_workflow_completed_when_final_node_passes() {
    let pool = test_pool().await;
    let app = test_router(pool.clone());

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "w", "nodes": [{"node_id": "a", "agent": "worker", "status": "Unknown", "is_final": true}]})
                .to_string(),
        ))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/workflows/{}/nodes/a", workflow_id))
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "node_id": "a",
                "agent": "worker",
                "parent_ids": [],
                "status": "Pass",
                "is_final": true
            })
            .to_string(),
        ))
        .unwrap();
    let updated = app.oneshot(update_req).await.unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let row = dagflow_engine::db::repositories::WorkflowRepository::get_by_id(&pool, &workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, dagflow_engine::Status::Pass as i32);
}

#[tokio::test]
async fn update_node_rejects_terminal_to_non_terminal_regression() {
    let pool = test_pool().await;
    let app = test_router(pool);

    let create_req = Request::builder()
        .method("POST")
        .uri("/workflows")
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"name": "w", "nodes": [{"node_id": "a", "agent": "worker", "status": "Pass", "is_final": false}]})
                .to_string(),
        ))
        .unwrap();
    let created = app.clone().oneshot(create_req).await.unwrap();
    let created_body = body_json(created).await;
    let workflow_id = created_body["workflow_id"].as_str().unwrap().to_string();

    let update_req = Request::builder()
        .method("PUT")
        .uri(format!("/workflows/{}/nodes/a", workflow_id))
        .header(header::AUTHORIZATION, ADMIN)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "node_id": "a",
                "agent": "worker",
                "parent_ids": [],
                "status": "Unknown",
                "is_final": false
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(update_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
