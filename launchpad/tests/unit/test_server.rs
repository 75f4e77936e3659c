//! Query API handler tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use launchpad::server::{router, ServerState};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::Harness;

fn app(harness: &Harness) -> Router {
    router(Arc::new(ServerState::new(
        harness.state.orchestrator.clone(),
        harness.state.query.clone(),
    )))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();
    let (status, body) = send(app(&harness), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "launchpad");
}

#[tokio::test]
async fn test_unknown_deployment_is_404() {
    let harness = Harness::new();
    let (status, body) = send(app(&harness), get("/deployments/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["projectName"], "missing");
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn test_deploy_then_read_status() {
    let harness = Harness::new();
    let request = serde_json::to_value(harness.backend_request("web")).unwrap();

    let (status, body) = send(app(&harness), post_json("/deployments", &request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["projectName"], "web");
    assert_eq!(body["status"], "in_progress");

    harness.wait_finished("web").await;
    let (status, body) = send(app(&harness), get("/deployments/web")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["outputs"]["ApiUrl"].is_string());

    let (status, body) = send(app(&harness), get("/deployments")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["deployments"][0]["projectName"], "web");
}

#[tokio::test]
async fn test_invalid_request_is_400() {
    let harness = Harness::new();
    let mut request = serde_json::to_value(harness.backend_request("bad")).unwrap();
    request["framework"] = json!("cobol");

    let (status, body) = send(app(&harness), post_json("/deployments", &request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["message"].as_str().unwrap().contains("cobol"));
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/deployments")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(app(&harness), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
    assert!(body["message"].is_string());
    assert!(harness.state.records.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_deploy_is_409() {
    let harness = Harness::new();
    let request = serde_json::to_value(harness.backend_request("dup")).unwrap();

    let (status, _) = send(app(&harness), post_json("/deployments", &request)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = send(app(&harness), post_json("/deployments", &request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_in_progress");

    harness.wait_finished("dup").await;
}

#[tokio::test]
async fn test_refresh_query_failure_is_502() {
    let harness = Harness::new();
    harness.cloud.fail("describe_stack", "Throttling");
    let (status, body) = send(
        app(&harness),
        post_json("/deployments/anything/refresh", &json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "reconcile_query");
}
