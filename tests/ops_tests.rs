//! Ops endpoint tests against a live embedded store.

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use poolkeeper::adapter::inbound::http::router;
use poolkeeper::infrastructure::database::DatabaseManager;
use serde_json::Value;
use support::TempStore;
use tower::ServiceExt;

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn app(store: &TempStore) -> (Arc<DatabaseManager>, Router) {
    let manager = Arc::new(store.start().await);
    let app = router(manager.clone());
    (manager, app)
}

#[tokio::test]
async fn health_is_ok_while_store_answers() {
    let store = TempStore::new();
    let (manager, app) = app(&store).await;

    let (status, body) = call(app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database_type"], "sqlite");
    assert_eq!(body["connection_test"], true);
    assert_eq!(body["pool_status"]["pool_size"], 1);
    assert!(body["timestamp"].is_string());
    manager.shutdown().await;
}

#[tokio::test]
async fn health_is_503_after_shutdown() {
    let store = TempStore::new();
    let (manager, app) = app(&store).await;
    manager.shutdown().await;

    let (status, body) = call(app, "GET", "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert_eq!(body["pool_status"]["status"], "Pool information not available");
}

#[tokio::test]
async fn pool_status_reports_occupancy() {
    let store = TempStore::new();
    let (manager, app) = app(&store).await;

    let (status, body) = call(app, "GET", "/pool-status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["database_type"], "sqlite");
    assert_eq!(body["pool_status"]["checked_out"], 0);
    assert_eq!(body["pool_status"]["max_overflow"], 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_connection_probes_both_pools() {
    let store = TempStore::new();
    let (manager, app) = app(&store).await;

    let (status, body) = call(app.clone(), "POST", "/test-connection").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync_connection"], true);
    assert_eq!(body["async_connection"], true);
    assert_eq!(body["overall_status"], "healthy");

    manager.shutdown().await;
    let (status, body) = call(app, "POST", "/test-connection").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync_connection"], false);
    assert_eq!(body["overall_status"], "unhealthy");
}

#[tokio::test]
async fn test_connection_requires_post() {
    let store = TempStore::new();
    let (manager, app) = app(&store).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/test-connection")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    manager.shutdown().await;
}
