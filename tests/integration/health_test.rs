//! Integration tests for the service description and health endpoints.

use axum::http::StatusCode;

use crate::helpers::{self, TestApp};

#[tokio::test]
async fn test_health_reports_configured_engine() {
    let app = TestApp::new();

    let response = app.request("GET", "/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert!(
        response.body["engine"]["path"]
            .as_str()
            .expect("engine path")
            .ends_with("blender")
    );
    assert_eq!(response.body["engine"]["method"], "ExplicitConfig");
}

#[tokio::test]
async fn test_health_tracks_capability_and_metrics() {
    let app = TestApp::new();
    let upload = app.upload("glb", "a.glb", &helpers::glb("-a")).await;
    assert_eq!(upload.status, StatusCode::OK);

    let response = app.request("GET", "/health", None).await;
    assert_eq!(response.body["capability"]["state"], "enabled");
    assert_eq!(response.body["metrics"]["requests_succeeded"], 1);
    assert_eq!(response.body["metrics"]["glb_requests"], 1);
}

#[tokio::test]
async fn test_root_describes_service() {
    let app = TestApp::new();

    let response = app.request("GET", "/", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["service"], "GLB to VRM Converter");
    assert!(response.body["endpoints"]["GET /convert-url?url="].is_string());
}
