//! Integration tests for direct GLB conversion.

use axum::http::StatusCode;

use crate::helpers::{self, TestApp};

#[tokio::test]
async fn test_upload_round_trips_through_engine() {
    let app = TestApp::new();
    let model = helpers::glb("-hero");

    let response = app.upload("glb", "hero.glb", &model).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.bytes, model);
    assert_eq!(response.header("content-type"), "model/gltf-binary");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"hero.vrm\""
    );
    assert_eq!(response.header("x-source-type"), "glb");
    assert!(!response.header("x-request-id").is_empty());
    assert!(app.workspaces_removed());
}

#[tokio::test]
async fn test_engine_failure_reports_exit_code() {
    let app = TestApp::new();

    let response = app.upload("glb", "bad.glb", &helpers::glb("FAIL")).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["error"], "CONVERSION_FAILED");
    let message = response.body["message"].as_str().expect("message");
    assert!(message.contains("code 3"), "{message}");
    assert!(!message.contains(app.temp_root.to_string_lossy().as_ref()));
    assert!(app.workspaces_removed());
}

#[tokio::test]
async fn test_engine_timeout_is_504() {
    let app = TestApp::with_timeout(1);

    let response = app.upload("glb", "slow.glb", &helpers::glb("SLOW")).await;

    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.body["error"], "TIMEOUT");
    assert!(app.workspaces_removed());
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let app = TestApp::new();
    let mut model = helpers::glb("-big");
    model.resize(65 * 1024, b'x');

    let response = app.upload("glb", "big.glb", &model).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_convert_url_downloads_binary_model() {
    let app = TestApp::new();
    let mut server = mockito::Server::new_async().await;
    let model = helpers::glb("-remote");
    let mock = server
        .mock("GET", "/models/remote.glb")
        .with_status(200)
        .with_body(&model)
        .create_async()
        .await;

    let path = format!("/convert-url?url={}/models/remote.glb", server.url());
    let response = app.request("GET", &path, None).await;

    mock.assert_async().await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.bytes, model);
    assert_eq!(response.header("x-source-type"), "glb");
}

#[tokio::test]
async fn test_convert_url_remote_404_is_502() {
    let app = TestApp::new();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.glb")
        .with_status(404)
        .create_async()
        .await;

    let path = format!("/convert-url?url={}/missing.glb", server.url());
    let response = app.request("GET", &path, None).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body["error"], "FETCH_ERROR");
    assert!(app.workspaces_removed());
}
