//! Integration tests for manifest-driven assembly.

use axum::http::StatusCode;

use crate::helpers::{self, TestApp};

#[tokio::test]
async fn test_manifest_overlays_are_merged_in_document_order() {
    let app = TestApp::new();
    let mut server = mockito::Server::new_async().await;

    let manifest = r#"
        <m-character src="/parts/base.glb">
          <m-model src="/parts/hat.glb"></m-model>
          <!-- <m-model src="/parts/ignored.glb"></m-model> -->
          <m-model src="shoes.glb"></m-model>
        </m-character>
    "#;
    let _manifest = server
        .mock("GET", "/avatars/hero.mml")
        .with_body(manifest)
        .create_async()
        .await;
    let mut _parts = Vec::new();
    for (path, tag) in [
        ("/parts/base.glb", "[base]"),
        ("/parts/hat.glb", "[hat]"),
        ("/avatars/shoes.glb", "[shoes]"),
    ] {
        _parts.push(
            server
                .mock("GET", path)
                .with_body(helpers::glb(tag))
                .create_async()
                .await,
        );
    }

    let response = app
        .request(
            "POST",
            "/convert-mml",
            Some(serde_json::json!({ "mmlUrl": format!("{}/avatars/hero.mml", server.url()) })),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    assert_eq!(response.header("x-source-type"), "mml");

    let mut expected = helpers::glb("[base]");
    expected.extend(helpers::glb("[hat]"));
    expected.extend(helpers::glb("[shoes]"));
    assert_eq!(response.bytes, expected);
    assert!(app.workspaces_removed());
}

#[tokio::test]
async fn test_convert_url_detects_manifest() {
    let app = TestApp::new();
    let mut server = mockito::Server::new_async().await;
    let _manifest = server
        .mock("GET", "/avatar")
        .with_body(r#"<m-character src="base.glb"></m-character>"#)
        .create_async()
        .await;
    let _base = server
        .mock("GET", "/base.glb")
        .with_body(helpers::glb("[solo]"))
        .create_async()
        .await;

    let path = format!("/convert-url?url={}/avatar", server.url());
    let response = app.request("GET", &path, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("x-source-type"), "mml");
    assert_eq!(response.bytes, helpers::glb("[solo]"));
}

#[tokio::test]
async fn test_manifest_without_base_is_400() {
    let app = TestApp::new();
    let mut server = mockito::Server::new_async().await;
    let _manifest = server
        .mock("GET", "/empty.mml")
        .with_body(r#"<m-group><m-model src="hat.glb"></m-model></m-group>"#)
        .create_async()
        .await;

    let response = app
        .request(
            "POST",
            "/convert-mml",
            Some(serde_json::json!({ "mmlUrl": format!("{}/empty.mml", server.url()) })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "PARSE_ERROR");
    assert!(app.workspaces_removed());
}

#[tokio::test]
async fn test_missing_manifest_url_is_400() {
    let app = TestApp::new();

    let response = app
        .request("POST", "/convert-mml", Some(serde_json::json!({})))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "mmlUrl is required in request body");
}

#[tokio::test]
async fn test_failed_overlay_download_aborts_before_merge() {
    let app = TestApp::new();
    let mut server = mockito::Server::new_async().await;
    let _manifest = server
        .mock("GET", "/a.mml")
        .with_body(r#"<m-character src="base.glb"><m-model src="gone.glb"></m-model></m-character>"#)
        .create_async()
        .await;
    let _base = server
        .mock("GET", "/base.glb")
        .with_body(helpers::glb("[base]"))
        .create_async()
        .await;
    let _gone = server
        .mock("GET", "/gone.glb")
        .with_status(404)
        .create_async()
        .await;

    let response = app
        .request(
            "POST",
            "/convert-mml",
            Some(serde_json::json!({ "mmlUrl": format!("{}/a.mml", server.url()) })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(app.workspaces_removed());
}
