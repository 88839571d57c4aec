//! Shared test helpers for integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use avatarforge_api::AppState;
use avatarforge_api::router::build_router;
use avatarforge_converter::ConversionPipeline;
use avatarforge_core::config::AppConfig;

/// Prefix of every valid binary model.
pub const GLB_MAGIC: &[u8] = b"glTF";

/// Stand-in for Blender. Receives
/// `--background --python <script> -- <positional...>`.
///
/// * merge: concatenates base and overlays into the output
/// * convert: copies the input to the output
/// * input containing `FAIL`: exits 3 with a diagnostic on stderr
/// * input containing `SLOW`: sleeps past any test timeout
const FAKE_ENGINE: &str = r#"#!/bin/sh
script="$3"
shift 4
case "$script" in
  *enable*)
    echo "add-on enabled"
    exit 0
    ;;
  *merge*)
    base="$1"; out="$2"; shift 2
    cat "$base" "$@" > "$out"
    ;;
  *convert*)
    if grep -q FAIL "$1"; then
      echo "Traceback: conversion exploded" >&2
      exit 3
    fi
    if grep -q SLOW "$1"; then
      exec sleep 30
    fi
    cat "$1" > "$2"
    ;;
esac
"#;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Root of per-request workspaces
    pub temp_root: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Create a new test application with the default engine timeout.
    pub fn new() -> Self {
        Self::with_timeout(30)
    }

    /// Create a new test application whose engine times out after
    /// `timeout_seconds`.
    pub fn with_timeout(timeout_seconds: u64) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = write_fake_engine(dir.path());
        let scripts_dir = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts_dir).expect("scripts dir");
        let temp_root = dir.path().join("work");

        let mut config = AppConfig::default();
        config.engine.blender_path = engine;
        config.engine.scripts_dir = scripts_dir;
        config.engine.timeout_seconds = timeout_seconds;
        config.workspace.temp_root = Some(temp_root.clone());
        config.server.max_upload_bytes = 64 * 1024;

        let pipeline = ConversionPipeline::from_config(&config).expect("pipeline");
        let router = build_router(AppState::new(config, pipeline));

        Self {
            router,
            temp_root,
            _dir: dir,
        }
    }

    /// Whether every request workspace has been removed.
    pub fn workspaces_removed(&self) -> bool {
        match std::fs::read_dir(&self.temp_root) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    /// Make a JSON or empty-bodied request.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let body_str = body
            .map(|b| serde_json::to_string(&b).expect("Failed to serialize body"))
            .unwrap_or_default();

        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body_str))
            .expect("Failed to build request");

        self.send(req).await
    }

    /// Upload `data` as multipart field `field`.
    pub async fn upload(&self, field: &str, file_name: &str, data: &[u8]) -> TestResponse {
        let boundary = "integration-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = Request::post("/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(req).await
    }

    async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
            .await
            .expect("Failed to read body")
            .to_vec();
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub bytes: Vec<u8>,
    /// Body parsed as JSON, `Null` for binary bodies
    pub body: Value,
}

impl TestResponse {
    /// Header value as a string, empty when absent.
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// A binary model whose body is `tag`.
pub fn glb(tag: &str) -> Vec<u8> {
    let mut data = GLB_MAGIC.to_vec();
    data.extend_from_slice(tag.as_bytes());
    data
}

fn write_fake_engine(dir: &Path) -> PathBuf {
    let path = dir.join("blender");
    std::fs::write(&path, FAKE_ENGINE).expect("write engine");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}
