//! Service description and health check handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;

use crate::dto::response::{EngineInfo, HealthResponse, ServiceInfo};
use crate::state::AppState;

/// GET /
pub async fn service_info() -> Json<ServiceInfo> {
    let endpoints = [
        ("GET /", "This service description"),
        ("GET /health", "Health check with engine status and metrics"),
        ("POST /convert", "Convert an uploaded GLB (multipart field 'glb') to VRM"),
        ("POST /convert-mml", "Convert the avatar described by an MML manifest URL ({\"mmlUrl\": ...})"),
        ("GET /convert-url?url=", "Download a GLB or MML from a URL, detect its type and convert it"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(ServiceInfo {
        service: "GLB to VRM Converter".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let installation = state.pipeline.installation();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        engine: EngineInfo {
            path: installation.map(|i| i.executable.display().to_string()),
            method: installation.map(|i| format!("{:?}", i.discovery_method)),
        },
        capability: state.pipeline.capability_status(),
        metrics: state.pipeline.metrics(),
    })
}
