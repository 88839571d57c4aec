//! Response DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use avatarforge_converter::{CapabilityStatus, MetricsSnapshot};

/// `GET /` body: what this service is and what it exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub service: String,
    /// Crate version.
    pub version: String,
    /// Endpoint -> description.
    pub endpoints: BTreeMap<String, String>,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// Resolved engine installation.
    pub engine: EngineInfo,
    /// State of the one-time capability enable.
    pub capability: CapabilityStatus,
    /// Pipeline counters.
    pub metrics: MetricsSnapshot,
}

/// Which engine binary the server will invoke.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Executable path.
    pub path: Option<String>,
    /// How the path was found.
    pub method: Option<String>,
}
