//! Remote resource fetching configuration.

use serde::{Deserialize, Serialize};

/// HTTP client settings used for manifests and model downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_seconds: u64,
    /// Timeout in seconds for one complete request, body included.
    pub request_timeout_seconds: u64,
    /// Largest accepted response body, in bytes.
    pub max_resource_bytes: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            request_timeout_seconds: 120,
            max_resource_bytes: 100 * 1024 * 1024,
            user_agent: format!("avatarforge/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
