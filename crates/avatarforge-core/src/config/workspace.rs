//! Per-request workspace configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where per-request working directories are created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root for request directories; the system temp dir when unset.
    pub temp_root: Option<PathBuf>,
}

impl WorkspaceConfig {
    /// Resolve the effective temp root directory.
    pub fn effective_temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("avatarforge"))
    }
}
