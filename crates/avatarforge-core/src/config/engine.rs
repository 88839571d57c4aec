//! Conversion engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration for the headless Blender engine and its driver scripts.
///
/// If `blender_path` is empty the converter discovers the executable from
/// the `BLENDER_PATH` environment variable, common install locations and
/// finally `PATH`.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the Blender executable, or a directory containing it.
    pub blender_path: PathBuf,

    /// Directory holding the driver scripts.
    pub scripts_dir: PathBuf,

    /// Driver script for a single GLB to VRM conversion.
    #[validate(length(min = 1))]
    pub convert_script: String,

    /// Driver script that merges overlay GLBs onto a base GLB.
    #[validate(length(min = 1))]
    pub merge_script: String,

    /// Driver script that enables the VRM add-on.
    #[validate(length(min = 1))]
    pub enable_addon_script: String,

    /// Wall-clock timeout in seconds for one convert or merge invocation.
    #[validate(range(min = 1, max = 7200))]
    pub timeout_seconds: u64,

    /// Wall-clock timeout in seconds for the add-on enable step.
    #[validate(range(min = 1, max = 600))]
    pub enable_timeout_seconds: u64,

    /// Maximum bytes of stdout and of stderr retained per invocation.
    /// Output beyond this is still drained, only not kept.
    #[validate(range(min = 1024))]
    pub max_captured_bytes: usize,

    /// Minimum output file size (bytes) to consider an invocation productive.
    pub min_output_bytes: u64,

    /// Whether to run the add-on enable step before the first conversion.
    pub enable_addon: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blender_path: PathBuf::new(),
            scripts_dir: PathBuf::from("blender_scripts"),
            convert_script: "convert_glb_to_vrm.py".to_string(),
            merge_script: "merge_glb_files.py".to_string(),
            enable_addon_script: "enable_vrm_addon.py".to_string(),
            timeout_seconds: 300,
            enable_timeout_seconds: 30,
            max_captured_bytes: 1024 * 1024,
            min_output_bytes: 1,
            enable_addon: true,
        }
    }
}
