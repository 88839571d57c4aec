//! Per-request temporary workspace.
//!
//! A [`Workspace`] owns `<temp_root>/convert_<uuid>` for the duration of one
//! request. It is removed exactly once: by [`Workspace::close`] on the normal
//! path, or by `Drop` if the request returned early or panicked.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConversionError;

/// Manifest base model file name.
pub const BASE_FILE: &str = "base.glb";
/// Merge output file name.
pub const MERGED_FILE: &str = "merged.glb";
/// Uploaded or fetched single model file name.
pub const INPUT_FILE: &str = "input.glb";
/// Final conversion output file name.
pub const OUTPUT_FILE: &str = "output.vrm";

/// An exclusively owned, per-request working directory.
#[derive(Debug)]
pub struct Workspace {
    request_id: Uuid,
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Create the workspace directory for `request_id` under `temp_root`.
    pub async fn create(temp_root: &Path, request_id: Uuid) -> Result<Self, ConversionError> {
        tokio::fs::create_dir_all(temp_root).await?;
        let root = temp_root.join(format!("convert_{}", request_id.simple()));
        tokio::fs::create_dir(&root).await?;
        debug!(%request_id, path = %root.display(), "Workspace created");
        Ok(Self {
            request_id,
            root,
            removed: false,
        })
    }

    /// Request this workspace belongs to.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file directly under the workspace root.
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Path for the overlay at `index`.
    pub fn overlay_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("model_{index}.glb"))
    }

    /// Remove the workspace. Failures are logged and swallowed.
    pub async fn close(mut self) {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(request_id = %self.request_id, "Workspace removed"),
            Err(e) => log_cleanup_failure(self.request_id, &self.root, e),
        }
    }
}

impl Drop for Workspace {
    /// Fallback for requests that never reached [`Workspace::close`], e.g. a
    /// future dropped by a timeout. Inside a runtime the removal runs on the
    /// blocking pool; otherwise it runs synchronously here.
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        let request_id = self.request_id;
        let root = std::mem::take(&mut self.root);
        let remove = move || match std::fs::remove_dir_all(&root) {
            Ok(()) => debug!(%request_id, "Workspace removed on drop"),
            Err(e) => log_cleanup_failure(request_id, &root, e),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

fn log_cleanup_failure(request_id: Uuid, root: &Path, source: std::io::Error) {
    if source.kind() == std::io::ErrorKind::NotFound {
        return;
    }
    let err = ConversionError::Cleanup {
        path: root.to_path_buf(),
        source,
    };
    warn!(
        %request_id,
        kind = %err.kind(),
        error = %err,
        "Workspace cleanup failed"
    );
}
