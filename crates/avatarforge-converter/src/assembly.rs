//! Multi-part manifest assembly.
//!
//! Resolves a manifest to a single local model file: the base model alone
//! for a monolithic manifest, otherwise the result of merging every overlay
//! onto the base in document order.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info, instrument};

use crate::capability::EngineCapability;
use crate::engine::{EngineRunner, ensure_success};
use crate::error::ConversionError;
use crate::fetcher::ResourceFetcher;
use crate::filesystem::FsUtils;
use crate::manifest::{self, ResolvedManifest};
use crate::models::{ConversionJob, JobKind};
use crate::workspace::{BASE_FILE, MERGED_FILE, Workspace};

/// A model file ready for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledModel {
    /// Local path of the model inside the workspace.
    pub path: PathBuf,
    /// Number of remote resources downloaded.
    pub fetched: usize,
    /// Whether a merge job ran.
    pub merged: bool,
}

/// Drives manifest resolution through fetching and merging.
#[derive(Clone)]
pub struct AssemblyOrchestrator {
    fetcher: Arc<dyn ResourceFetcher>,
    engine: Arc<dyn EngineRunner>,
    capability: Arc<EngineCapability>,
    min_output_bytes: u64,
}

impl AssemblyOrchestrator {
    /// Create an orchestrator over the given fetcher and engine.
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        engine: Arc<dyn EngineRunner>,
        capability: Arc<EngineCapability>,
        min_output_bytes: u64,
    ) -> Self {
        Self {
            fetcher,
            engine,
            capability,
            min_output_bytes,
        }
    }

    /// Fetch the manifest at `manifest_url`, parse it, and assemble it.
    #[instrument(skip(self, workspace), fields(request_id = %workspace.request_id()))]
    pub async fn assemble_from_url(
        &self,
        manifest_url: &Url,
        workspace: &Workspace,
    ) -> Result<AssembledModel, ConversionError> {
        let body = self.fetcher.fetch_bytes(manifest_url).await?;
        let text = String::from_utf8_lossy(&body);
        self.assemble_from_text(&text, Some(manifest_url), workspace)
            .await
    }

    /// Parse manifest text and assemble it. Relative references resolve
    /// against `manifest_url` when one is known.
    pub async fn assemble_from_text(
        &self,
        text: &str,
        manifest_url: Option<&Url>,
        workspace: &Workspace,
    ) -> Result<AssembledModel, ConversionError> {
        let manifest = manifest::parse(text)?.resolve(manifest_url)?;
        self.assemble(&manifest, workspace).await
    }

    /// Assemble an already resolved manifest.
    ///
    /// Any fetch failure aborts before the merge is attempted.
    pub async fn assemble(
        &self,
        manifest: &ResolvedManifest,
        workspace: &Workspace,
    ) -> Result<AssembledModel, ConversionError> {
        let base = self
            .fetcher
            .fetch_to_file(&manifest.base_source, &workspace.path(BASE_FILE))
            .await?;

        if manifest.is_monolithic() {
            debug!("Monolithic manifest, skipping merge");
            return Ok(AssembledModel {
                path: base,
                fetched: 1,
                merged: false,
            });
        }

        let mut overlays = Vec::with_capacity(manifest.overlay_sources.len());
        for (index, source) in manifest.overlay_sources.iter().enumerate() {
            let dest = workspace.overlay_path(index);
            overlays.push(self.fetcher.fetch_to_file(source, &dest).await?);
        }
        let fetched = overlays.len() + 1;

        self.capability.ensure(self.engine.as_ref()).await;

        let output = workspace.path(MERGED_FILE);
        let job = ConversionJob::merge(workspace.request_id(), base, output.clone(), overlays);
        let result = self.engine.run(&job).await?;
        ensure_success(&job, &result)?;
        FsUtils::check_output(JobKind::Merge, &output, self.min_output_bytes).await?;

        info!(
            overlays = job.overlays().len(),
            elapsed_ms = result.duration_ms,
            "Merged overlays onto base model"
        );

        Ok(AssembledModel {
            path: output,
            fetched,
            merged: true,
        })
    }
}
