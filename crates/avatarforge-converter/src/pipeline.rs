//! Request pipeline: workspace lifecycle, source resolution, conversion
//! and metrics collection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use avatarforge_core::config::AppConfig;
use avatarforge_core::error::AppError;
use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::assembly::{AssembledModel, AssemblyOrchestrator};
use crate::capability::{CapabilityStatus, EngineCapability};
use crate::detect::{self, DetectedFormat};
use crate::discovery::BlenderInstallation;
use crate::engine::{BlenderEngine, EngineRunner, ensure_success};
use crate::error::ConversionError;
use crate::fetcher::{HttpFetcher, ResourceFetcher};
use crate::filesystem::FsUtils;
use crate::metrics::{ConversionMetrics, MetricsSnapshot};
use crate::models::{ConversionJob, ConversionOutcome, JobKind, SourceType};
use crate::workspace::{INPUT_FILE, OUTPUT_FILE, Workspace};

/// Where a request's model comes from.
enum RequestSource {
    /// Raw bytes supplied by the caller.
    Payload(Bytes),
    /// URL of a manifest.
    ManifestUrl(Url),
    /// URL whose content type is detected after download.
    DetectUrl(Url),
}

/// Limits applied by the pipeline itself.
#[derive(Debug, Clone)]
pub struct PipelineLimits {
    /// Root directory for per-request workspaces.
    pub temp_root: PathBuf,
    /// Largest accepted raw payload, in bytes.
    pub max_payload_bytes: u64,
    /// Minimum size of an engine output to count as produced.
    pub min_output_bytes: u64,
}

impl PipelineLimits {
    /// Derive limits from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            temp_root: config.workspace.effective_temp_root(),
            max_payload_bytes: config.server.max_upload_bytes,
            min_output_bytes: config.engine.min_output_bytes,
        }
    }
}

/// The conversion pipeline shared by every request.
#[derive(Clone)]
pub struct ConversionPipeline {
    limits: PipelineLimits,
    fetcher: Arc<dyn ResourceFetcher>,
    engine: Arc<dyn EngineRunner>,
    assembly: AssemblyOrchestrator,
    capability: Arc<EngineCapability>,
    metrics: Arc<ConversionMetrics>,
    installation: Option<BlenderInstallation>,
}

impl ConversionPipeline {
    /// Build the production pipeline: HTTP fetcher, discovered Blender.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let engine = BlenderEngine::from_config(&config.engine);
        let installation = engine.installation().clone();

        info!(
            engine = %installation.executable.display(),
            method = ?installation.discovery_method,
            timeout_s = config.engine.timeout_seconds,
            "Conversion pipeline configured"
        );

        let mut pipeline = Self::new(
            PipelineLimits::from_config(config),
            fetcher,
            Arc::new(engine),
            Arc::new(EngineCapability::new(config.engine.enable_addon)),
        );
        pipeline.installation = Some(installation);
        Ok(pipeline)
    }

    /// Assemble a pipeline from explicit components.
    pub fn new(
        limits: PipelineLimits,
        fetcher: Arc<dyn ResourceFetcher>,
        engine: Arc<dyn EngineRunner>,
        capability: Arc<EngineCapability>,
    ) -> Self {
        let assembly = AssemblyOrchestrator::new(
            fetcher.clone(),
            engine.clone(),
            capability.clone(),
            limits.min_output_bytes,
        );
        Self {
            limits,
            fetcher,
            engine,
            assembly,
            capability,
            metrics: Arc::new(ConversionMetrics::new()),
            installation: None,
        }
    }

    /// The resolved engine installation, if built from configuration.
    pub fn installation(&self) -> Option<&BlenderInstallation> {
        self.installation.as_ref()
    }

    /// Current capability status, without triggering an attempt.
    pub fn capability_status(&self) -> CapabilityStatus {
        self.capability.status()
    }

    /// Run the capability enable step if it has not run yet.
    pub async fn ensure_capability(&self) -> CapabilityStatus {
        self.capability.ensure(self.engine.as_ref()).await
    }

    /// Current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Largest accepted raw payload, in bytes.
    pub fn max_payload_bytes(&self) -> u64 {
        self.limits.max_payload_bytes
    }

    /// Convert a raw payload. Binary models convert directly; manifests are
    /// assembled first (references must be absolute).
    #[instrument(skip(self, data), fields(request_id, size = data.len()))]
    pub async fn convert_payload(&self, data: Bytes) -> Result<ConversionOutcome, ConversionError> {
        if data.is_empty() {
            return Err(ConversionError::MissingInput {
                field: "glb".to_string(),
            });
        }
        if data.len() as u64 > self.limits.max_payload_bytes {
            return Err(ConversionError::PayloadTooLarge {
                size: data.len() as u64,
                limit: self.limits.max_payload_bytes,
            });
        }
        self.execute(RequestSource::Payload(data)).await
    }

    /// Convert the avatar described by the manifest at `url`.
    #[instrument(skip(self), fields(request_id))]
    pub async fn convert_manifest_url(&self, url: &str) -> Result<ConversionOutcome, ConversionError> {
        let url = parse_request_url("mmlUrl", url)?;
        self.execute(RequestSource::ManifestUrl(url)).await
    }

    /// Download `url`, detect its type, and convert it.
    #[instrument(skip(self), fields(request_id))]
    pub async fn convert_url(&self, url: &str) -> Result<ConversionOutcome, ConversionError> {
        let url = parse_request_url("url", url)?;
        self.execute(RequestSource::DetectUrl(url)).await
    }

    /// Bracket one request with its workspace and metrics.
    async fn execute(&self, source: RequestSource) -> Result<ConversionOutcome, ConversionError> {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", request_id.to_string());
        let start = Instant::now();
        self.metrics.record_started();

        let result = match Workspace::create(&self.limits.temp_root, request_id).await {
            Ok(workspace) => {
                let result = self.run(source, &workspace).await;
                workspace.close().await;
                result
            }
            Err(e) => Err(e),
        };

        let duration = start.elapsed();
        match result {
            Ok((source_type, data)) => {
                self.metrics.record_source(source_type);
                self.metrics
                    .record_success(duration, data.len() as u64);
                info!(
                    %request_id,
                    source_type = %source_type,
                    bytes = data.len(),
                    elapsed_ms = duration.as_millis() as u64,
                    "Conversion succeeded"
                );
                Ok(ConversionOutcome {
                    request_id,
                    data,
                    source_type,
                    duration,
                })
            }
            Err(e) => {
                self.metrics.record_failure(e.kind(), e.is_timeout());
                error!(
                    %request_id,
                    kind = %e.kind(),
                    error = %e,
                    elapsed_ms = duration.as_millis() as u64,
                    "Conversion failed"
                );
                Err(e)
            }
        }
    }

    /// Resolve the source to a model file and convert it.
    async fn run(
        &self,
        source: RequestSource,
        workspace: &Workspace,
    ) -> Result<(SourceType, Bytes), ConversionError> {
        let (source_type, model) = match source {
            RequestSource::Payload(data) => self.resolve_bytes(data, None, workspace).await?,
            RequestSource::ManifestUrl(url) => {
                let model = self.assembly.assemble_from_url(&url, workspace).await?;
                (SourceType::Mml, model)
            }
            RequestSource::DetectUrl(url) => {
                let data = self.fetcher.fetch_bytes(&url).await?;
                self.metrics.record_fetches(1);
                self.resolve_bytes(data, Some(&url), workspace).await?
            }
        };

        self.metrics.record_fetches(model.fetched as u64);
        if model.merged {
            self.metrics.record_merge();
        }

        let data = self.convert_model(&model.path, workspace).await?;
        Ok((source_type, data))
    }

    /// Detect `data` and turn it into a local model file.
    async fn resolve_bytes(
        &self,
        data: Bytes,
        origin: Option<&Url>,
        workspace: &Workspace,
    ) -> Result<(SourceType, AssembledModel), ConversionError> {
        let format = detect::detect(&data);
        debug!(format = ?format, "Detected source format");

        match format {
            DetectedFormat::BinaryModel => {
                let path = workspace.path(INPUT_FILE);
                tokio::fs::write(&path, &data).await?;
                Ok((
                    SourceType::Glb,
                    AssembledModel {
                        path,
                        fetched: 0,
                        merged: false,
                    },
                ))
            }
            DetectedFormat::Manifest => {
                let text = String::from_utf8_lossy(&data);
                let model = self
                    .assembly
                    .assemble_from_text(&text, origin, workspace)
                    .await?;
                Ok((SourceType::Mml, model))
            }
            DetectedFormat::Unknown => Err(ConversionError::UnknownFormat),
        }
    }

    /// Run the GLB to VRM job and read the result.
    async fn convert_model(
        &self,
        model: &Path,
        workspace: &Workspace,
    ) -> Result<Bytes, ConversionError> {
        self.ensure_capability().await;

        let output = workspace.path(OUTPUT_FILE);
        let job = ConversionJob::convert(workspace.request_id(), model.to_path_buf(), output.clone());
        let result = self.engine.run(&job).await?;
        ensure_success(&job, &result)?;
        FsUtils::check_output(JobKind::Convert, &output, self.limits.min_output_bytes).await?;
        FsUtils::read_output(&output).await
    }
}

/// Validate a caller-supplied URL.
fn parse_request_url(field: &str, raw: &str) -> Result<Url, ConversionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConversionError::MissingInput {
            field: field.to_string(),
        });
    }

    let url = Url::parse(raw).map_err(|e| ConversionError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConversionError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::test_support::{StubEngine, StubFetcher};
    use crate::detect::GLB_MAGIC;
    use crate::error::FailureKind;

    struct Harness {
        pipeline: ConversionPipeline,
        fetcher: Arc<StubFetcher>,
        engine: Arc<StubEngine>,
        temp: tempfile::TempDir,
    }

    fn harness(fetcher: StubFetcher, engine: StubEngine) -> Harness {
        let temp = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(fetcher);
        let engine = Arc::new(engine);
        let pipeline = ConversionPipeline::new(
            PipelineLimits {
                temp_root: temp.path().to_path_buf(),
                max_payload_bytes: 1024,
                min_output_bytes: 1,
            },
            fetcher.clone(),
            engine.clone(),
            Arc::new(EngineCapability::new(true)),
        );
        Harness {
            pipeline,
            fetcher,
            engine,
            temp,
        }
    }

    fn glb(body: &[u8]) -> Bytes {
        let mut data = GLB_MAGIC.to_vec();
        data.extend_from_slice(body);
        Bytes::from(data)
    }

    fn workspace_is_empty(temp: &tempfile::TempDir) -> bool {
        std::fs::read_dir(temp.path())
            .expect("read_dir")
            .next()
            .is_none()
    }

    #[tokio::test]
    async fn test_glb_payload_converts_directly() {
        let h = harness(StubFetcher::default(), StubEngine::succeeding(b"vrm-bytes"));

        let outcome = h
            .pipeline
            .convert_payload(glb(b"-model"))
            .await
            .expect("convert");

        assert_eq!(&outcome.data[..], b"vrm-bytes");
        assert_eq!(outcome.source_type, SourceType::Glb);

        let jobs = h.engine.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Convert);
        assert!(jobs[0].inputs[0].ends_with(INPUT_FILE));
        assert!(jobs[0].output.ends_with(OUTPUT_FILE));

        assert!(workspace_is_empty(&h.temp));
        assert_eq!(h.pipeline.capability_status(), CapabilityStatus::Enabled);
        let snap = h.pipeline.metrics();
        assert_eq!(snap.requests_succeeded, 1);
        assert_eq!(snap.glb_requests, 1);
    }

    #[tokio::test]
    async fn test_unknown_payload_is_rejected_and_cleaned_up() {
        let h = harness(StubFetcher::default(), StubEngine::succeeding(b"vrm"));

        let err = h
            .pipeline
            .convert_payload(Bytes::from_static(b"{\"not\": \"a model\"}"))
            .await
            .expect_err("unknown");

        assert!(matches!(err, ConversionError::UnknownFormat));
        assert!(h.engine.jobs().is_empty());
        assert_eq!(h.engine.enable_calls(), 0);
        assert!(workspace_is_empty(&h.temp));
        assert_eq!(h.pipeline.metrics().client_failures, 1);
    }

    #[tokio::test]
    async fn test_manifest_without_base_fails_before_engine_work() {
        let h = harness(StubFetcher::default(), StubEngine::succeeding(b"vrm"));

        let err = h
            .pipeline
            .convert_payload(Bytes::from_static(
                br#"<m-group><m-model src="https://x/a.glb"/></m-group>"#,
            ))
            .await
            .expect_err("no base");

        assert_eq!(err.kind(), FailureKind::Parse);
        assert_eq!(h.engine.enable_calls(), 0);
        assert!(h.engine.jobs().is_empty());
        assert!(h.fetcher.requests().is_empty());
        assert_eq!(h.pipeline.capability_status(), CapabilityStatus::Pending);
        assert!(workspace_is_empty(&h.temp));
    }

    #[tokio::test]
    async fn test_payload_limits() {
        let h = harness(StubFetcher::default(), StubEngine::succeeding(b"vrm"));

        let err = h
            .pipeline
            .convert_payload(Bytes::new())
            .await
            .expect_err("empty");
        assert_eq!(err.kind(), FailureKind::Validation);

        let err = h
            .pipeline
            .convert_payload(glb(&[0u8; 2048]))
            .await
            .expect_err("too large");
        assert!(matches!(err, ConversionError::PayloadTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_manifest_url_with_overlays_merges_then_converts() {
        let fetcher = StubFetcher::with(&[
            (
                "https://x/a/index.mml",
                br#"<m-character src="base.glb"><m-model src="hat.glb"><m-model src="/shoes.glb">"#,
            ),
            ("https://x/a/base.glb", b"glTF-base"),
            ("https://x/a/hat.glb", b"glTF-hat"),
            ("https://x/shoes.glb", b"glTF-shoes"),
        ]);
        let h = harness(fetcher, StubEngine::succeeding(b"glTF-out"));

        let outcome = h
            .pipeline
            .convert_manifest_url("https://x/a/index.mml")
            .await
            .expect("convert");

        assert_eq!(outcome.source_type, SourceType::Mml);
        let jobs = h.engine.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].kind, JobKind::Merge);
        assert_eq!(jobs[0].overlays().len(), 2);
        assert!(jobs[0].overlays()[0].ends_with("model_0.glb"));
        assert!(jobs[0].overlays()[1].ends_with("model_1.glb"));
        assert_eq!(jobs[1].kind, JobKind::Convert);
        assert_eq!(jobs[1].inputs[0], jobs[0].output);

        assert!(workspace_is_empty(&h.temp));
        let snap = h.pipeline.metrics();
        assert_eq!(snap.merges_performed, 1);
        assert_eq!(snap.mml_requests, 1);
        assert_eq!(snap.resources_fetched, 3);
    }

    #[tokio::test]
    async fn test_detect_url_resolves_manifest_relative_to_itself() {
        let fetcher = StubFetcher::with(&[
            ("https://x/a/avatar", br#"<m-character src="base.glb">"#),
            ("https://x/a/base.glb", b"glTF-base"),
        ]);
        let h = harness(fetcher, StubEngine::succeeding(b"vrm"));

        let outcome = h
            .pipeline
            .convert_url("https://x/a/avatar")
            .await
            .expect("convert");

        assert_eq!(outcome.source_type, SourceType::Mml);
        let jobs = h.engine.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Convert);
        assert_eq!(
            h.fetcher.requests(),
            vec!["https://x/a/avatar", "https://x/a/base.glb"]
        );
    }

    #[tokio::test]
    async fn test_detect_url_binary_model() {
        let fetcher = StubFetcher::with(&[("https://x/m.glb", b"glTF\x02\x00\x00\x00")]);
        let h = harness(fetcher, StubEngine::succeeding(b"vrm"));

        let outcome = h
            .pipeline
            .convert_url("https://x/m.glb")
            .await
            .expect("convert");
        assert_eq!(outcome.source_type, SourceType::Glb);
    }

    #[tokio::test]
    async fn test_invalid_urls_are_validation_errors() {
        let h = harness(StubFetcher::default(), StubEngine::succeeding(b"vrm"));

        for raw in ["", "   ", "not a url", "ftp://x/a.mml"] {
            let err = h
                .pipeline
                .convert_manifest_url(raw)
                .await
                .expect_err("invalid");
            assert_eq!(err.kind(), FailureKind::Validation, "input {raw:?}");
        }
        assert!(h.fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_cleans_up_and_reports_code() {
        let h = harness(StubFetcher::default(), StubEngine::failing(3));

        let err = h
            .pipeline
            .convert_payload(glb(b"-model"))
            .await
            .expect_err("engine failure");

        assert_eq!(err.kind(), FailureKind::Conversion);
        assert!(err.public_message().contains('3'));
        assert!(workspace_is_empty(&h.temp));
        assert_eq!(h.pipeline.metrics().requests_failed, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_cleans_up() {
        let h = harness(StubFetcher::default(), StubEngine::succeeding(b"vrm"));

        let err = h
            .pipeline
            .convert_url("https://x/missing.glb")
            .await
            .expect_err("404");

        assert_eq!(err.kind(), FailureKind::Fetch);
        assert!(workspace_is_empty(&h.temp));
        assert_eq!(h.pipeline.metrics().fetch_failures, 1);
    }
}
