//! # avatarforge-converter
//!
//! Turns GLB models and MML avatar manifests into VRM files using Blender
//! as a headless conversion engine.
//!
//! ## Flow
//!
//! A request's source is classified by [`detect`]. Binary models go straight
//! to conversion. Manifests are parsed by [`manifest`], their base and
//! overlay models downloaded by a [`ResourceFetcher`], and overlays merged
//! onto the base by the [`AssemblyOrchestrator`]. The resulting model is
//! converted by the [`BlenderEngine`]. Each request runs inside its own
//! [`Workspace`], removed exactly once when the request ends.

pub mod assembly;
pub mod capability;
pub mod detect;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod filesystem;
pub mod manifest;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod workspace;

pub use assembly::AssemblyOrchestrator;
pub use capability::{CapabilityStatus, EngineCapability};
pub use detect::DetectedFormat;
pub use discovery::{BlenderDiscovery, BlenderInstallation};
pub use engine::{BlenderEngine, EngineRunner};
pub use error::{ConversionError, FailureKind};
pub use fetcher::{HttpFetcher, ResourceFetcher};
pub use manifest::Manifest;
pub use metrics::MetricsSnapshot;
pub use models::{ConversionJob, ConversionOutcome, EngineResult, JobKind, SourceType};
pub use pipeline::{ConversionPipeline, PipelineLimits};
pub use reqwest::Url;
pub use workspace::Workspace;
