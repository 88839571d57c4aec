//! Unified error type for the conversion pipeline.
//!
//! All subsystem errors (detection, manifest parsing, fetching, engine
//! execution, workspace IO) are consolidated into a single
//! `ConversionError` enum. Callers branch on [`ConversionError::kind`],
//! never on message text.

use std::fmt;
use std::path::PathBuf;

use avatarforge_core::error::AppError;
use thiserror::Error;

use crate::models::JobKind;

/// Failure classes a request can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required input was missing or unusable. Client fault.
    Validation,
    /// The manifest has no usable base reference. Client fault.
    Parse,
    /// A referenced resource could not be retrieved.
    Fetch,
    /// The engine binary could not be started.
    ProcessLaunch,
    /// The engine ran and failed, timed out, or produced nothing.
    Conversion,
    /// Workspace removal failed. Logged only, never returned.
    Cleanup,
    /// Unexpected local failure (filesystem, task join).
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Parse => "parse",
            Self::Fetch => "fetch",
            Self::ProcessLaunch => "process_launch",
            Self::Conversion => "conversion",
            Self::Cleanup => "cleanup",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Unified error type for all conversion operations.
#[derive(Debug, Error)]
pub enum ConversionError {
    // --- Validation errors ---
    /// A required request field was absent or empty.
    #[error("Missing required input: {field}")]
    MissingInput {
        /// Name of the missing field.
        field: String,
    },

    /// A URL supplied by the caller could not be used.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Content is neither a binary model nor a manifest.
    #[error("Unknown file type: content must be either GLB (binary) or MML (text/xml)")]
    UnknownFormat,

    /// An uploaded payload exceeded the configured limit.
    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    // --- Manifest errors ---
    /// The manifest contains no base-character element with a `src`.
    #[error("No m-character element with a src attribute found in manifest")]
    ManifestMissingBase,

    /// A manifest `src` could not be resolved to an absolute URL.
    #[error("Manifest reference '{reference}' cannot be resolved: {reason}")]
    InvalidReference {
        /// The raw attribute value.
        reference: String,
        /// Why it could not be resolved.
        reason: String,
    },

    // --- Fetch errors ---
    /// The remote server answered with a non-success status.
    #[error("Failed to download {uri}: {status}")]
    FetchStatus {
        /// The requested URI.
        uri: String,
        /// Status line, e.g. `404 Not Found`.
        status: String,
    },

    /// The request failed below the HTTP layer.
    #[error("Failed to download {uri}: {source}")]
    FetchTransport {
        /// The requested URI.
        uri: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body exceeded the configured limit.
    #[error("Resource {uri} exceeds the {limit} byte limit")]
    ResourceTooLarge {
        /// The requested URI.
        uri: String,
        /// Configured maximum.
        limit: u64,
    },

    // --- Engine errors ---
    /// The engine executable could not be spawned.
    #[error("Failed to launch conversion engine {program}: {source}")]
    EngineLaunch {
        /// The program that was spawned.
        program: PathBuf,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The engine exited unsuccessfully.
    #[error("Engine {job} failed: {reason}")]
    EngineFailed {
        /// Which job failed.
        job: JobKind,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Full diagnostic reason, including captured stderr.
        reason: String,
    },

    /// The engine exceeded its wall-clock timeout and was killed.
    #[error("Engine {job} timed out after {elapsed_seconds}s")]
    EngineTimeout {
        /// Which job timed out.
        job: JobKind,
        /// Seconds elapsed when the process was killed.
        elapsed_seconds: u64,
    },

    /// The engine reported success but the output file is absent.
    #[error("Engine {job} reported success but did not create {path}")]
    OutputMissing {
        /// Which job ran.
        job: JobKind,
        /// Expected output path.
        path: PathBuf,
    },

    /// The engine output is smaller than the configured minimum.
    #[error("Engine {job} output is too small ({size} bytes): {path}")]
    OutputTooSmall {
        /// Which job ran.
        job: JobKind,
        /// Output path.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
    },

    // --- Workspace errors ---
    /// The request workspace could not be removed. Logged, never returned.
    #[error("Failed to remove workspace {path}: {source}")]
    Cleanup {
        /// Workspace root.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    // --- Generic errors ---
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tokio task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ConversionError {
    /// Classify the error into the request failure taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingInput { .. }
            | Self::InvalidUrl { .. }
            | Self::UnknownFormat
            | Self::PayloadTooLarge { .. } => FailureKind::Validation,
            Self::ManifestMissingBase | Self::InvalidReference { .. } => FailureKind::Parse,
            Self::FetchStatus { .. }
            | Self::FetchTransport { .. }
            | Self::ResourceTooLarge { .. } => FailureKind::Fetch,
            Self::EngineLaunch { .. } => FailureKind::ProcessLaunch,
            Self::EngineFailed { .. }
            | Self::EngineTimeout { .. }
            | Self::OutputMissing { .. }
            | Self::OutputTooSmall { .. } => FailureKind::Conversion,
            Self::Cleanup { .. } => FailureKind::Cleanup,
            Self::Io(_) | Self::Join(_) => FailureKind::Internal,
        }
    }

    /// Whether this is an engine timeout, as opposed to a nonzero exit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::EngineTimeout { .. })
    }

    /// A summary safe to hand to API clients.
    ///
    /// Carries exit codes and HTTP status text but never local filesystem
    /// paths or raw engine output.
    pub fn public_message(&self) -> String {
        match self {
            Self::EngineLaunch { .. } => "Conversion engine could not be started".to_string(),
            Self::EngineFailed { job, exit_code, .. } => match exit_code {
                Some(code) => format!("Engine {job} failed: engine exited with code {code}"),
                None => format!("Engine {job} failed: engine was terminated by a signal"),
            },
            Self::OutputMissing { job, .. } => {
                format!("Engine {job} did not produce an output file")
            }
            Self::OutputTooSmall { job, size, .. } => {
                format!("Engine {job} produced an unusable output ({size} bytes)")
            }
            Self::Cleanup { .. } | Self::Io(_) | Self::Join(_) => {
                "Internal error while processing request".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        let message = err.public_message();
        match err.kind() {
            FailureKind::Validation => AppError::validation(message),
            FailureKind::Parse => AppError::parse(message),
            FailureKind::Fetch => AppError::external_service(message),
            FailureKind::ProcessLaunch => AppError::engine_unavailable(message),
            FailureKind::Conversion if err.is_timeout() => AppError::timeout(message),
            FailureKind::Conversion => AppError::conversion(message),
            FailureKind::Cleanup | FailureKind::Internal => AppError::internal(message),
        }
    }
}
