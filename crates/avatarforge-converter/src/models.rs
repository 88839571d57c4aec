//! Domain models: engine jobs, engine results, request outcomes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an engine invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Single GLB in, VRM out.
    Convert,
    /// Base GLB plus overlays in, merged GLB out.
    Merge,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convert => f.write_str("conversion"),
            Self::Merge => f.write_str("merge"),
        }
    }
}

/// Driver scripts the engine can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverScript {
    /// GLB to VRM conversion.
    Convert,
    /// Overlay merge.
    Merge,
    /// One-time VRM add-on enablement.
    EnableAddon,
}

impl From<JobKind> for DriverScript {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Convert => DriverScript::Convert,
            JobKind::Merge => DriverScript::Merge,
        }
    }
}

/// One unit of work for the engine. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Request this job belongs to.
    pub request_id: Uuid,
    /// Convert or merge.
    pub kind: JobKind,
    /// Input files. For a merge the base comes first, then the overlays in
    /// manifest order.
    pub inputs: Vec<PathBuf>,
    /// Where the engine must write its result.
    pub output: PathBuf,
}

impl ConversionJob {
    /// A single-file GLB to VRM conversion.
    pub fn convert(request_id: Uuid, input: PathBuf, output: PathBuf) -> Self {
        Self {
            request_id,
            kind: JobKind::Convert,
            inputs: vec![input],
            output,
        }
    }

    /// A merge of `overlays` onto `base`, order preserved.
    pub fn merge(request_id: Uuid, base: PathBuf, output: PathBuf, overlays: Vec<PathBuf>) -> Self {
        let mut inputs = Vec::with_capacity(overlays.len() + 1);
        inputs.push(base);
        inputs.extend(overlays);
        Self {
            request_id,
            kind: JobKind::Merge,
            inputs,
            output,
        }
    }

    /// The base (or only) input.
    pub fn primary_input(&self) -> Option<&Path> {
        self.inputs.first().map(PathBuf::as_path)
    }

    /// Overlay inputs, empty for a plain conversion.
    pub fn overlays(&self) -> &[PathBuf] {
        self.inputs.get(1..).unwrap_or_default()
    }

    /// Positional arguments after the `--` separator.
    ///
    /// `[input, output]` for a conversion and
    /// `[base, output, overlay1..overlayN]` for a merge.
    pub fn positional_args(&self) -> Vec<PathBuf> {
        let mut args = Vec::with_capacity(self.inputs.len() + 1);
        if let Some(first) = self.inputs.first() {
            args.push(first.clone());
        }
        args.push(self.output.clone());
        args.extend(self.overlays().iter().cloned());
        args
    }
}

/// How an engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum EngineExit {
    /// Normal exit with a status code.
    Code(i32),
    /// Terminated by a signal outside our control.
    Signal,
    /// Killed by us after the wall-clock timeout.
    TimedOut,
}

/// Outcome of exactly one engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    /// Exit code 0.
    pub succeeded: bool,
    /// How the process ended.
    pub exit: EngineExit,
    /// Captured standard output (bounded).
    pub stdout: String,
    /// Captured standard error (bounded).
    pub stderr: String,
    /// Diagnostic reason when `succeeded` is false.
    pub failure_reason: Option<String>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
}

impl EngineResult {
    /// Whether the invocation hit the timeout.
    pub fn timed_out(&self) -> bool {
        self.exit == EngineExit::TimedOut
    }

    /// Exit code if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit {
            EngineExit::Code(code) => Some(code),
            _ => None,
        }
    }
}

/// Source type reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A binary GLB model.
    Glb,
    /// An MML manifest.
    Mml,
}

impl SourceType {
    /// Header-friendly name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Glb => "glb",
            Self::Mml => "mml",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished conversion, ready to hand back to the caller.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    /// Per-request identifier.
    pub request_id: Uuid,
    /// The converted VRM bytes.
    pub data: Bytes,
    /// What kind of source was resolved.
    pub source_type: SourceType,
    /// Total processing time.
    pub duration: Duration,
}
