//! Headless Blender invocation.
//!
//! Runs the engine as a child process with the argument contract
//! `[--background, --python, <script>, --, path...]`, drains stdout and stderr
//! concurrently with waiting for exit, and enforces a wall-clock timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use avatarforge_core::config::engine::EngineConfig;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, instrument, warn};

use crate::discovery::{BlenderDiscovery, BlenderInstallation};
use crate::error::ConversionError;
use crate::models::{ConversionJob, DriverScript, EngineExit, EngineResult};

/// How long captured streams may keep draining after the process exited.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Characters of stderr carried in a failure reason.
const REASON_STDERR_CHARS: usize = 2000;

/// Runs conversion jobs on an engine.
#[async_trait]
pub trait EngineRunner: Send + Sync {
    /// Run exactly one engine process for `job`.
    ///
    /// Only a launch failure is an `Err`; every process that started yields
    /// an [`EngineResult`], including timeouts.
    async fn run(&self, job: &ConversionJob) -> Result<EngineResult, ConversionError>;

    /// Run the one-time capability enable script.
    async fn enable_capability(&self) -> Result<EngineResult, ConversionError>;
}

/// Turn an unsuccessful [`EngineResult`] into the matching error.
pub fn ensure_success(job: &ConversionJob, result: &EngineResult) -> Result<(), ConversionError> {
    if result.succeeded {
        return Ok(());
    }
    if result.timed_out() {
        return Err(ConversionError::EngineTimeout {
            job: job.kind,
            elapsed_seconds: result.duration_ms / 1000,
        });
    }
    Err(ConversionError::EngineFailed {
        job: job.kind,
        exit_code: result.exit_code(),
        reason: result
            .failure_reason
            .clone()
            .unwrap_or_else(|| "engine failed".to_string()),
    })
}

/// Resolved driver script locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverScripts {
    /// GLB to VRM conversion script.
    pub convert: PathBuf,
    /// Overlay merge script.
    pub merge: PathBuf,
    /// Add-on enable script.
    pub enable_addon: PathBuf,
}

impl DriverScripts {
    /// Resolve script names against the configured scripts directory.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            convert: config.scripts_dir.join(&config.convert_script),
            merge: config.scripts_dir.join(&config.merge_script),
            enable_addon: config.scripts_dir.join(&config.enable_addon_script),
        }
    }

    /// Path for a script.
    pub fn get(&self, script: DriverScript) -> &Path {
        match script {
            DriverScript::Convert => &self.convert,
            DriverScript::Merge => &self.merge,
            DriverScript::EnableAddon => &self.enable_addon,
        }
    }
}

/// Blender engine invoker.
#[derive(Debug, Clone)]
pub struct BlenderEngine {
    installation: BlenderInstallation,
    scripts: DriverScripts,
    timeout: Duration,
    enable_timeout: Duration,
    max_captured_bytes: usize,
}

impl BlenderEngine {
    /// Create an engine for an already resolved installation.
    pub fn new(installation: BlenderInstallation, config: &EngineConfig) -> Self {
        Self {
            installation,
            scripts: DriverScripts::from_config(config),
            timeout: Duration::from_secs(config.timeout_seconds),
            enable_timeout: Duration::from_secs(config.enable_timeout_seconds),
            max_captured_bytes: config.max_captured_bytes,
        }
    }

    /// Resolve the executable via discovery, then create the engine.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(BlenderDiscovery::resolve(&config.blender_path), config)
    }

    /// The resolved installation.
    pub fn installation(&self) -> &BlenderInstallation {
        &self.installation
    }

    /// Driver script locations.
    pub fn scripts(&self) -> &DriverScripts {
        &self.scripts
    }

    /// Per-job wall-clock timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full argument vector for a script and its positional paths.
    pub fn build_args(script: &Path, positional: &[PathBuf]) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec![
            "--background".into(),
            "--python".into(),
            script.as_os_str().to_owned(),
            "--".into(),
        ];
        args.extend(positional.iter().map(|p| p.as_os_str().to_owned()));
        args
    }

    /// Spawn the engine and wait for it, bounded by `timeout`.
    async fn invoke(
        &self,
        script: &Path,
        positional: &[PathBuf],
        timeout: Duration,
    ) -> Result<EngineResult, ConversionError> {
        let program = &self.installation.executable;
        let mut cmd = tokio::process::Command::new(program);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.args(Self::build_args(script, positional))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %program.display(),
            script = %script.display(),
            timeout_s = timeout.as_secs(),
            "Spawning engine process"
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| {
            error!(program = %program.display(), error = %source, "Failed to launch engine");
            ConversionError::EngineLaunch {
                program: program.clone(),
                source,
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| StreamCapture::spawn(out, "stdout", self.max_captured_bytes));
        let stderr = child
            .stderr
            .take()
            .map(|err| StreamCapture::spawn(err, "stderr", self.max_captured_bytes));

        // Race: process completion vs timeout
        let exit = tokio::select! {
            status = child.wait() => {
                let status = status?;
                match status.code() {
                    Some(code) => EngineExit::Code(code),
                    None => EngineExit::Signal,
                }
            }
            _ = tokio::time::sleep(timeout) => {
                warn!(
                    timeout_s = timeout.as_secs(),
                    "Engine process timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    error!(error = %e, "Failed to kill engine process");
                }
                EngineExit::TimedOut
            }
        };

        let stdout = match stdout {
            Some(capture) => capture.finish().await,
            None => String::new(),
        };
        let stderr = match stderr {
            Some(capture) => capture.finish().await,
            None => String::new(),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let failure_reason = match exit {
            EngineExit::Code(0) => None,
            EngineExit::Code(code) => Some(format!(
                "engine exited with code {code}: {}",
                tail(&stderr, REASON_STDERR_CHARS)
            )),
            EngineExit::Signal => Some(format!(
                "engine was terminated by a signal: {}",
                tail(&stderr, REASON_STDERR_CHARS)
            )),
            EngineExit::TimedOut => Some(format!(
                "engine timed out after {}s and was killed",
                timeout.as_secs()
            )),
        };

        let result = EngineResult {
            succeeded: exit == EngineExit::Code(0),
            exit,
            stdout,
            stderr,
            failure_reason,
            duration_ms,
        };

        if result.succeeded {
            info!(elapsed_ms = duration_ms, "Engine process completed");
        } else {
            error!(
                elapsed_ms = duration_ms,
                exit_code = ?result.exit_code(),
                timed_out = result.timed_out(),
                reason = result.failure_reason.as_deref().unwrap_or_default(),
                "Engine process failed"
            );
        }

        Ok(result)
    }
}

#[async_trait]
impl EngineRunner for BlenderEngine {
    #[instrument(skip(self, job), fields(request_id = %job.request_id, job = %job.kind))]
    async fn run(&self, job: &ConversionJob) -> Result<EngineResult, ConversionError> {
        let script = self.scripts.get(job.kind.into());
        self.invoke(script, &job.positional_args(), self.timeout)
            .await
    }

    #[instrument(skip(self))]
    async fn enable_capability(&self) -> Result<EngineResult, ConversionError> {
        self.invoke(&self.scripts.enable_addon, &[], self.enable_timeout)
            .await
    }
}

/// Last `max_chars` characters of `text`, trimmed.
fn tail(text: &str, max_chars: usize) -> &str {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    text.char_indices()
        .nth(skip)
        .map_or(text, |(idx, _)| &text[idx..])
}

/// Background drain of one child stream into a bounded buffer.
struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl StreamCapture {
    fn spawn<R>(reader: R, stream: &'static str, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let handle = tokio::spawn(async move {
            let mut chunks = ReaderStream::new(reader);
            let mut truncated = false;
            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        debug!(stream = stream, error = %e, "Engine stream read failed");
                        break;
                    }
                };
                debug!(
                    stream = stream,
                    text = %String::from_utf8_lossy(&chunk).trim_end(),
                    "Engine output"
                );

                let mut buf = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let room = limit.saturating_sub(buf.len());
                if room < chunk.len() && !truncated {
                    truncated = true;
                    debug!(
                        stream = stream,
                        limit = limit,
                        "Engine output exceeds capture limit, truncating"
                    );
                }
                buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
        });

        Self { buffer, handle }
    }

    /// Wait for the drain to reach EOF, bounded by [`DRAIN_GRACE`].
    async fn finish(mut self) -> String {
        if tokio::time::timeout(DRAIN_GRACE, &mut self.handle)
            .await
            .is_err()
        {
            warn!("Engine stream still open after exit, abandoning drain");
            self.handle.abort();
        }
        let buf = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryMethod;
    use crate::error::FailureKind;
    use crate::models::JobKind;
    use uuid::Uuid;

    fn config(timeout_seconds: u64, scripts_dir: &Path) -> EngineConfig {
        EngineConfig {
            scripts_dir: scripts_dir.to_path_buf(),
            timeout_seconds,
            max_captured_bytes: 1024,
            ..EngineConfig::default()
        }
    }

    fn engine_at(program: PathBuf, config: &EngineConfig) -> BlenderEngine {
        BlenderEngine::new(
            BlenderInstallation {
                executable: program,
                discovery_method: DiscoveryMethod::ExplicitConfig,
            },
            config,
        )
    }

    #[cfg(unix)]
    fn fake_engine(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-blender");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    #[test]
    fn test_build_args_contract() {
        let args = BlenderEngine::build_args(
            Path::new("scripts/merge_glb_files.py"),
            &[
                PathBuf::from("base.glb"),
                PathBuf::from("merged.glb"),
                PathBuf::from("model_0.glb"),
            ],
        );
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            args,
            vec![
                "--background",
                "--python",
                "scripts/merge_glb_files.py",
                "--",
                "base.glb",
                "merged.glb",
                "model_0.glb",
            ]
        );
    }

    #[test]
    fn test_scripts_resolve_against_dir() {
        let scripts = DriverScripts::from_config(&EngineConfig::default());
        assert_eq!(
            scripts.get(DriverScript::Convert),
            Path::new("blender_scripts/convert_glb_to_vrm.py")
        );
        assert_eq!(
            scripts.get(DriverScript::EnableAddon),
            Path::new("blender_scripts/enable_vrm_addon.py")
        );
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("  abc  ", 10), "abc");
        assert_eq!(tail("abcdef", 3), "def");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = config(5, temp.path());
        let engine = engine_at(temp.path().join("no-such-blender"), &cfg);
        let job = ConversionJob::convert(
            Uuid::new_v4(),
            temp.path().join("input.glb"),
            temp.path().join("output.vrm"),
        );
        let err = engine.run(&job).await.expect_err("launch must fail");
        assert_eq!(err.kind(), FailureKind::ProcessLaunch);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_passes_argv_and_captures_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let argv_file = temp.path().join("argv.txt");
        let program = fake_engine(
            temp.path(),
            &format!(
                "printf '%s\\n' \"$@\" > '{}'\necho converting\necho warning >&2\nexit 0",
                argv_file.display()
            ),
        );
        let cfg = config(5, temp.path());
        let engine = engine_at(program, &cfg);
        let job = ConversionJob::convert(
            Uuid::new_v4(),
            PathBuf::from("/w/input.glb"),
            PathBuf::from("/w/output.vrm"),
        );

        let result = engine.run(&job).await.expect("run");
        assert!(result.succeeded);
        assert_eq!(result.exit, EngineExit::Code(0));
        assert!(result.failure_reason.is_none());
        assert_eq!(result.stdout.trim(), "converting");
        assert_eq!(result.stderr.trim(), "warning");

        let argv = std::fs::read_to_string(&argv_file).expect("argv");
        let lines: Vec<&str> = argv.lines().collect();
        let script = temp.path().join("convert_glb_to_vrm.py");
        assert_eq!(
            lines,
            vec![
                "--background",
                "--python",
                script.to_str().expect("utf8"),
                "--",
                "/w/input.glb",
                "/w/output.vrm",
            ]
        );
        assert!(ensure_success(&job, &result).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_code_and_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = fake_engine(temp.path(), "echo 'VRM addon missing' >&2\nexit 3");
        let cfg = config(5, temp.path());
        let engine = engine_at(program, &cfg);
        let job = ConversionJob::convert(
            Uuid::new_v4(),
            temp.path().join("input.glb"),
            temp.path().join("output.vrm"),
        );

        let result = engine.run(&job).await.expect("run");
        assert!(!result.succeeded);
        assert_eq!(result.exit_code(), Some(3));
        let reason = result.failure_reason.clone().expect("reason");
        assert!(reason.contains('3'));
        assert!(reason.contains("VRM addon missing"));

        let err = ensure_success(&job, &result).expect_err("failure");
        assert!(matches!(
            err,
            ConversionError::EngineFailed {
                job: JobKind::Convert,
                exit_code: Some(3),
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pid_file = temp.path().join("engine.pid");
        let program = fake_engine(
            temp.path(),
            &format!(
                "echo $$ > '{}'\necho started\nexec sleep 30",
                pid_file.display()
            ),
        );
        let cfg = config(1, temp.path());
        let engine = engine_at(program, &cfg);
        let job = ConversionJob::convert(
            Uuid::new_v4(),
            temp.path().join("input.glb"),
            temp.path().join("output.vrm"),
        );

        let start = Instant::now();
        let result = engine.run(&job).await.expect("run");
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(!result.succeeded);
        assert!(result.timed_out());
        assert_eq!(result.exit_code(), None);
        assert_eq!(result.stdout.trim(), "started");

        let err = ensure_success(&job, &result).expect_err("timeout");
        assert!(err.is_timeout());

        let pid = std::fs::read_to_string(&pid_file).expect("pid file");
        let proc_entry = Path::new("/proc").join(pid.trim());
        assert!(!proc_entry.exists(), "engine process {} still running", pid.trim());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_termination_is_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = fake_engine(temp.path(), "kill -9 $$");
        let cfg = config(5, temp.path());
        let engine = engine_at(program, &cfg);
        let job = ConversionJob::convert(
            Uuid::new_v4(),
            temp.path().join("input.glb"),
            temp.path().join("output.vrm"),
        );

        let result = engine.run(&job).await.expect("run");
        assert!(!result.succeeded);
        assert_eq!(result.exit, EngineExit::Signal);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captured_output_is_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = fake_engine(
            temp.path(),
            "i=0\nwhile [ $i -lt 200 ]; do echo 0123456789012345678901234567890123456789; i=$((i+1)); done\nexit 0",
        );
        let cfg = config(5, temp.path());
        let engine = engine_at(program, &cfg);
        let job = ConversionJob::convert(
            Uuid::new_v4(),
            temp.path().join("input.glb"),
            temp.path().join("output.vrm"),
        );

        let result = engine.run(&job).await.expect("run");
        assert!(result.succeeded);
        assert_eq!(result.stdout.len(), 1024);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enable_capability_runs_addon_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let program = fake_engine(temp.path(), "echo \"$3\"\nexit 0");
        let cfg = config(5, temp.path());
        let engine = engine_at(program, &cfg);

        let result = engine.enable_capability().await.expect("run");
        assert!(result.succeeded);
        assert!(result.stdout.trim().ends_with("enable_vrm_addon.py"));
    }
}
