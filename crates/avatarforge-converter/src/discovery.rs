//! Blender executable discovery and validation.
//!
//! Locates the Blender executable by checking, in order:
//! 1. The explicitly configured `engine.blender_path`
//! 2. The `BLENDER_PATH` environment variable
//! 3. Common installation directories for the current platform
//! 4. The system PATH
//!
//! When nothing is found the bare command name is used and a launch failure
//! surfaces at request time instead of at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable that overrides the engine location.
pub const BLENDER_PATH_ENV: &str = "BLENDER_PATH";

/// Executable name searched for in directories.
#[cfg(windows)]
const BLENDER_EXECUTABLE: &str = "blender.exe";
#[cfg(not(windows))]
const BLENDER_EXECUTABLE: &str = "blender";

/// Command name used when discovery finds nothing.
const FALLBACK_COMMAND: &str = "blender";

/// Errors from engine discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The given path does not exist.
    #[error("Blender path does not exist: {path}")]
    NotFound {
        /// The path that was checked.
        path: PathBuf,
    },

    /// The directory exists but holds no Blender executable.
    #[error("Directory {dir} does not contain {executable}")]
    ExecutableMissing {
        /// The directory that was searched.
        dir: PathBuf,
        /// The expected executable name.
        executable: String,
    },

    /// The file exists but is unusable.
    #[error("Blender executable at {path} is unusable: {reason}")]
    Unusable {
        /// The file that was checked.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}

/// A resolved engine executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlenderInstallation {
    /// Program handed to the process spawner.
    pub executable: PathBuf,
    /// How the executable was found.
    pub discovery_method: DiscoveryMethod,
}

/// How the engine executable was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    /// Explicitly configured by the operator.
    ExplicitConfig,
    /// Taken from the `BLENDER_PATH` environment variable.
    Environment,
    /// Found in a common installation directory.
    CommonPath,
    /// Found via the system PATH environment variable.
    SystemPath,
    /// Nothing found; the bare command name is used.
    Fallback,
}

/// Blender executable discovery.
pub struct BlenderDiscovery;

impl BlenderDiscovery {
    /// Resolve the engine executable. Never fails.
    ///
    /// An unusable explicit path is logged and discovery continues with the
    /// remaining sources.
    pub fn resolve(configured: &Path) -> BlenderInstallation {
        if !configured.as_os_str().is_empty() {
            match Self::from_explicit_path(configured, DiscoveryMethod::ExplicitConfig) {
                Ok(installation) => {
                    info!(
                        path = %installation.executable.display(),
                        "Using configured Blender executable"
                    );
                    return installation;
                }
                Err(e) => {
                    warn!(error = %e, "Configured Blender path is unusable, discovering");
                }
            }
        }

        let env_value = std::env::var_os(BLENDER_PATH_ENV).map(PathBuf::from);
        Self::discover(env_value.as_deref())
    }

    /// Discover from the environment value (if any), common paths and PATH.
    pub fn discover(env_value: Option<&Path>) -> BlenderInstallation {
        if let Some(path) = env_value.filter(|p| !p.as_os_str().is_empty()) {
            match Self::from_explicit_path(path, DiscoveryMethod::Environment) {
                Ok(installation) => {
                    info!(
                        path = %installation.executable.display(),
                        "Found Blender via {}", BLENDER_PATH_ENV
                    );
                    return installation;
                }
                Err(e) => {
                    debug!(error = %e, "{} is unusable, trying fallbacks", BLENDER_PATH_ENV);
                }
            }
        }

        if let Some(installation) = Self::discover_from_common_paths() {
            info!(
                path = %installation.executable.display(),
                "Found Blender in common installation path"
            );
            return installation;
        }

        if let Some(installation) = Self::discover_from_path() {
            info!(
                path = %installation.executable.display(),
                "Found Blender in system PATH"
            );
            return installation;
        }

        warn!(
            command = FALLBACK_COMMAND,
            "Blender not found, relying on the bare command name"
        );
        BlenderInstallation {
            executable: PathBuf::from(FALLBACK_COMMAND),
            discovery_method: DiscoveryMethod::Fallback,
        }
    }

    /// Build an installation from a path that names the executable or a
    /// directory containing it.
    pub fn from_explicit_path(
        path: &Path,
        method: DiscoveryMethod,
    ) -> Result<BlenderInstallation, DiscoveryError> {
        if !path.exists() {
            return Err(DiscoveryError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let executable = if path.is_dir() {
            Self::find_executable(path).ok_or_else(|| DiscoveryError::ExecutableMissing {
                dir: path.to_path_buf(),
                executable: BLENDER_EXECUTABLE.to_string(),
            })?
        } else {
            path.to_path_buf()
        };

        Self::validate(&executable)?;

        Ok(BlenderInstallation {
            executable,
            discovery_method: method,
        })
    }

    /// Check that a candidate executable is a non-empty file.
    pub fn validate(executable: &Path) -> Result<(), DiscoveryError> {
        let metadata = std::fs::metadata(executable).map_err(|e| DiscoveryError::Unusable {
            path: executable.to_path_buf(),
            reason: format!("cannot read metadata: {e}"),
        })?;

        if !metadata.is_file() {
            return Err(DiscoveryError::Unusable {
                path: executable.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }
        if metadata.len() == 0 {
            return Err(DiscoveryError::Unusable {
                path: executable.to_path_buf(),
                reason: "file is empty".to_string(),
            });
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(DiscoveryError::Unusable {
                    path: executable.to_path_buf(),
                    reason: "not executable".to_string(),
                });
            }
        }

        Ok(())
    }

    fn discover_from_common_paths() -> Option<BlenderInstallation> {
        Self::common_install_paths()
            .into_iter()
            .filter(|dir| dir.is_dir())
            .find_map(|dir| Self::find_executable(&dir))
            .map(|executable| BlenderInstallation {
                executable,
                discovery_method: DiscoveryMethod::CommonPath,
            })
    }

    /// Common installation directory candidates for this platform.
    fn common_install_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(windows)]
        {
            if let Ok(pf) = std::env::var("ProgramFiles") {
                let foundation = PathBuf::from(&pf).join("Blender Foundation");
                for version in ["Blender 4.2", "Blender 4.1", "Blender 4.0", "Blender 3.6"] {
                    paths.push(foundation.join(version));
                }
                paths.push(foundation);
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/Applications/Blender.app/Contents/MacOS"));
        }

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            paths.push(PathBuf::from("/usr/bin"));
            paths.push(PathBuf::from("/usr/local/bin"));
            paths.push(PathBuf::from("/opt/blender"));
            paths.push(PathBuf::from("/snap/bin"));
        }

        paths
    }

    fn discover_from_path() -> Option<BlenderInstallation> {
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(BLENDER_EXECUTABLE))
            .find(|candidate| candidate.is_file())
            .map(|executable| BlenderInstallation {
                executable,
                discovery_method: DiscoveryMethod::SystemPath,
            })
    }

    /// Look for the executable directly in `dir` or one level below it
    /// (versioned folders such as `blender-4.2.0-linux-x64`).
    fn find_executable(dir: &Path) -> Option<PathBuf> {
        let direct = dir.join(BLENDER_EXECUTABLE);
        if direct.is_file() {
            return Some(direct);
        }

        let entries = std::fs::read_dir(dir).ok()?;
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .map(|path| path.join(BLENDER_EXECUTABLE))
            .find(|candidate| candidate.is_file())
    }

    /// Expected executable file name on this platform.
    pub fn executable_filename() -> &'static str {
        BLENDER_EXECUTABLE
    }
}
