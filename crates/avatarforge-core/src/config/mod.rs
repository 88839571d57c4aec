//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every section has defaults so an empty file is valid.

pub mod app;
pub mod engine;
pub mod fetch;
pub mod logging;
pub mod workspace;

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::app::ServerConfig;
use self::engine::EngineConfig;
use self::fetch::FetchConfig;
use self::logging::LoggingConfig;
use self::workspace::WorkspaceConfig;

use crate::error::AppError;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "AVATARFORGE";

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Conversion engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Per-request workspace settings.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Remote resource fetching settings.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration for a named environment.
    ///
    /// Merges `config/default.toml` with `config/{env}.toml` (both optional)
    /// and environment variables such as `AVATARFORGE__SERVER__PORT`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        Self::finish(builder)
    }

    /// Load configuration from one explicit file plus environment overrides.
    pub fn load_from(path: &str) -> Result<Self, AppError> {
        let builder =
            config::Config::builder().add_source(config::File::with_name(path).required(true));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Worst-case time one request may legitimately spend on engine and
    /// fetch work: the add-on enable step, a merge, a convert and one fetch.
    pub fn engine_budget_seconds(&self) -> u64 {
        self.engine
            .timeout_seconds
            .saturating_mul(2)
            .saturating_add(self.engine.enable_timeout_seconds)
            .saturating_add(self.fetch.request_timeout_seconds)
    }

    /// Validate the sections that carry range constraints, and the request
    /// timeout against the engine budget.
    pub fn validate(&self) -> Result<(), AppError> {
        self.engine.validate()?;

        let budget = self.engine_budget_seconds();
        if self.server.request_timeout_seconds <= budget {
            return Err(AppError::configuration(format!(
                "server.request_timeout_seconds ({}) must exceed the engine budget of {budget}s \
                 (2 x engine.timeout_seconds + engine.enable_timeout_seconds + fetch.request_timeout_seconds)",
                self.server.request_timeout_seconds
            )));
        }
        Ok(())
    }
}
