//! CLI command definitions and dispatch.

pub mod config;
pub mod convert;
pub mod detect;
pub mod engine;
pub mod parse;
pub mod serve;

use std::path::Path;

use clap::{Parser, Subcommand};

use avatarforge_core::config::AppConfig;
use avatarforge_core::AppResult;
use avatarforge_core::error::AppError;

use crate::output::OutputFormat;

/// Environment variable selecting the configuration overlay.
const ENV_VAR: &str = "AVATARFORGE_ENV";

/// AvatarForge: GLB and MML avatars to VRM
#[derive(Debug, Parser)]
#[command(name = "avatarforge", version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (defaults to config/default.toml plus
    /// the AVATARFORGE_ENV overlay)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect whether a file is a GLB model or an MML manifest
    Detect(detect::DetectArgs),
    /// Print the base model and overlays of an MML manifest
    Parse(parse::ParseArgs),
    /// Run the conversion pipeline locally
    Convert(convert::ConvertArgs),
    /// Show the discovered engine and enable the VRM add-on
    Engine(engine::EngineArgs),
    /// Start the HTTP server
    Serve(serve::ServeArgs),
    /// Configuration management
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> AppResult<()> {
        match &self.command {
            Commands::Detect(args) => detect::execute(args, self.format).await,
            Commands::Parse(args) => parse::execute(args, self.format).await,
            Commands::Convert(args) => convert::execute(args, self.config.as_deref()).await,
            Commands::Engine(args) => engine::execute(args, self.config.as_deref()).await,
            Commands::Serve(args) => serve::execute(args, self.config.as_deref()).await,
            Commands::Config(args) => config::execute(args, self.config.as_deref()).await,
        }
    }
}

/// Helper: load configuration from an explicit file or the environment.
pub fn load_config(config_path: Option<&str>) -> AppResult<AppConfig> {
    match config_path {
        Some(path) => AppConfig::load_from(path),
        None => {
            let env = std::env::var(ENV_VAR).unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Helper: read a local file, mapping IO failures to validation errors.
pub async fn read_input(path: &Path) -> AppResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        AppError::validation(format!("Failed to read '{}': {}", path.display(), e))
    })
}
