//! AvatarForge Server: GLB and MML avatars to VRM over HTTP.
//!
//! Main entry point that loads configuration, sets up logging and starts
//! the server.

use tracing_subscriber::{EnvFilter, fmt};

use avatarforge_core::config::AppConfig;
use avatarforge_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment.
///
/// `AVATARFORGE_CONFIG` names an explicit file; otherwise
/// `config/default.toml` is overlaid with `config/<AVATARFORGE_ENV>.toml`.
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("AVATARFORGE_CONFIG") {
        Ok(path) => AppConfig::load_from(&path),
        Err(_) => {
            let env =
                std::env::var("AVATARFORGE_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind_address(),
        engine_timeout_s = config.engine.timeout_seconds,
        "Starting AvatarForge"
    );

    avatarforge_api::run_server(config).await
}
