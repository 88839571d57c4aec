//! Application builder: wires the pipeline, state and router together and
//! serves them.

use tokio::net::TcpListener;

use avatarforge_converter::ConversionPipeline;
use avatarforge_core::config::AppConfig;
use avatarforge_core::error::AppError;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application from configuration.
pub fn build_app(config: AppConfig) -> Result<axum::Router, AppError> {
    let pipeline = ConversionPipeline::from_config(&config)?;
    Ok(build_router(AppState::new(config, pipeline)))
}

/// Runs the AvatarForge server until a shutdown signal arrives.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting AvatarForge server...");

    tokio::fs::create_dir_all(config.workspace.effective_temp_root())
        .await
        .map_err(|e| {
            AppError::with_source(
                avatarforge_core::error::ErrorKind::Configuration,
                "Failed to create the workspace temp root",
                e,
            )
        })?;

    let addr = config.server.bind_address();
    let app = build_app(config)?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(address = %addr, "AvatarForge server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    tracing::info!("AvatarForge server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
