//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use avatarforge_converter::ConversionPipeline;
use avatarforge_core::config::AppConfig;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Conversion pipeline (fetcher, engine, capability, metrics)
    pub pipeline: Arc<ConversionPipeline>,
    /// When the server started, for uptime reporting
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Bundle configuration and pipeline into handler state.
    pub fn new(config: AppConfig, pipeline: ConversionPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            started_at: Utc::now(),
        }
    }

    /// Seconds elapsed since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
