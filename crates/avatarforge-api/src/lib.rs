//! # avatarforge-api
//!
//! HTTP API layer for AvatarForge built on Axum.
//!
//! Exposes the conversion endpoints, the health and service description
//! endpoints, middleware (CORS, compression, request logging, body limits)
//! and the mapping from domain errors to HTTP responses.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
