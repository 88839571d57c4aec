//! # avatarforge-core
//!
//! Core crate for AvatarForge. Contains the configuration schemas and the
//! unified error system shared by the converter, the HTTP API and the CLI.
//!
//! This crate has **no** internal dependencies on other AvatarForge crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
