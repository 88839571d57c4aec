//! Convenience result type alias for AvatarForge.

use crate::error::AppError;

/// A specialized `Result` type for AvatarForge operations.
pub type AppResult<T> = Result<T, AppError>;
