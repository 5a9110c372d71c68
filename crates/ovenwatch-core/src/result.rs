//! Convenience result type alias for ovenwatch.

use crate::error::AppError;

/// A specialized `Result` type for ovenwatch operations.
pub type AppResult<T> = Result<T, AppError>;
