//! CLI error types.

use claw_suppress::SuppressError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// The engine rejected or failed the operation.
    #[error(transparent)]
    Suppress(#[from] SuppressError),
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
