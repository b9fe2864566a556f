//! Construction-time errors

use thiserror::Error;

/// A pipeline could not be assembled
///
/// Raised while building, never from [`Pipeline::run`](crate::execution::Pipeline::run).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("pipeline has no stages")]
    Empty,

    #[error("pipeline has no terminal stage")]
    MissingTerminal,

    #[error("terminal stage at position {index} must be last (pipeline has {len} stages)")]
    TerminalNotLast { index: usize, len: usize },

    #[error("invalid pipeline settings: {0}")]
    InvalidSettings(String),

    #[error("failed to parse pipeline settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read pipeline settings: {0}")]
    Io(#[from] std::io::Error),
}
