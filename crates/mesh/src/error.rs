//! Error types for mesh engine operations.

use crate::link::LinkError;
use thiserror::Error;

/// Errors surfaced by the engine's host API.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Configuration rejected at init; nothing was allocated.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The link layer refused to come up or cannot carry our frames.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// A send argument failed admission checks.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The work queue is over half full; retry later.
    #[error("engine busy: work queue over half full")]
    Busy,

    /// The engine has been shut down.
    #[error("engine is not running")]
    NotRunning,

    /// Internal failure (worker spawn, enqueue timeout).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
