//! Server error types.

use thiserror::Error;

use ironhex_core::error::GameError;

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised outside the rules engine.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket or file failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame that is not a valid packet.
    #[error("Malformed packet: {0}")]
    Codec(#[from] bincode::Error),

    /// A frame longer than the configured limit.
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// Config file not found.
    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    /// Config file is not valid RON.
    #[error("Failed to parse config: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Rejected by the rules engine.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The worker task has stopped.
    #[error("Game worker has shut down")]
    WorkerGone,
}
