//! Error types for the rules engine.

use thiserror::Error;

use crate::entity::EntityId;
use crate::player::PlayerId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all rules-engine errors.
///
/// Inbound handlers return these for illegal input; the server logs and
/// drops them without replying to the client.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Invalid player reference.
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    /// The sender does not own the entity it tried to command.
    #[error("Player {player} does not own entity {entity}")]
    NotOwner {
        /// Player that sent the request.
        player: PlayerId,
        /// Entity referenced by the request.
        entity: EntityId,
    },

    /// The sender acted outside their turn.
    #[error("Player {0} acted out of turn")]
    OutOfTurn(PlayerId),

    /// The request is not accepted in the current phase.
    #[error("Request '{request}' not allowed during {phase}")]
    WrongPhase {
        /// Short description of the rejected request.
        request: &'static str,
        /// Phase the session was in.
        phase: crate::phase::Phase,
    },

    /// The request was well-formed but not legal.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Unknown or malformed game option.
    #[error("Invalid game option: {0}")]
    InvalidOption(String),

    /// Password check failed for a gated request.
    #[error("Password rejected")]
    PasswordRejected,

    /// A unit definition could not be turned into an entity.
    #[error("Invalid unit definition: {0}")]
    InvalidUnit(String),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
