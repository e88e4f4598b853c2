//! Wire messages.
//!
//! Clients send [`ClientPacket`]s; the session answers with
//! [`Envelope`]s, each a [`ServerPacket`] addressed to one or more
//! players. Packets are encoded with `bincode`; framing is the server's job.
//!
//! # Flow
//!
//! ```text
//! -> Identify { name }
//! <- Greeting { player }, then players, settings, entities and phase
//! -> AddEntity(unit) ... PlayerReady(true)            (lounge)
//! <- PhaseChange(Exchange), Board, Entities ...
//! <- Turn(GameTurn)                                    (action phases)
//! -> Move(path) | Attack(actions) | EntityReady(id)
//! <- EntityUpdate(..), Report(text), Turn(..) ...
//! ```

use serde::{Deserialize, Serialize};

use crate::action::{Action, MovementPath};
use crate::board::Board;
use crate::data::UnitData;
use crate::entity::{Entity, EntityId};
use crate::error::{GameError, Result};
use crate::options::{GameOptions, MapSettings, OptionChange};
use crate::phase::Phase;
use crate::player::{Player, PlayerId, PlayerSettings};
use crate::turns::GameTurn;

// ============================================================================
// Client -> Server
// ============================================================================

/// A request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientPacket {
    /// Set the player's name.
    Identify {
        /// Display name.
        name: String,
    },
    /// Change team, colour or starting position.
    UpdateSettings(PlayerSettings),
    /// Ready or not for the current phase.
    PlayerReady(bool),
    /// End an entity's turn without acting.
    EntityReady(EntityId),
    /// Chat line; a leading `/` runs a server command.
    Chat(String),
    /// Add a unit (lounge only).
    AddEntity(UnitData),
    /// Replace an owned unit's definition (lounge only).
    UpdateEntity {
        /// Unit to replace.
        entity: EntityId,
        /// New definition.
        unit: UnitData,
    },
    /// Remove an owned unit (lounge only).
    RemoveEntity(EntityId),
    /// Declare a movement.
    Move(MovementPath),
    /// Declare the attacks of one entity's turn.
    Attack {
        /// Acting entity.
        entity: EntityId,
        /// Declarations, possibly empty.
        actions: Vec<Action>,
    },
    /// Change game options.
    ChangeOptions {
        /// Server password, if one is set.
        password: Option<String>,
        /// Changes to apply.
        changes: Vec<OptionChange>,
    },
    /// Change the map (lounge only).
    ChangeMap(MapSettings),
}

impl ClientPacket {
    /// Short name for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientPacket::Identify { .. } => "identify",
            ClientPacket::UpdateSettings(_) => "update settings",
            ClientPacket::PlayerReady(_) => "player ready",
            ClientPacket::EntityReady(_) => "entity ready",
            ClientPacket::Chat(_) => "chat",
            ClientPacket::AddEntity(_) => "add entity",
            ClientPacket::UpdateEntity { .. } => "update entity",
            ClientPacket::RemoveEntity(_) => "remove entity",
            ClientPacket::Move(_) => "move",
            ClientPacket::Attack { .. } => "attack",
            ClientPacket::ChangeOptions { .. } => "change options",
            ClientPacket::ChangeMap(_) => "change map",
        }
    }
}

// ============================================================================
// Server -> Client
// ============================================================================

/// A message from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerPacket {
    /// Sent once on connect.
    Greeting {
        /// Id assigned to the connection.
        player: PlayerId,
    },
    /// Every player.
    Players(Vec<Player>),
    /// A player joined or changed.
    PlayerUpdate(Player),
    /// A player left.
    PlayerRemove(PlayerId),
    /// Ready flag changed.
    PlayerReady {
        /// Player.
        player: PlayerId,
        /// New flag.
        ready: bool,
    },
    /// Every entity the recipient may see.
    Entities(Vec<Entity>),
    /// A new entity.
    EntityAdd(Entity),
    /// An entity changed.
    EntityUpdate(Entity),
    /// An entity left play or view.
    EntityRemove(EntityId),
    /// The phase changed.
    PhaseChange(Phase),
    /// Whose turn it is.
    Turn(GameTurn),
    /// Round or phase report text.
    Report(String),
    /// Current game options.
    GameSettings(GameOptions),
    /// Current map settings.
    MapSettings(MapSettings),
    /// The board in play.
    Board(Board),
    /// Final per-unit report.
    EndOfGame {
        /// Report text.
        report: String,
        /// Winning player, if one.
        winner: Option<PlayerId>,
        /// Winning team, if one.
        team: Option<u8>,
    },
    /// Chat line.
    Chat(String),
}

/// Who receives a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connection.
    All,
    /// One player.
    Player(PlayerId),
    /// Everyone but one player.
    AllExcept(PlayerId),
}

impl Recipient {
    /// Whether a player receives packets sent to this recipient.
    #[must_use]
    pub const fn includes(self, player: PlayerId) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Player(p) => p == player,
            Recipient::AllExcept(p) => p != player,
        }
    }
}

/// An addressed packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination.
    pub recipient: Recipient,
    /// Payload.
    pub packet: ServerPacket,
}

impl Envelope {
    /// Packet for every connection.
    #[must_use]
    pub const fn all(packet: ServerPacket) -> Self {
        Self {
            recipient: Recipient::All,
            packet,
        }
    }

    /// Packet for one player.
    #[must_use]
    pub const fn to(player: PlayerId, packet: ServerPacket) -> Self {
        Self {
            recipient: Recipient::Player(player),
            packet,
        }
    }
}

/// Encode a packet.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(packet: &T) -> Result<Vec<u8>> {
    bincode::serialize(packet)
        .map_err(|e| GameError::InvalidState(format!("Failed to encode packet: {e}")))
}

/// Decode a packet.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid packet.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| GameError::InvalidState(format!("Failed to decode packet: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MoveStep;

    #[test]
    fn test_client_packet_survives_encoding() {
        let packet = ClientPacket::Move(MovementPath::new(3).repeat(MoveStep::Forward, 2));
        let bytes = encode(&packet).unwrap();
        assert_eq!(decode::<ClientPacket>(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode::<ServerPacket>(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }

    #[test]
    fn test_recipients() {
        assert!(Recipient::All.includes(4));
        assert!(Recipient::Player(4).includes(4));
        assert!(!Recipient::Player(4).includes(5));
        assert!(!Recipient::AllExcept(4).includes(4));
        assert!(Recipient::AllExcept(4).includes(5));
    }
}
