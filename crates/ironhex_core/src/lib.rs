//! # Ironhex Core
//!
//! Deterministic rules engine for turn-based armored hex combat.
//!
//! This crate contains **only** game logic:
//! - No sockets or file IO
//! - No system randomness (every roll goes through [`dice::Dice`])
//! - No floating-point math in geometry (uses fixed-point)
//!
//! This separation enables:
//! - An authoritative server that owns all game truth
//! - Scripted-dice tests of individual rules
//! - Determinism testing by state hash
//!
//! ## Crate Structure
//!
//! - [`session`] - The game session and its phase machine
//! - [`protocol`] - Client and server packets
//! - [`combat`] - Attack resolution, extended by [`movement`], [`heat`]
//!   and [`displacement`]
//! - [`to_hit`] - To-hit calculation
//! - [`damage`] - Damage allocation, criticals and ammo explosions
//! - [`piloting`] - Piloting skill rolls, falls and crew damage
//! - [`entity`] - Units and their state
//! - [`board`] / [`hex`] - Terrain and hex geometry
//! - [`data`] - Weapon tables and unit definitions

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod board;
pub mod combat;
pub mod damage;
pub mod data;
pub mod dice;
pub mod displacement;
pub mod entity;
pub mod error;
pub mod heat;
pub mod hex;
pub mod math;
pub mod movement;
pub mod options;
pub mod phase;
pub mod piloting;
pub mod player;
pub mod protocol;
pub mod report;
pub mod session;
pub mod to_hit;
pub mod turns;
pub mod visibility;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{Action, Arm, Leg, MoveStep, MovementPath};
    pub use crate::board::{Board, BoardData, Hex};
    pub use crate::data::UnitData;
    pub use crate::dice::{Dice, ScriptedDice, SeededDice};
    pub use crate::entity::{Entity, EntityId, EntityStorage, Location};
    pub use crate::error::{GameError, Result};
    pub use crate::hex::HexCoord;
    pub use crate::options::{BoardChoice, GameOptions, MapSettings, OptionChange};
    pub use crate::phase::Phase;
    pub use crate::player::{Player, PlayerId, PlayerSettings};
    pub use crate::protocol::{ClientPacket, Envelope, Recipient, ServerPacket};
    pub use crate::session::GameSession;
    pub use crate::turns::GameTurn;
}
