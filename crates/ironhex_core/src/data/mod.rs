//! Static rules data.
//!
//! Pure tables and data-driven definitions: weapon statistics, chassis
//! construction tables and unit definitions deserialized from RON or sent
//! over the wire.
//!
//! **Note:** This module contains no IO. The parsers below take file
//! contents; reading files is left to `ironhex_server` and `ironhex_tools`.

mod structure;
mod unit_data;
mod weapons;

pub use structure::{internal_structure, max_armor, slot_count, system_layout};
pub use unit_data::{ArmorData, CrewData, MountData, UnitData};
pub use weapons::{
    cluster_hits, weapon_type, RangeBands, RangeBracket, WeaponDamage, WeaponTags, WeaponType,
    WEAPONS,
};

use crate::board::{Board, BoardData};
use crate::error::{GameError, Result};

/// Parse a RON unit definition. `path` only labels errors.
///
/// # Errors
///
/// Returns [`GameError::DataParseError`] if the text is not a valid unit.
pub fn parse_unit(source: &str, path: &str) -> Result<UnitData> {
    ron::from_str(source).map_err(|e| GameError::DataParseError {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Parse a RON board and build it.
///
/// # Errors
///
/// Returns [`GameError::DataParseError`] if the text is not valid board
/// data, or the board's own error if the data describes an invalid board.
pub fn parse_board(source: &str, path: &str) -> Result<Board> {
    let data: BoardData = ron::from_str(source).map_err(|e| GameError::DataParseError {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Board::from_data(&data)
}
