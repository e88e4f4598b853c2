//! Game options and map settings chosen in the lounge.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Rule switches for a session.
///
/// Options are addressed by name over the wire; see [`GameOptions::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GameOptions {
    /// End the game once one side is left standing.
    pub check_victory: bool,
    /// Allow attacks against allied units.
    pub friendly_fire: bool,
    /// Give no physical-phase turn to units with no possible attack.
    pub skip_ineligible_physical: bool,
    /// Pushing a unit off the board edge removes it from play.
    pub push_off_board: bool,
    /// Players only see enemy units in line of sight of their own.
    pub double_blind: bool,
    /// Flamers may add heat to the target instead of dealing damage.
    pub flamer_heat: bool,
    /// Targets that did not move are easier to hit.
    pub standing_still: bool,
    /// Units may sprint at twice walking speed.
    pub tactical_sprint: bool,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            check_victory: true,
            friendly_fire: false,
            skip_ineligible_physical: true,
            push_off_board: true,
            double_blind: false,
            flamer_heat: true,
            standing_still: false,
            tactical_sprint: false,
        }
    }
}

impl GameOptions {
    /// Every option name, in display order.
    pub const NAMES: [&'static str; 8] = [
        "check_victory",
        "friendly_fire",
        "skip_ineligible_physical",
        "push_off_board",
        "double_blind",
        "flamer_heat",
        "standing_still",
        "tactical_sprint",
    ];

    fn field_mut(&mut self, name: &str) -> Option<&mut bool> {
        Some(match name {
            "check_victory" => &mut self.check_victory,
            "friendly_fire" => &mut self.friendly_fire,
            "skip_ineligible_physical" => &mut self.skip_ineligible_physical,
            "push_off_board" => &mut self.push_off_board,
            "double_blind" => &mut self.double_blind,
            "flamer_heat" => &mut self.flamer_heat,
            "standing_still" => &mut self.standing_still,
            "tactical_sprint" => &mut self.tactical_sprint,
            _ => return None,
        })
    }

    /// Current value of an option.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<bool> {
        let mut copy = *self;
        copy.field_mut(name).map(|v| *v)
    }

    /// Set an option by name. Returns whether the value changed.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidOption`] for unknown names.
    pub fn set(&mut self, name: &str, value: bool) -> Result<bool> {
        let field = self
            .field_mut(name)
            .ok_or_else(|| GameError::InvalidOption(name.to_string()))?;
        let changed = *field != value;
        *field = value;
        Ok(changed)
    }
}

/// A requested option change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionChange {
    /// Option name.
    pub name: String,
    /// New value.
    pub value: bool,
}

impl OptionChange {
    /// Create a change.
    #[must_use]
    pub fn new(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Which board to play on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardChoice {
    /// A generated all-clear board.
    #[default]
    Blank,
    /// Any available board of the right size, chosen at Exchange.
    Random,
    /// A specific named board.
    Named(String),
}

/// Board size and selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Columns.
    pub width: i32,
    /// Rows.
    pub height: i32,
    /// Board selection.
    pub board: BoardChoice,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            width: 16,
            height: 17,
            board: BoardChoice::Blank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_by_name() {
        let mut options = GameOptions::default();
        assert_eq!(options.get("double_blind"), Some(false));
        assert!(options.set("double_blind", true).unwrap());
        assert!(options.double_blind);
        assert!(!options.set("double_blind", true).unwrap());
        assert!(matches!(
            options.set("laser_tag", true),
            Err(GameError::InvalidOption(_))
        ));
        assert_eq!(options.get("laser_tag"), None);
    }

    #[test]
    fn test_every_name_is_addressable() {
        let options = GameOptions::default();
        for name in GameOptions::NAMES {
            assert!(options.get(name).is_some(), "{name}");
        }
    }

    #[test]
    fn test_options_from_partial_ron() {
        let options: GameOptions = ron::from_str("(double_blind: true)").unwrap();
        assert!(options.double_blind);
        assert!(options.check_victory);
        let map: MapSettings = ron::from_str("(board: Named(\"river\"))").unwrap();
        assert_eq!(map.width, 16);
        assert_eq!(map.board, BoardChoice::Named("river".into()));
    }
}
