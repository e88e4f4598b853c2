//! Participants in a session.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::dice::Dice;

/// Stable player identifier, assigned per connection.
pub type PlayerId = u32;

/// Number of distinct starting positions around the board edge.
pub const STARTING_POSITIONS: u8 = 8;

/// Number of colours a player may pick from.
pub const PLAYER_COLOURS: u8 = 12;

/// Initiative roll history for one round.
///
/// The first roll is the round's roll; every later entry is a re-roll
/// made to break a tie. Histories compare lexicographically, lowest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Initiative {
    rolls: Vec<i32>,
}

impl Initiative {
    /// Forget all rolls.
    pub fn clear(&mut self) {
        self.rolls.clear();
    }

    /// Append a fresh 2d6 roll.
    pub fn add_roll(&mut self, dice: &mut dyn Dice) {
        self.rolls.push(dice.roll_2d6());
    }

    /// Rolls made this round.
    #[must_use]
    pub fn rolls(&self) -> &[i32] {
        &self.rolls
    }

    /// Whether no roll has been made.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rolls.is_empty()
    }
}

impl PartialOrd for Initiative {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Initiative {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rolls.cmp(&other.rolls)
    }
}

/// Settings a player chooses in the lounge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Team; `None` fights alone.
    pub team: Option<u8>,
    /// Colour index, unique among players.
    pub colour: u8,
    /// Starting position around the board, `0..STARTING_POSITIONS`.
    pub start_position: u8,
}

/// A participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Lounge settings.
    pub settings: PlayerSettings,
    /// This round's initiative.
    pub initiative: Initiative,
    /// Done with the current phase or turn.
    pub ready: bool,
    /// Disconnected but still owns live entities.
    pub ghost: bool,
}

impl Player {
    /// Create a connected player.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            settings: PlayerSettings::default(),
            initiative: Initiative::default(),
            ready: false,
            ghost: false,
        }
    }

    /// Builder: set the team.
    #[must_use]
    pub const fn with_team(mut self, team: u8) -> Self {
        self.settings.team = Some(team);
        self
    }

    /// Whether two players fight on the same side.
    #[must_use]
    pub fn is_ally_of(&self, other: &Self) -> bool {
        self.id == other.id
            || matches!((self.settings.team, other.settings.team), (Some(a), Some(b)) if a == b)
    }

    /// Initiative history in report format, `"11 / 4"`.
    #[must_use]
    pub fn initiative_text(&self) -> String {
        self.initiative
            .rolls()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::ScriptedDice;

    #[test]
    fn test_initiative_orders_lexicographically() {
        let mut dice = ScriptedDice::new([7, 9, 7, 3]);
        let mut a = Initiative::default();
        let mut b = Initiative::default();
        a.add_roll(&mut dice);
        b.add_roll(&mut dice);
        assert!(a < b);

        let mut c = Initiative::default();
        c.add_roll(&mut dice);
        assert_eq!(a, c);
        c.add_roll(&mut dice);
        assert!(a < c);
    }

    #[test]
    fn test_allies() {
        let a = Player::new(1, "Alice").with_team(1);
        let b = Player::new(2, "Bob").with_team(1);
        let c = Player::new(3, "Carol");
        let d = Player::new(4, "Dave");
        assert!(a.is_ally_of(&b));
        assert!(!a.is_ally_of(&c));
        assert!(!c.is_ally_of(&d));
        assert!(c.is_ally_of(&c));
    }

    #[test]
    fn test_initiative_text() {
        let mut dice = ScriptedDice::new([11, 4]);
        let mut player = Player::new(1, "Alice");
        player.initiative.add_roll(&mut dice);
        player.initiative.add_roll(&mut dice);
        assert_eq!(player.initiative_text(), "11 / 4");
    }
}
