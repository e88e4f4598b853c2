//! The hex map: terrain, bounds and line of sight.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::hex::HexCoord;

/// Terrain of a single hex.
///
/// Woods and jungle levels are 1 (light), 2 (heavy) or 3 (ultra-heavy).
/// Water and rubble store depth/level, 0 meaning absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hex {
    /// Ground level.
    #[serde(default)]
    pub elevation: i32,
    /// Woods level.
    #[serde(default)]
    pub woods: u8,
    /// Jungle level.
    #[serde(default)]
    pub jungle: u8,
    /// Water depth.
    #[serde(default)]
    pub water: u8,
    /// Rubble level.
    #[serde(default)]
    pub rubble: u8,
}

impl Hex {
    /// Plain clear hex at the given elevation.
    #[must_use]
    pub const fn clear(elevation: i32) -> Self {
        Self {
            elevation,
            woods: 0,
            jungle: 0,
            water: 0,
            rubble: 0,
        }
    }

    /// Builder: set woods level.
    #[must_use]
    pub const fn with_woods(mut self, level: u8) -> Self {
        self.woods = level;
        self
    }

    /// Builder: set jungle level.
    #[must_use]
    pub const fn with_jungle(mut self, level: u8) -> Self {
        self.jungle = level;
        self
    }

    /// Builder: set water depth.
    #[must_use]
    pub const fn with_water(mut self, depth: u8) -> Self {
        self.water = depth;
        self
    }

    /// Builder: set rubble level.
    #[must_use]
    pub const fn with_rubble(mut self, level: u8) -> Self {
        self.rubble = level;
        self
    }

    /// Top of the terrain a unit on the surface stands on.
    #[must_use]
    pub const fn surface(&self) -> i32 {
        self.elevation
    }

    /// Bottom of any water in the hex.
    #[must_use]
    pub const fn floor(&self) -> i32 {
        self.elevation - self.water as i32
    }

    /// Higher of the woods and jungle levels.
    #[must_use]
    pub fn foliage(&self) -> u8 {
        self.woods.max(self.jungle)
    }
}

/// On-disk board definition.
///
/// Only hexes that differ from `base` need to be listed.
///
/// # Example RON
///
/// ```ron
/// BoardData(
///     name: "river_crossing",
///     width: 16,
///     height: 17,
///     hexes: [
///         ((x: 7, y: 3), (water: 2)),
///         ((x: 4, y: 9), (woods: 1, elevation: 1)),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardData {
    /// Board name, used by map settings.
    pub name: String,
    /// Columns.
    pub width: i32,
    /// Rows.
    pub height: i32,
    /// Terrain for unlisted hexes.
    #[serde(default)]
    pub base: Hex,
    /// Per-hex overrides.
    #[serde(default)]
    pub hexes: Vec<(HexCoord, Hex)>,
}

/// A playable board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    name: String,
    width: i32,
    height: i32,
    hexes: Vec<Hex>,
}

impl Board {
    /// Create an all-clear board at elevation 0.
    #[must_use]
    pub fn blank(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            name: "blank".to_string(),
            width,
            height,
            hexes: vec![Hex::default(); (width * height) as usize],
        }
    }

    /// Build a board from its data definition.
    ///
    /// # Errors
    ///
    /// Returns an error for non-positive dimensions or hexes outside the board.
    pub fn from_data(data: &BoardData) -> Result<Self> {
        if data.width <= 0 || data.height <= 0 {
            return Err(GameError::InvalidState(format!(
                "board '{}' has invalid size {}x{}",
                data.name, data.width, data.height
            )));
        }
        let mut board = Self {
            name: data.name.clone(),
            width: data.width,
            height: data.height,
            hexes: vec![data.base; (data.width * data.height) as usize],
        };
        for (coords, hex) in &data.hexes {
            if !board.set_hex(*coords, *hex) {
                return Err(GameError::InvalidState(format!(
                    "board '{}' has hex {coords} outside its bounds",
                    data.name
                )));
            }
        }
        Ok(board)
    }

    /// Board name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Rows.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Whether the coordinate is on the board.
    #[must_use]
    pub const fn contains(&self, c: HexCoord) -> bool {
        c.x >= 0 && c.y >= 0 && c.x < self.width && c.y < self.height
    }

    /// Whether the coordinate is on the outermost ring of the board.
    #[must_use]
    pub const fn is_edge(&self, c: HexCoord) -> bool {
        self.contains(c)
            && (c.x == 0 || c.y == 0 || c.x == self.width - 1 || c.y == self.height - 1)
    }

    fn index(&self, c: HexCoord) -> Option<usize> {
        self.contains(c).then(|| (c.y * self.width + c.x) as usize)
    }

    /// Terrain at a coordinate, `None` when off the board.
    #[must_use]
    pub fn hex(&self, c: HexCoord) -> Option<&Hex> {
        self.index(c).and_then(|i| self.hexes.get(i))
    }

    /// Replace the terrain at a coordinate. Returns `false` when off the board.
    pub fn set_hex(&mut self, c: HexCoord, hex: Hex) -> bool {
        match self.index(c).and_then(|i| self.hexes.get_mut(i)) {
            Some(slot) => {
                *slot = hex;
                true
            }
            None => false,
        }
    }

    /// Centre hex.
    #[must_use]
    pub const fn center(&self) -> HexCoord {
        HexCoord::new(self.width / 2, self.height / 2)
    }

    /// Line-of-sight effects between two units.
    ///
    /// Heights are absolute: `bottom` is the level the unit stands on and
    /// `top` the highest level it occupies.
    #[must_use]
    pub fn line_of_sight(&self, from: LosEndpoint, to: LosEndpoint) -> LosEffects {
        let mut effects = LosEffects::default();
        let (Some(from_hex), Some(to_hex)) = (self.hex(from.position), self.hex(to.position)) else {
            effects.blocked = true;
            return effects;
        };

        let from_submerged = from.top < from_hex.surface();
        let to_submerged = to.top < to_hex.surface();
        if from_submerged != to_submerged {
            effects.blocked = true;
            return effects;
        }

        if to_hex.water == 1 && to.top == to_hex.surface() && to.top > to.bottom {
            effects.partial_cover = true;
        }

        let line = from.position.line_to(to.position);
        let sight_line = from.top.max(to.top);
        for coords in line.iter().skip(1).take(line.len().saturating_sub(2)) {
            let Some(hex) = self.hex(*coords) else {
                continue;
            };
            if hex.surface() > sight_line {
                effects.blocked = true;
                return effects;
            }
            let foliage = hex.foliage();
            // Woods stand two levels above the ground.
            if foliage > 0 && hex.surface() + 2 > from.top.min(to.top) {
                effects.intervening_woods += u32::from(foliage);
            }
        }
        if effects.intervening_woods >= 3 {
            effects.blocked = true;
        }
        effects
    }
}

/// One end of a line-of-sight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LosEndpoint {
    /// Hex occupied.
    pub position: HexCoord,
    /// Lowest level occupied.
    pub bottom: i32,
    /// Highest level occupied.
    pub top: i32,
}

/// Result of a line-of-sight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LosEffects {
    /// Sight is blocked entirely.
    pub blocked: bool,
    /// Total woods/jungle levels crossed.
    pub intervening_woods: u32,
    /// Target's lower half is under water.
    pub partial_cover: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(x: i32, y: i32, bottom: i32) -> LosEndpoint {
        LosEndpoint {
            position: HexCoord::new(x, y),
            bottom,
            top: bottom + 1,
        }
    }

    #[test]
    fn test_blank_board_bounds() {
        let board = Board::blank(16, 17);
        assert!(board.contains(HexCoord::new(0, 0)));
        assert!(board.contains(HexCoord::new(15, 16)));
        assert!(!board.contains(HexCoord::new(16, 0)));
        assert!(!board.contains(HexCoord::new(-1, 3)));
        assert!(board.hex(HexCoord::new(20, 20)).is_none());
    }

    #[test]
    fn test_from_data_rejects_out_of_bounds_hex() {
        let data = BoardData {
            name: "bad".into(),
            width: 4,
            height: 4,
            base: Hex::default(),
            hexes: vec![(HexCoord::new(9, 9), Hex::clear(1))],
        };
        assert!(Board::from_data(&data).is_err());
    }

    #[test]
    fn test_from_data_applies_overrides() {
        let data = BoardData {
            name: "lake".into(),
            width: 5,
            height: 5,
            base: Hex::clear(1),
            hexes: vec![(HexCoord::new(2, 2), Hex::clear(0).with_water(2))],
        };
        let board = Board::from_data(&data).unwrap();
        assert_eq!(board.hex(HexCoord::new(0, 0)).unwrap().elevation, 1);
        assert_eq!(board.hex(HexCoord::new(2, 2)).unwrap().floor(), -2);
    }

    #[test]
    fn test_clear_line_of_sight() {
        let board = Board::blank(10, 10);
        let los = board.line_of_sight(endpoint(1, 5, 0), endpoint(8, 5, 0));
        assert!(!los.blocked);
        assert_eq!(los.intervening_woods, 0);
    }

    #[test]
    fn test_hill_blocks_sight() {
        let mut board = Board::blank(10, 10);
        board.set_hex(HexCoord::new(4, 1), Hex::clear(3));
        let los = board.line_of_sight(endpoint(4, 0, 0), endpoint(4, 4, 0));
        assert!(los.blocked);
    }

    #[test]
    fn test_woods_accumulate_then_block() {
        let mut board = Board::blank(10, 10);
        board.set_hex(HexCoord::new(4, 1), Hex::clear(0).with_woods(1));
        let los = board.line_of_sight(endpoint(4, 0, 0), endpoint(4, 4, 0));
        assert!(!los.blocked);
        assert_eq!(los.intervening_woods, 1);

        board.set_hex(HexCoord::new(4, 2), Hex::clear(0).with_woods(2));
        let los = board.line_of_sight(endpoint(4, 0, 0), endpoint(4, 4, 0));
        assert!(los.blocked);
    }

    #[test]
    fn test_partial_cover_in_shallow_water() {
        let mut board = Board::blank(10, 10);
        board.set_hex(HexCoord::new(4, 4), Hex::clear(0).with_water(1));
        let target = LosEndpoint {
            position: HexCoord::new(4, 4),
            bottom: -1,
            top: 0,
        };
        let los = board.line_of_sight(endpoint(4, 0, 0), target);
        assert!(los.partial_cover);
        assert!(!los.blocked);
    }
}
