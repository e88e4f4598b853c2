//! Hex grid coordinates, directions and firing arcs.
//!
//! Boards use flat-topped hexes in "odd-q" offset layout: odd columns are
//! shifted half a hex down. Directions are numbered clockwise from north:
//!
//! ```text
//!   0 = N, 1 = NE, 2 = SE, 3 = S, 4 = SW, 5 = NW
//! ```
//!
//! Internally everything converts to cube coordinates, where distance,
//! neighbours and line drawing are simple integer arithmetic.

use serde::{Deserialize, Serialize};

use crate::math::{ratio, Fixed, FixedCube, SQRT_3};

/// Number of hex directions.
pub const DIRECTIONS: u8 = 6;

/// Cube `(q, r)` offsets for each direction, indexed by direction.
const DIRECTION_CUBE: [(i32, i32); 6] = [(0, -1), (1, -1), (1, 0), (0, 1), (-1, 1), (-1, 0)];

/// Rotate a facing by `steps` hexsides (positive is clockwise).
#[must_use]
pub fn rotate(facing: u8, steps: i32) -> u8 {
    (i32::from(facing) + steps).rem_euclid(i32::from(DIRECTIONS)) as u8
}

/// The direction pointing the opposite way.
#[must_use]
pub fn opposite(direction: u8) -> u8 {
    rotate(direction, 3)
}

/// A hex position on the board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct HexCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl std::fmt::Display for HexCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Boards are printed 1-based with two digit columns/rows.
        write!(f, "{:02}{:02}", self.x + 1, self.y + 1)
    }
}

impl HexCoord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Convert to cube coordinates `(q, r, s)`.
    #[must_use]
    pub const fn to_cube(self) -> (i32, i32, i32) {
        let q = self.x;
        let r = self.y - (self.x - (self.x & 1)) / 2;
        (q, r, -q - r)
    }

    /// Convert from cube coordinates (the third axis is implied).
    #[must_use]
    pub const fn from_cube(q: i32, r: i32) -> Self {
        Self {
            x: q,
            y: r + (q - (q & 1)) / 2,
        }
    }

    /// The adjacent hex in the given direction.
    #[must_use]
    pub fn translated(self, direction: u8) -> Self {
        self.translated_by(direction, 1)
    }

    /// The hex `count` steps away in the given direction.
    #[must_use]
    pub fn translated_by(self, direction: u8, count: i32) -> Self {
        let (q, r, _) = self.to_cube();
        let (dq, dr) = DIRECTION_CUBE[usize::from(direction % DIRECTIONS)];
        Self::from_cube(q + dq * count, r + dr * count)
    }

    /// All six neighbours, in direction order.
    #[must_use]
    pub fn neighbors(self) -> [Self; 6] {
        [0, 1, 2, 3, 4, 5].map(|d| self.translated(d))
    }

    /// Hex distance.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        let (q1, r1, s1) = self.to_cube();
        let (q2, r2, s2) = other.to_cube();
        ((q1 - q2).unsigned_abs() + (r1 - r2).unsigned_abs() + (s1 - s2).unsigned_abs()) / 2
    }

    /// Bearing towards `other` in 30 degree steps (0..12, clockwise from
    /// north). Even values point through a hexside, odd values through a
    /// vertex. `None` for the same hex.
    #[must_use]
    pub fn bearing_to(self, other: Self) -> Option<u8> {
        if self == other {
            return None;
        }
        let (q1, r1, s1) = self.to_cube();
        let (q2, r2, s2) = other.to_cube();
        let delta = (q2 - q1, r2 - r1, s2 - s1);

        // Edge vectors have length sqrt(2), vertex vectors sqrt(6); scale the
        // edge dot products by sqrt(3) so both are comparable.
        let mut best: Option<(u8, Fixed)> = None;
        for direction in 0..DIRECTIONS {
            let edge = cube_vector(direction);
            let edge_score = Fixed::from_num(dot(delta, edge)) * SQRT_3;
            let next = cube_vector(rotate(direction, 1));
            let vertex = (edge.0 + next.0, edge.1 + next.1, edge.2 + next.2);
            let vertex_score = Fixed::from_num(dot(delta, vertex));

            for (bearing, score) in [(direction * 2, edge_score), (direction * 2 + 1, vertex_score)] {
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((bearing, score));
                }
            }
        }
        best.map(|(bearing, _)| bearing)
    }

    /// The hexside direction that most closely points at `other`.
    #[must_use]
    pub fn direction_to(self, other: Self) -> Option<u8> {
        if self == other {
            return None;
        }
        let (q1, r1, s1) = self.to_cube();
        let (q2, r2, s2) = other.to_cube();
        let delta = (q2 - q1, r2 - r1, s2 - s1);
        (0..DIRECTIONS).max_by_key(|&d| (dot(delta, cube_vector(d)), -i32::from(d)))
    }

    /// Hexes on the straight line from `self` to `other`, inclusive.
    #[must_use]
    pub fn line_to(self, other: Self) -> Vec<Self> {
        let n = self.distance(other) as i32;
        if n == 0 {
            return vec![self];
        }
        let (q1, r1, s1) = self.to_cube();
        let (q2, r2, s2) = other.to_cube();
        let a = FixedCube::from_cube(q1, r1, s1).nudged();
        let b = FixedCube::from_cube(q2, r2, s2).nudged();
        (0..=n)
            .map(|i| {
                let (q, r, _) = a.lerp(b, ratio(i, n)).round();
                Self::from_cube(q, r)
            })
            .collect()
    }

    /// Hexes exactly `radius` steps away, walking clockwise from the
    /// south-west corner of the ring.
    #[must_use]
    pub fn ring(self, radius: i32) -> Vec<Self> {
        if radius <= 0 {
            return vec![self];
        }
        let mut hex = self.translated_by(4, radius);
        let mut ring = Vec::with_capacity(6 * radius as usize);
        for direction in 0..DIRECTIONS {
            for _ in 0..radius {
                ring.push(hex);
                hex = hex.translated(direction);
            }
        }
        ring
    }
}

fn cube_vector(direction: u8) -> (i32, i32, i32) {
    let (q, r) = DIRECTION_CUBE[usize::from(direction % DIRECTIONS)];
    (q, r, -q - r)
}

fn dot(a: (i32, i32, i32), b: (i32, i32, i32)) -> i32 {
    a.0 * b.0 + a.1 * b.1 + a.2 * b.2
}

/// Bearing from `from` to `to` relative to `facing`, in 30 degree steps.
#[must_use]
pub fn relative_bearing(from: HexCoord, facing: u8, to: HexCoord) -> Option<u8> {
    from.bearing_to(to)
        .map(|bearing| (bearing + 12 - (facing % DIRECTIONS) * 2) % 12)
}

/// A firing arc relative to a unit's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arc {
    /// 120 degree cone to the front.
    Forward,
    /// Forward arc plus the left side.
    LeftArm,
    /// Forward arc plus the right side.
    RightArm,
    /// 120 degree cone to the rear.
    Rear,
    /// All directions.
    Any,
}

impl Arc {
    /// Whether a relative bearing (0..12) lies inside the arc.
    #[must_use]
    pub const fn contains(self, relative: u8) -> bool {
        match self {
            Arc::Forward => matches!(relative, 10 | 11 | 0 | 1 | 2),
            Arc::LeftArm => matches!(relative, 8..=11 | 0..=2),
            Arc::RightArm => matches!(relative, 10 | 11 | 0..=4),
            Arc::Rear => matches!(relative, 4..=8),
            Arc::Any => true,
        }
    }
}

/// Whether `dest` lies in `arc` of a unit at `src` facing `facing`.
///
/// The unit's own hex is inside every arc.
#[must_use]
pub fn is_in_arc(src: HexCoord, facing: u8, dest: HexCoord, arc: Arc) -> bool {
    relative_bearing(src, facing, dest).map_or(true, |relative| arc.contains(relative))
}

/// Side of a target struck by an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Front.
    Front,
    /// Left side.
    Left,
    /// Right side.
    Right,
    /// Rear.
    Rear,
}

impl Side {
    /// Which side of a target at `target` facing `facing` an attack coming
    /// from `attacker` strikes.
    #[must_use]
    pub fn of_attack(target: HexCoord, facing: u8, attacker: HexCoord) -> Self {
        match relative_bearing(target, facing, attacker) {
            Some(2..=4) => Side::Right,
            Some(5..=7) => Side::Rear,
            Some(8..=10) => Side::Left,
            _ => Side::Front,
        }
    }

    /// Side struck by a fall, from a d6 roll.
    #[must_use]
    pub const fn from_fall_roll(roll: i32) -> Self {
        match roll {
            1 | 2 => Side::Right,
            3 => Side::Rear,
            4 | 5 => Side::Left,
            _ => Side::Front,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_round_trip() {
        for x in -3..6 {
            for y in -3..6 {
                let hex = HexCoord::new(x, y);
                let (q, r, s) = hex.to_cube();
                assert_eq!(q + r + s, 0);
                assert_eq!(HexCoord::from_cube(q, r), hex);
            }
        }
    }

    #[test]
    fn test_neighbors_odd_and_even_columns() {
        let even = HexCoord::new(2, 2);
        assert_eq!(even.translated(0), HexCoord::new(2, 1));
        assert_eq!(even.translated(1), HexCoord::new(3, 1));
        assert_eq!(even.translated(2), HexCoord::new(3, 2));
        assert_eq!(even.translated(3), HexCoord::new(2, 3));

        let odd = HexCoord::new(3, 2);
        assert_eq!(odd.translated(1), HexCoord::new(4, 2));
        assert_eq!(odd.translated(2), HexCoord::new(4, 3));
        assert_eq!(odd.translated(4), HexCoord::new(2, 3));
        assert_eq!(odd.translated(5), HexCoord::new(2, 2));
    }

    #[test]
    fn test_distance() {
        let origin = HexCoord::new(0, 0);
        assert_eq!(origin.distance(origin), 0);
        for n in origin.neighbors() {
            assert_eq!(origin.distance(n), 1);
        }
        assert_eq!(origin.distance(HexCoord::new(0, 5)), 5);
        assert_eq!(origin.distance(HexCoord::new(4, 2)), 4);
    }

    #[test]
    fn test_direction_to_neighbors() {
        let hex = HexCoord::new(5, 5);
        for d in 0..DIRECTIONS {
            assert_eq!(hex.direction_to(hex.translated(d)), Some(d));
            assert_eq!(hex.bearing_to(hex.translated_by(d, 3)), Some(d * 2));
        }
        assert_eq!(hex.direction_to(hex), None);
    }

    #[test]
    fn test_bearing_through_vertex() {
        let hex = HexCoord::new(4, 4);
        // Two steps N then one NE puts the target between N and NE.
        let target = hex.translated(0).translated(1);
        assert_eq!(hex.bearing_to(target), Some(1));
    }

    #[test]
    fn test_line_is_contiguous() {
        let a = HexCoord::new(1, 1);
        let b = HexCoord::new(7, 4);
        let line = a.line_to(b);
        assert_eq!(line.first(), Some(&a));
        assert_eq!(line.last(), Some(&b));
        assert_eq!(line.len() as u32, a.distance(b) + 1);
        for pair in line.windows(2) {
            assert_eq!(pair[0].distance(pair[1]), 1);
        }
    }

    #[test]
    fn test_ring_sizes() {
        let center = HexCoord::new(6, 6);
        assert_eq!(center.ring(0), vec![center]);
        for radius in 1..4 {
            let ring = center.ring(radius);
            assert_eq!(ring.len(), 6 * radius as usize);
            assert!(ring.iter().all(|h| center.distance(*h) == radius as u32));
        }
    }

    #[test]
    fn test_arcs() {
        let src = HexCoord::new(5, 5);
        let ahead = src.translated_by(0, 2);
        let behind = src.translated_by(3, 2);
        let left = src.translated_by(5, 2).translated(4);
        assert!(is_in_arc(src, 0, ahead, Arc::Forward));
        assert!(!is_in_arc(src, 0, behind, Arc::Forward));
        assert!(is_in_arc(src, 0, behind, Arc::Rear));
        assert!(is_in_arc(src, 0, left, Arc::LeftArm));
        assert!(!is_in_arc(src, 0, left, Arc::RightArm));
        assert!(is_in_arc(src, 3, behind, Arc::Forward));
    }

    #[test]
    fn test_attack_side() {
        let target = HexCoord::new(5, 5);
        assert_eq!(Side::of_attack(target, 0, target.translated_by(0, 3)), Side::Front);
        assert_eq!(Side::of_attack(target, 0, target.translated_by(3, 3)), Side::Rear);
        assert_eq!(Side::of_attack(target, 0, target.translated_by(2, 3)), Side::Right);
        assert_eq!(Side::of_attack(target, 0, target.translated_by(4, 3)), Side::Left);
        assert_eq!(Side::of_attack(target, 3, target.translated_by(0, 3)), Side::Rear);
    }

    #[test]
    fn test_rotate() {
        assert_eq!(rotate(0, -1), 5);
        assert_eq!(rotate(5, 2), 1);
        assert_eq!(opposite(4), 1);
    }
}
