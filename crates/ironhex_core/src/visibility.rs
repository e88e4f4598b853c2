//! Double-blind visibility.
//!
//! With the `double_blind` option on, a player only learns about enemy
//! units that one of their own or an allied unit can see. Each observer's
//! last visible set is remembered so that a unit dropping out of sight can
//! be replaced by a removal notice.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::entity::{Entity, EntityId, EntityStorage};
use crate::options::GameOptions;
use crate::player::{Player, PlayerId};

/// Whether `viewer` has line of sight to `target`.
#[must_use]
pub fn can_see(board: &Board, viewer: &Entity, target: &Entity) -> bool {
    if !viewer.is_targetable() || !target.is_targetable() {
        return false;
    }
    match (viewer.los_endpoint(board), target.los_endpoint(board)) {
        (Some(from), Some(to)) => !board.line_of_sight(from, to).blocked,
        _ => false,
    }
}

/// Whether an entity is friendly to an observer.
fn is_friendly(players: &BTreeMap<PlayerId, Player>, observer: PlayerId, entity: &Entity) -> bool {
    if entity.owner == observer {
        return true;
    }
    match (players.get(&observer), players.get(&entity.owner)) {
        (Some(a), Some(b)) => a.is_ally_of(b),
        _ => false,
    }
}

/// Entities an observer may be told about.
#[must_use]
pub fn visible_entities(
    board: &Board,
    options: &GameOptions,
    players: &BTreeMap<PlayerId, Player>,
    entities: &EntityStorage,
    observer: PlayerId,
) -> BTreeSet<EntityId> {
    let all = entities.sorted();
    if !options.double_blind {
        return all.iter().map(|e| e.id).collect();
    }
    let (friends, others): (Vec<&Entity>, Vec<&Entity>) = all
        .into_iter()
        .partition(|e| is_friendly(players, observer, e));
    let mut visible: BTreeSet<EntityId> = friends.iter().map(|e| e.id).collect();
    for target in others {
        if friends.iter().any(|viewer| can_see(board, viewer, target)) {
            visible.insert(target.id);
        }
    }
    visible
}

/// What changed for one observer since the last update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityChange {
    /// Currently visible.
    pub visible: BTreeSet<EntityId>,
    /// Hidden last time, visible now.
    pub gained: Vec<EntityId>,
    /// Visible last time, hidden now.
    pub lost: Vec<EntityId>,
}

/// Remembers what each observer was last shown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityTracker {
    seen: BTreeMap<PlayerId, BTreeSet<EntityId>>,
}

impl VisibilityTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute an observer's view and report what dropped out of it.
    pub fn update(
        &mut self,
        board: &Board,
        options: &GameOptions,
        players: &BTreeMap<PlayerId, Player>,
        entities: &EntityStorage,
        observer: PlayerId,
    ) -> VisibilityChange {
        let visible = visible_entities(board, options, players, entities, observer);
        let previous = self.seen.insert(observer, visible.clone()).unwrap_or_default();
        let gained = visible.difference(&previous).copied().collect();
        let lost = previous
            .difference(&visible)
            .copied()
            .filter(|id| entities.contains(*id))
            .collect();
        VisibilityChange {
            visible,
            gained,
            lost,
        }
    }

    /// Whether the observer was shown the entity last time.
    #[must_use]
    pub fn was_visible(&self, observer: PlayerId, entity: EntityId) -> bool {
        self.seen
            .get(&observer)
            .is_some_and(|set| set.contains(&entity))
    }

    /// Forget an observer.
    pub fn forget(&mut self, observer: PlayerId) {
        self.seen.remove(&observer);
    }

    /// Forget everyone.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Hex;
    use crate::data::UnitData;
    use crate::hex::HexCoord;

    fn mech(id: EntityId, owner: PlayerId, x: i32, y: i32) -> Entity {
        let unit = UnitData::mech("Locust", "LCT-1V", 20, 8);
        let mut entity = Entity::from_unit_data(id, owner, &unit).unwrap();
        entity.position = Some(HexCoord::new(x, y));
        entity
    }

    fn setup() -> (Board, BTreeMap<PlayerId, Player>, EntityStorage) {
        let mut board = Board::blank(16, 17);
        // A hill between the two sides.
        board.set_hex(HexCoord::new(5, 5), Hex::clear(4));
        let mut players = BTreeMap::new();
        players.insert(1, Player::new(1, "Ann"));
        players.insert(2, Player::new(2, "Bo"));
        players.insert(3, Player::new(3, "Cy").with_team(1));
        players.insert(4, Player::new(4, "Di").with_team(1));
        let mut entities = EntityStorage::new();
        entities.insert(mech(1, 1, 5, 8));
        entities.insert(mech(2, 2, 5, 2));
        entities.insert(mech(3, 2, 9, 8));
        (board, players, entities)
    }

    #[test]
    fn test_everything_visible_without_double_blind() {
        let (board, players, entities) = setup();
        let options = GameOptions::default();
        let visible = visible_entities(&board, &options, &players, &entities, 1);
        assert_eq!(visible.len(), 3);
    }

    #[test]
    fn test_hill_hides_unit() {
        let (board, players, entities) = setup();
        let options = GameOptions {
            double_blind: true,
            ..GameOptions::default()
        };
        let visible = visible_entities(&board, &options, &players, &entities, 1);
        assert!(visible.contains(&1));
        assert!(!visible.contains(&2));
        assert!(visible.contains(&3));
    }

    #[test]
    fn test_allies_share_sight() {
        let (board, players, mut entities) = setup();
        let options = GameOptions {
            double_blind: true,
            ..GameOptions::default()
        };
        entities.insert(mech(4, 3, 2, 2));
        let visible = visible_entities(&board, &options, &players, &entities, 4);
        assert!(visible.contains(&4));
        assert!(visible.contains(&2));
    }

    #[test]
    fn test_tracker_reports_lost_contact() {
        let (mut board, players, entities) = setup();
        let options = GameOptions {
            double_blind: true,
            ..GameOptions::default()
        };
        let mut tracker = VisibilityTracker::new();
        let first = tracker.update(&board, &options, &players, &entities, 1);
        assert!(first.visible.contains(&3));
        assert_eq!(first.gained, vec![1, 3]);
        assert!(first.lost.is_empty());

        board.set_hex(HexCoord::new(7, 8), Hex::clear(5));
        let second = tracker.update(&board, &options, &players, &entities, 1);
        assert_eq!(second.lost, vec![3]);
        assert!(second.gained.is_empty());
        assert!(!tracker.was_visible(1, 3));
    }
}
