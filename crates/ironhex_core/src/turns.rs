//! Initiative and turn order for the action phases.
//!
//! Every action phase recomputes its turn list from the round's initiative
//! order. Players are granted turns in proportion to how many eligible
//! entities they control, so a large force cannot take all of its moves
//! back to back while a small one waits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dice::Dice;
use crate::entity::EntityId;
use crate::player::{Initiative, Player, PlayerId};

/// Re-rolls allowed to break one tie before falling back to player order.
pub const MAX_TIE_ROLLS: usize = 16;

/// One slot in a phase's turn order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameTurn {
    /// Player who acts.
    pub player: PlayerId,
    /// Entity that must act, when the turn is bound to one.
    pub entity: Option<EntityId>,
}

impl GameTurn {
    /// A turn for any of the player's eligible entities.
    #[must_use]
    pub const fn new(player: PlayerId) -> Self {
        Self {
            player,
            entity: None,
        }
    }

    /// A turn bound to a specific entity.
    #[must_use]
    pub const fn for_entity(player: PlayerId, entity: EntityId) -> Self {
        Self {
            player,
            entity: Some(entity),
        }
    }
}

/// Roll initiative for every player, re-rolling ties among the tied players
/// until none remain.
pub fn roll_initiative(players: &mut BTreeMap<PlayerId, Player>, dice: &mut dyn Dice) {
    for player in players.values_mut() {
        player.initiative.clear();
    }
    let ids: Vec<PlayerId> = players.keys().copied().collect();
    resolve_ties(players, &ids, dice, 0);
}

fn resolve_ties(
    players: &mut BTreeMap<PlayerId, Player>,
    group: &[PlayerId],
    dice: &mut dyn Dice,
    depth: usize,
) {
    for id in group {
        if let Some(player) = players.get_mut(id) {
            player.initiative.add_roll(dice);
        }
    }
    if depth + 1 >= MAX_TIE_ROLLS {
        return;
    }
    let mut classes: Vec<(Initiative, Vec<PlayerId>)> = Vec::new();
    for id in group {
        let Some(initiative) = players.get(id).map(|p| p.initiative.clone()) else {
            continue;
        };
        match classes.iter_mut().find(|(i, _)| *i == initiative) {
            Some((_, tied)) => tied.push(*id),
            None => classes.push((initiative, vec![*id])),
        }
    }
    for (_, tied) in classes {
        if tied.len() > 1 {
            resolve_ties(players, &tied, dice, depth + 1);
        }
    }
}

/// Players sorted by initiative, lowest first. Ties left after the re-roll
/// limit fall back to player id.
#[must_use]
pub fn initiative_order(players: &BTreeMap<PlayerId, Player>) -> Vec<PlayerId> {
    let mut order: Vec<&Player> = players.values().collect();
    order.sort_by(|a, b| a.initiative.cmp(&b.initiative).then(a.id.cmp(&b.id)));
    order.into_iter().map(|p| p.id).collect()
}

/// Allocate one turn per eligible entity.
///
/// Each pass walks the initiative order and grants a player
/// `max(1, remaining / lowest_remaining)` consecutive turns, where
/// `lowest_remaining` is the smallest non-zero count left at the start of
/// the pass.
#[must_use]
pub fn allocate_turns(order: &[PlayerId], eligible: &BTreeMap<PlayerId, u32>) -> Vec<GameTurn> {
    let mut remaining: Vec<(PlayerId, u32)> = order
        .iter()
        .map(|id| (*id, eligible.get(id).copied().unwrap_or(0)))
        .collect();
    let total: u32 = remaining.iter().map(|(_, n)| n).sum();
    let mut turns = Vec::with_capacity(total as usize);

    while turns.len() < total as usize {
        let lowest = remaining
            .iter()
            .map(|(_, n)| *n)
            .filter(|n| *n > 0)
            .min()
            .unwrap_or(1);
        for (player, count) in &mut remaining {
            if *count == 0 {
                continue;
            }
            let grant = (*count / lowest).max(1);
            for _ in 0..grant {
                turns.push(GameTurn::new(*player));
            }
            *count -= grant;
        }
    }
    turns
}

/// Serves the current phase's turns one at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnScheduler {
    turns: Vec<GameTurn>,
    index: usize,
    current: Option<GameTurn>,
}

impl TurnScheduler {
    /// Replace the turn list and rewind.
    pub fn reset(&mut self, turns: Vec<GameTurn>) {
        self.turns = turns;
        self.index = 0;
        self.current = None;
    }

    /// Remove all turns.
    pub fn clear(&mut self) {
        self.reset(Vec::new());
    }

    /// Whether unserved turns remain.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.index < self.turns.len()
    }

    /// Take the next turn and make it current. `None` once exhausted.
    pub fn advance(&mut self) -> Option<GameTurn> {
        let turn = self.turns.get(self.index).copied();
        if turn.is_some() {
            self.index += 1;
        }
        self.current = turn;
        turn
    }

    /// The turn being played.
    #[must_use]
    pub const fn current(&self) -> Option<GameTurn> {
        self.current
    }

    /// Queue a turn to be served right after the current one.
    pub fn insert_next(&mut self, turn: GameTurn) {
        self.turns.insert(self.index, turn);
    }

    /// Every turn of the phase, served or not.
    #[must_use]
    pub fn turns(&self) -> &[GameTurn] {
        &self.turns
    }

    /// Turns not yet served.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.turns.len() - self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::ScriptedDice;
    use proptest::prelude::*;

    fn players(n: u32) -> BTreeMap<PlayerId, Player> {
        (1..=n).map(|id| (id, Player::new(id, format!("P{id}")))).collect()
    }

    fn counts(pairs: &[(PlayerId, u32)]) -> BTreeMap<PlayerId, u32> {
        pairs.iter().copied().collect()
    }

    fn owners(turns: &[GameTurn]) -> Vec<PlayerId> {
        turns.iter().map(|t| t.player).collect()
    }

    // ========================================================================
    // Initiative
    // ========================================================================

    #[test]
    fn test_initiative_without_ties() {
        let mut roster = players(3);
        let mut dice = ScriptedDice::new([9, 4, 11]);
        roll_initiative(&mut roster, &mut dice);
        assert_eq!(initiative_order(&roster), vec![2, 1, 3]);
        assert_eq!(roster[&1].initiative.rolls(), &[9]);
    }

    #[test]
    fn test_tie_rerolls_only_tied_players() {
        let mut roster = players(3);
        // 1 and 3 tie on 8; the re-roll puts 3 first.
        let mut dice = ScriptedDice::new([8, 5, 8, 10, 6]);
        roll_initiative(&mut roster, &mut dice);
        assert_eq!(roster[&2].initiative.rolls(), &[5]);
        assert_eq!(roster[&1].initiative.rolls(), &[8, 10]);
        assert_eq!(roster[&3].initiative.rolls(), &[8, 6]);
        assert_eq!(initiative_order(&roster), vec![2, 3, 1]);
    }

    #[test]
    fn test_nested_ties() {
        let mut roster = players(3);
        let mut dice = ScriptedDice::new([7, 7, 7, 4, 4, 9, 3, 2]);
        roll_initiative(&mut roster, &mut dice);
        assert_eq!(roster[&3].initiative.rolls(), &[7, 9]);
        assert_eq!(roster[&1].initiative.rolls(), &[7, 4, 3]);
        assert_eq!(roster[&2].initiative.rolls(), &[7, 4, 2]);
        assert_eq!(initiative_order(&roster), vec![2, 1, 3]);
    }

    #[test]
    fn test_endless_ties_terminate() {
        let mut roster = players(2);
        let mut dice = ScriptedDice::new([]);
        roll_initiative(&mut roster, &mut dice);
        assert_eq!(roster[&1].initiative.rolls().len(), MAX_TIE_ROLLS);
        assert_eq!(initiative_order(&roster), vec![1, 2]);
    }

    #[test]
    fn test_initiative_repeatable() {
        let run = || {
            let mut roster = players(4);
            let mut dice = ScriptedDice::new([6, 6, 9, 6, 2, 2, 5, 11, 3]);
            roll_initiative(&mut roster, &mut dice);
            initiative_order(&roster)
        };
        assert_eq!(run(), run());
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    #[test]
    fn test_allocation_five_five_five_one() {
        let turns = allocate_turns(&[1, 2, 3, 4], &counts(&[(1, 5), (2, 5), (3, 5), (4, 1)]));
        let mut expected = vec![1; 5];
        expected.extend([2; 5]);
        expected.extend([3; 5]);
        expected.push(4);
        assert_eq!(owners(&turns), expected);

        // The one-unit player moving first takes its turn before the rest.
        let turns = allocate_turns(&[4, 1, 2, 3], &counts(&[(1, 5), (2, 5), (3, 5), (4, 1)]));
        assert_eq!(turns[0].player, 4);
        assert_eq!(turns.len(), 16);
    }

    #[test]
    fn test_allocation_interleaves_proportionally() {
        let turns = allocate_turns(&[1, 2], &counts(&[(1, 4), (2, 2)]));
        assert_eq!(owners(&turns), vec![1, 1, 2, 1, 1, 2]);

        let turns = allocate_turns(&[2, 1], &counts(&[(1, 3), (2, 2)]));
        assert_eq!(owners(&turns), vec![2, 1, 2, 1, 1]);
    }

    #[test]
    fn test_allocation_skips_players_without_entities() {
        let turns = allocate_turns(&[1, 2, 3], &counts(&[(1, 0), (2, 2)]));
        assert_eq!(owners(&turns), vec![2, 2]);
        assert!(allocate_turns(&[1], &BTreeMap::new()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_one_turn_per_eligible_entity(sizes in proptest::collection::vec(0u32..12, 1..6)) {
            let order: Vec<PlayerId> = (1..=sizes.len() as u32).collect();
            let eligible: BTreeMap<PlayerId, u32> = order.iter().copied().zip(sizes.iter().copied()).collect();
            let turns = allocate_turns(&order, &eligible);
            prop_assert_eq!(turns.len() as u32, sizes.iter().sum::<u32>());
            for (player, count) in &eligible {
                let given = turns.iter().filter(|t| t.player == *player).count() as u32;
                prop_assert_eq!(given, *count);
            }
        }
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    #[test]
    fn test_scheduler_serves_in_order() {
        let mut scheduler = TurnScheduler::default();
        scheduler.reset(vec![GameTurn::new(1), GameTurn::new(2)]);
        assert!(scheduler.has_more());
        assert_eq!(scheduler.advance(), Some(GameTurn::new(1)));
        scheduler.insert_next(GameTurn::for_entity(1, 7));
        assert_eq!(scheduler.remaining(), 2);
        assert_eq!(scheduler.advance(), Some(GameTurn::for_entity(1, 7)));
        assert_eq!(scheduler.current(), Some(GameTurn::for_entity(1, 7)));
        assert_eq!(scheduler.advance(), Some(GameTurn::new(2)));
        assert!(!scheduler.has_more());
        assert_eq!(scheduler.advance(), None);
        assert_eq!(scheduler.current(), None);
    }
}
