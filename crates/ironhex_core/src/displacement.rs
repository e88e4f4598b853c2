//! Forced movement.
//!
//! Pushes, charges, collisions and falls move units into adjacent hexes.
//! A unit displaced into an occupied hex either shoves the occupant onward
//! in the same direction (a domino chain) or, when it drops two or more
//! levels, collides with it. Chains are worked through a queue and never
//! take more steps than there are units in play.

use std::collections::VecDeque;

use crate::combat::Battle;
use crate::entity::{EntityId, HitTable, Removal};
use crate::hex::{rotate, HexCoord, Side};
use crate::piloting::{base_piloting_roll, PilotingRequest};
use crate::to_hit::target_movement_modifier;

/// Direction offsets tried when the straight-line hex is blocked.
const FALLBACK_OFFSETS: [i32; 6] = [0, 5, 1, 4, 2, 3];

/// Offsets tried, in order, for the preferred displacement.
const PREFERRED_OFFSETS: [i32; 6] = [0, 1, 5, 2, 4, 3];

/// Base target number for a falling unit to land on an occupant.
const COLLISION_BASE: i32 = 7;

struct Step {
    entity: EntityId,
    src: HexCoord,
    dest: HexCoord,
    request: Option<PilotingRequest>,
}

impl Battle<'_> {
    fn level(&self, id: EntityId, position: HexCoord) -> i32 {
        match (self.entities.get(id), self.board.hex(position)) {
            (Some(entity), Some(hex)) => entity.standing_level(hex),
            _ => 0,
        }
    }

    /// Whether a unit may be forced from `src` into `dest`, including any
    /// chain of occupants shoved along in the same direction.
    #[must_use]
    pub fn is_valid_displacement(&self, id: EntityId, src: HexCoord, dest: HexCoord) -> bool {
        let Some(direction) = src.direction_to(dest) else {
            return false;
        };
        let mut chain = vec![id];
        let (mut mover, mut from, mut to) = (id, src, dest);
        for _ in 0..=self.entities.len() {
            let (Some(entity), Some(from_hex), Some(to_hex)) = (
                self.entities.get(mover),
                self.board.hex(from),
                self.board.hex(to),
            ) else {
                return false;
            };
            if !entity.is_mech() && to_hex.water > 0 {
                return false;
            }
            let climb = entity.standing_level(to_hex) - entity.standing_level(from_hex);
            let limit = if entity.is_mech() { 2 } else { 1 };
            if climb > limit {
                return false;
            }
            let occupant = self
                .entities
                .sorted()
                .into_iter()
                .find(|e| e.position == Some(to) && e.is_active() && !chain.contains(&e.id))
                .map(|e| e.id);
            let Some(occupant) = occupant else {
                return true;
            };
            chain.push(occupant);
            mover = occupant;
            from = to;
            to = to.translated(direction);
        }
        false
    }

    /// First valid hex adjacent to `src`, starting with `direction` and
    /// fanning out to either side.
    #[must_use]
    pub fn valid_displacement(&self, id: EntityId, src: HexCoord, direction: u8) -> Option<HexCoord> {
        FALLBACK_OFFSETS
            .iter()
            .map(|&offset| src.translated(rotate(direction, offset)))
            .find(|&dest| self.is_valid_displacement(id, src, dest))
    }

    /// Best hex to step aside into: the highest empty valid hex, otherwise
    /// the first valid one.
    #[must_use]
    pub fn preferred_displacement(
        &self,
        id: EntityId,
        src: HexCoord,
        direction: u8,
    ) -> Option<HexCoord> {
        let valid: Vec<HexCoord> = PREFERRED_OFFSETS
            .iter()
            .map(|&offset| src.translated(rotate(direction, offset)))
            .filter(|&dest| self.is_valid_displacement(id, src, dest))
            .collect();
        let mut best: Option<(HexCoord, i32)> = None;
        for &dest in &valid {
            if self.entities.occupant(dest, Some(id)).is_some() {
                continue;
            }
            let level = self.level(id, dest);
            if best.map_or(true, |(_, high)| level > high) {
                best = Some((dest, level));
            }
        }
        best.map(|(dest, _)| dest).or_else(|| valid.first().copied())
    }

    /// Where a unit ends up after a missed charge: one of the hexes beside
    /// its path, the higher one first, a die breaking ties.
    pub fn missed_charge_displacement(&mut self, id: EntityId, src: HexCoord, direction: u8) -> HexCoord {
        let mut first = src.translated(rotate(direction, 1));
        let mut second = src.translated(rotate(direction, 5));
        let (first_level, second_level) = (self.level(id, first), self.level(id, second));
        if second_level > first_level || (second_level == first_level && self.dice.d6() > 3) {
            std::mem::swap(&mut first, &mut second);
        }
        [first, second]
            .into_iter()
            .find(|&dest| self.is_valid_displacement(id, src, dest))
            .unwrap_or(src)
    }

    /// Force a unit from `src` into the adjacent `dest`, resolving falls,
    /// domino chains and collisions. Returns the number of steps taken.
    pub fn displace(
        &mut self,
        id: EntityId,
        src: HexCoord,
        dest: HexCoord,
        request: Option<PilotingRequest>,
    ) -> usize {
        let mut queue = VecDeque::from([Step {
            entity: id,
            src,
            dest,
            request,
        }]);
        let limit = self.entities.len() + 1;
        let mut steps = 0;
        while let Some(step) = queue.pop_front() {
            if steps >= limit {
                tracing::warn!(entity = step.entity, "displacement chain cut short");
                break;
            }
            steps += 1;
            if let Some(next) = self.displace_step(step) {
                queue.push_back(next);
            }
        }
        steps
    }

    fn displace_step(&mut self, step: Step) -> Option<Step> {
        let Step {
            entity: id,
            src,
            dest,
            request,
        } = step;
        let Some(direction) = src.direction_to(dest) else {
            if let Some(request) = request {
                self.piloting.push(request);
            }
            return None;
        };
        if !self.board.contains(dest) {
            if self.options.push_off_board {
                self.force_off_board(id);
            } else if let Some(request) = request {
                self.piloting.push(request);
            }
            return None;
        }
        let name = self.entities.get(id)?.display_name();
        let fall = (self.level(id, src) - self.level(id, dest)).max(0);
        let occupant = self.entities.occupant(dest, Some(id));

        match occupant {
            None if fall < 2 => {
                self.report
                    .push(format!("{name} is displaced into hex {dest}.\n"));
                self.entities.get_mut(id)?.position = Some(dest);
                if let Some(request) = request {
                    self.piloting.push(request);
                }
                None
            }
            None => {
                self.report
                    .push(format!("{name} falls {fall} levels into hex {dest}.\n"));
                let mut roll = base_piloting_roll(self.entities.get(id)?);
                if let Some(request) = &request {
                    roll.append(request);
                }
                self.fall(id, dest, fall, &roll);
                None
            }
            Some(occupant) if fall < 2 => {
                let occupant_name = self.entities.get(occupant)?.display_name();
                self.report.push(format!(
                    "{name} is displaced into hex {dest}, occupied by {occupant_name}.\n"
                ));
                self.entities.get_mut(id)?.position = Some(dest);
                if let Some(request) = request {
                    self.piloting.push(request);
                }
                Some(Step {
                    entity: occupant,
                    src: dest,
                    dest: dest.translated(direction),
                    request: Some(PilotingRequest::new(occupant, 0, "domino effect")),
                })
            }
            Some(occupant) => self.collide(id, occupant, src, dest, fall, request),
        }
    }

    /// A unit falling two or more levels onto an occupied hex.
    fn collide(
        &mut self,
        id: EntityId,
        occupant: EntityId,
        src: HexCoord,
        dest: HexCoord,
        fall: i32,
        request: Option<PilotingRequest>,
    ) -> Option<Step> {
        let direction = src.direction_to(dest)?;
        let faller = self.entities.get(id)?;
        let tonnage = faller.tonnage;
        let mut base = base_piloting_roll(faller);
        if let Some(request) = &request {
            base.append(request);
        }
        let target = self.entities.get(occupant)?;
        let foliage = self.board.hex(dest).map_or(0, |h| h.foliage());
        let number = COLLISION_BASE
            + target_movement_modifier(target.hexes_moved)
            + i32::from(foliage.min(2));
        let roll = self.dice.roll_2d6();
        self.report.push(format!(
            "Collision occurs on a {number} or greater.  Rolls {roll}"
        ));

        if roll >= number {
            self.report.push(", hits!\n");
            self.damage_in_groups(occupant, HitTable::Punch, Side::Front, tonnage.div_ceil(10), 5);
            self.fall_on(id, dest, fall, 3, &base);
            if !self.entities.get(occupant).is_some_and(|e| e.is_active()) {
                return None;
            }
            match self.valid_displacement(occupant, dest, direction) {
                Some(away) => Some(Step {
                    entity: occupant,
                    src: dest,
                    dest: away,
                    request: Some(PilotingRequest::new(occupant, 2, "fallen on")),
                }),
                None => {
                    self.destroy_by_displacement(occupant);
                    None
                }
            }
        } else {
            self.report.push(", misses.\n");
            match self.valid_displacement(id, dest, direction) {
                Some(beside) => Some(Step {
                    entity: id,
                    src: dest,
                    dest: beside,
                    request: Some(PilotingRequest::automatic_fail(id, 0, "pushed off a cliff")),
                }),
                None => {
                    self.destroy_by_displacement(id);
                    None
                }
            }
        }
    }

    /// A unit losing its footing falls from `src` into `dest`. If `dest` is
    /// held by a unit that cannot make room, it falls where it stood.
    pub fn fall_into(&mut self, id: EntityId, src: HexCoord, dest: HexCoord) {
        let mut landing = dest;
        let mut shove = None;
        if let (Some(direction), Some(occupant)) =
            (src.direction_to(dest), self.entities.occupant(dest, Some(id)))
        {
            let onward = dest.translated(direction);
            if self.is_valid_displacement(occupant, dest, onward) {
                shove = Some((occupant, onward));
            } else {
                landing = src;
            }
        }
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        let name = entity.display_name();
        let roll = base_piloting_roll(entity);
        let height = (self.level(id, src) - self.level(id, landing)).max(0);
        let plural = if height == 1 { "" } else { "s" };
        self.report.push(format!(
            "{name} falls {height} level{plural} into hex {landing}.\n"
        ));
        if let Some((occupant, onward)) = shove {
            self.displace(
                occupant,
                dest,
                onward,
                Some(PilotingRequest::new(occupant, 0, "domino effect")),
            );
        }
        self.fall(id, landing, height, &roll);
    }

    /// Remove a unit pushed across the board edge.
    pub fn force_off_board(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        entity.removal = Some(Removal::PushedOff);
        entity.position = None;
        self.report.push(format!(
            "\n*** {} has been forced from the field. ***\n",
            entity.display_name()
        ));
        tracing::debug!(entity = id, "forced off the board");
    }

    /// Destroy a unit with nowhere to go.
    pub fn destroy_by_displacement(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        entity.doomed = true;
        self.report.push(format!(
            "*** {} DESTROYED due to impossible displacement! ***\n",
            entity.display_name()
        ));
    }
}

#[cfg(test)]
mod tests {
    use crate::board::Hex;
    use crate::combat::test_support::{centurion, Fixture};
    use crate::dice::ScriptedDice;
    use crate::entity::Removal;
    use crate::hex::HexCoord;
    use crate::piloting::PilotingRequest;
    use proptest::prelude::*;

    const HERE: HexCoord = HexCoord::new(5, 8);

    fn single(dice: ScriptedDice) -> Fixture {
        Fixture::new(dice).with(centurion(1, 1, HERE, 0))
    }

    // ========================================================================
    // Validity
    // ========================================================================

    #[test]
    fn test_off_board_is_invalid() {
        let edge = HexCoord::new(0, 0);
        let mut fixture = Fixture::new(ScriptedDice::new([])).with(centurion(1, 1, edge, 0));
        assert!(!fixture.battle().is_valid_displacement(1, edge, edge.translated(0)));
    }

    #[test]
    fn test_climb_limit() {
        let mut fixture = single(ScriptedDice::new([]));
        let ahead = HERE.translated(0);
        fixture.board.set_hex(ahead, Hex::clear(3));
        assert!(!fixture.battle().is_valid_displacement(1, HERE, ahead));
        fixture.board.set_hex(ahead, Hex::clear(2));
        assert!(fixture.battle().is_valid_displacement(1, HERE, ahead));
    }

    #[test]
    fn test_chain_blocked_at_far_end() {
        let ahead = HERE.translated(0);
        let mut fixture = single(ScriptedDice::new([])).with(centurion(2, 2, ahead, 3));
        fixture.board.set_hex(ahead.translated(0), Hex::clear(5));
        assert!(!fixture.battle().is_valid_displacement(1, HERE, ahead));
    }

    #[test]
    fn test_fallback_direction_order() {
        let mut fixture = single(ScriptedDice::new([]));
        fixture.board.set_hex(HERE.translated(0), Hex::clear(4));
        let dest = fixture.battle().valid_displacement(1, HERE, 0);
        assert_eq!(dest, Some(HERE.translated(5)));
    }

    #[test]
    fn test_preferred_picks_highest_empty_hex() {
        let mut fixture = single(ScriptedDice::new([]))
            .with(centurion(2, 2, HERE.translated(0), 3));
        fixture.board.set_hex(HERE.translated(2), Hex::clear(1));
        let dest = fixture.battle().preferred_displacement(1, HERE, 0);
        assert_eq!(dest, Some(HERE.translated(2)));
    }

    #[test]
    fn test_missed_charge_prefers_higher_side() {
        let mut fixture = single(ScriptedDice::new([]));
        fixture.board.set_hex(HERE.translated(5), Hex::clear(1));
        let dest = fixture.battle().missed_charge_displacement(1, HERE, 0);
        assert_eq!(dest, HERE.translated(5));
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[test]
    fn test_domino_chain_moves_everyone() {
        let first = HERE.translated(0);
        let second = first.translated(0);
        let mut fixture = single(ScriptedDice::new([]))
            .with(centurion(2, 2, first, 3))
            .with(centurion(3, 2, second, 3));
        let steps = fixture.battle().displace(
            1,
            HERE,
            first,
            Some(PilotingRequest::new(1, 0, "was pushed")),
        );
        assert_eq!(steps, 3);
        assert_eq!(fixture.entity(1).position, Some(first));
        assert_eq!(fixture.entity(2).position, Some(second));
        assert_eq!(fixture.entity(3).position, Some(second.translated(0)));
        assert_eq!(fixture.piloting.requests_for(3)[0].reason, "domino effect");
        assert!(fixture.report.as_str().contains("occupied by"));
    }

    #[test]
    fn test_off_board_respects_option() {
        let edge = HexCoord::new(5, 0);
        let mut fixture = Fixture::new(ScriptedDice::new([])).with(centurion(1, 1, edge, 0));
        fixture.options.push_off_board = false;
        fixture.battle().displace(
            1,
            edge,
            edge.translated(0),
            Some(PilotingRequest::new(1, 0, "was pushed")),
        );
        assert_eq!(fixture.entity(1).position, Some(edge));
        assert_eq!(fixture.piloting.len(), 1);

        fixture.options.push_off_board = true;
        fixture.battle().displace(1, edge, edge.translated(0), None);
        assert_eq!(fixture.entity(1).removal, Some(Removal::PushedOff));
    }

    #[test]
    fn test_fall_down_a_cliff() {
        let mut fixture = single(ScriptedDice::new([]).with_singles([1]));
        fixture.board.set_hex(HERE, Hex::clear(3));
        let below = HERE.translated(0);
        fixture.battle().displace(1, HERE, below, None);
        let entity = fixture.entity(1);
        assert!(entity.prone);
        assert_eq!(entity.position, Some(below));
        assert!(fixture.report.as_str().contains("falls 3 levels into hex"));
    }

    #[test]
    fn test_collision_hit_displaces_occupant() {
        let below = HERE.translated(0);
        // Collision roll 12, then fallback 7s for locations and checks.
        let mut fixture = single(ScriptedDice::new([12]).with_singles([3, 3]))
            .with(centurion(2, 2, below, 3));
        fixture.board.set_hex(HERE, Hex::clear(2));
        fixture.battle().displace(1, HERE, below, None);
        assert!(fixture.report.as_str().contains("Collision occurs on a 7 or greater.  Rolls 12, hits!"));
        let occupant = fixture.entity(2);
        assert_eq!(occupant.damage_this_phase, 5);
        assert_eq!(occupant.position, Some(below.translated(0)));
        assert_eq!(fixture.entity(1).position, Some(below));
        assert!(fixture.entity(1).prone);
    }

    #[test]
    fn test_collision_miss_slides_aside() {
        let below = HERE.translated(0);
        let mut fixture = single(ScriptedDice::new([2]))
            .with(centurion(2, 2, below, 3));
        fixture.board.set_hex(HERE, Hex::clear(2));
        fixture.battle().displace(1, HERE, below, None);
        assert!(fixture.report.as_str().contains(", misses."));
        assert_eq!(fixture.entity(2).position, Some(below));
        let faller = fixture.entity(1);
        assert_ne!(faller.position, Some(below));
        assert_ne!(faller.position, Some(HERE));
    }

    #[test]
    fn test_fall_into_blocked_hex_falls_in_place() {
        let ahead = HERE.translated(0);
        let mut fixture = single(ScriptedDice::new([]))
            .with(centurion(2, 2, ahead, 3));
        fixture.board.set_hex(ahead.translated(0), Hex::clear(6));
        fixture.battle().fall_into(1, HERE, ahead);
        assert_eq!(fixture.entity(1).position, Some(HERE));
        assert_eq!(fixture.entity(2).position, Some(ahead));
        assert!(fixture.report.as_str().contains("falls 0 levels into hex"));
    }

    proptest! {
        #[test]
        fn prop_chain_steps_bounded(count in 1u32..8, gap in 0u32..3) {
            let mut fixture = Fixture::new(ScriptedDice::new([]));
            let mut position = HERE;
            for id in 1..=count {
                fixture = fixture.with(centurion(id, 1, position, 0));
                position = position.translated(0);
            }
            for _ in 0..gap {
                position = position.translated(0);
            }
            fixture.board.set_hex(position, Hex::clear(4));
            let before = fixture.entities.len();
            let steps = fixture.battle().displace(1, HERE, HERE.translated(0), None);
            prop_assert!(steps <= before);
        }
    }
}
