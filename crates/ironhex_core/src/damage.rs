//! Damage application: armor, structure, transfers, critical hits and
//! ammunition explosions.
//!
//! One call to [`DamageResolver::apply`] runs a work-list to completion.
//! Damage steps, critical rolls and explosions are pushed onto a stack so
//! that a critical hit and anything it sets off resolve before the excess
//! damage moves on to the next location. An item explodes at most once:
//! only the first critical hit on a working mount can set it off.

use crate::dice::Dice;
use crate::entity::{Entity, HitData, Location, Points, SlotContent, SystemKind};
use crate::piloting::{damage_crew, PilotingQueue, PilotingRequest};
use crate::report::Report;

/// Bookkeeping for one damage application.
///
/// `damage + explosion_damage == absorbed + discarded` always holds, and
/// the entity's total armor and structure drops by exactly
/// `absorbed + lost_with_locations`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageOutcome {
    /// Points removed from armor or structure by the damage itself.
    pub absorbed: u32,
    /// Damage with nowhere to go: unit already destroyed or contained by CASE.
    pub discarded: u32,
    /// Damage added by ammunition explosions.
    pub explosion_damage: u32,
    /// Remaining armor and structure of locations lost outright.
    pub lost_with_locations: u32,
    /// Critical hit checks rolled.
    pub criticals_rolled: u32,
}

enum Work {
    Damage {
        hit: HitData,
        amount: u32,
        explosion: bool,
        crits: u32,
    },
    Critical(Location),
    Explosion(usize),
    ExplosionAftermath,
}

/// Applies damage to a single entity.
pub struct DamageResolver<'a> {
    dice: &'a mut dyn Dice,
    report: &'a mut Report,
    piloting: &'a mut PilotingQueue,
    work: Vec<Work>,
    outcome: DamageOutcome,
}

impl<'a> DamageResolver<'a> {
    /// Create a resolver writing to `report` and queueing piloting checks.
    pub fn new(
        dice: &'a mut dyn Dice,
        report: &'a mut Report,
        piloting: &'a mut PilotingQueue,
    ) -> Self {
        Self {
            dice,
            report,
            piloting,
            work: Vec::new(),
            outcome: DamageOutcome::default(),
        }
    }

    /// Apply `damage` starting at `hit` and resolve every consequence.
    pub fn apply(&mut self, entity: &mut Entity, hit: HitData, damage: u32) -> DamageOutcome {
        self.outcome = DamageOutcome::default();
        entity.damage_this_phase += damage;
        if hit.location == Location::Head && entity.is_mech() && damage > 0 {
            damage_crew(entity, 1, self.report);
        }
        self.work.push(Work::Damage {
            hit,
            amount: damage,
            explosion: false,
            crits: u32::from(hit.through_armor_critical),
        });
        self.run(entity);
        std::mem::take(&mut self.outcome)
    }

    /// Explode a mounted item in place.
    pub fn explode(&mut self, entity: &mut Entity, equipment: usize) -> DamageOutcome {
        self.outcome = DamageOutcome::default();
        self.work.push(Work::Explosion(equipment));
        self.run(entity);
        std::mem::take(&mut self.outcome)
    }

    fn run(&mut self, entity: &mut Entity) {
        while let Some(work) = self.work.pop() {
            match work {
                Work::Damage {
                    hit,
                    amount,
                    explosion,
                    crits,
                } => self.damage_location(entity, hit, amount, explosion, crits),
                Work::Critical(location) => self.critical(entity, location),
                Work::Explosion(index) => self.explosion(entity, index),
                Work::ExplosionAftermath => {
                    if !entity.doomed && !entity.destroyed {
                        damage_crew(entity, 2, self.report);
                    }
                }
            }
        }
    }

    fn damage_location(
        &mut self,
        entity: &mut Entity,
        hit: HitData,
        mut amount: u32,
        explosion: bool,
        mut crits: u32,
    ) {
        if amount == 0 {
            return;
        }
        if entity.doomed || entity.destroyed {
            self.outcome.discarded += amount;
            return;
        }
        let location = hit.location;
        self.report.push(format!(
            "\n        {} takes {amount} damage to {location}.",
            entity.display_name()
        ));
        let Some(state) = entity.location_mut(location) else {
            self.outcome.discarded += amount;
            return;
        };
        if state.internal == Points::Doomed {
            crits = 0;
        }

        if !explosion {
            let armor = match (hit.rear, state.rear_armor.as_mut()) {
                (true, Some(rear)) => rear,
                _ => &mut state.armor,
            };
            if let Points::Remaining(points) = *armor {
                if points > amount {
                    *armor = Points::Remaining(points - amount);
                    self.outcome.absorbed += amount;
                    self.report.push(format!(" {} Armor remaining.", points - amount));
                    amount = 0;
                } else if points > 0 {
                    *armor = Points::Remaining(0);
                    self.outcome.absorbed += points;
                    amount -= points;
                    self.report.push(" Armor destroyed,");
                }
            }
        }

        let mut next = None;
        if amount > 0 {
            let mut destroyed = false;
            if let Points::Remaining(internal) = state.internal {
                if internal > 0 {
                    crits += 1;
                    if internal > amount {
                        state.internal = Points::Remaining(internal - amount);
                        self.outcome.absorbed += amount;
                        self.report
                            .push(format!(" {} Internal Structure remaining.", internal - amount));
                        amount = 0;
                    } else {
                        state.internal = Points::Remaining(0);
                        self.outcome.absorbed += internal;
                        amount -= internal;
                        destroyed = true;
                    }
                }
            }
            if destroyed {
                self.destroy_location(entity, location);
                self.report.push(" <<<SECTION DESTROYED>>>,");
                if location != Location::CenterTorso && entity.engine_hits() > 2 && !entity.doomed {
                    entity.doomed = true;
                    self.report.push(format!(
                        "\n*** {} ENGINE DESTROYED! ***",
                        entity.display_name()
                    ));
                }
            }

            if entity.internal(location).value() == 0 {
                match entity.chassis.transfer(location) {
                    None => {
                        if !entity.doomed {
                            self.report
                                .push(format!("\n*** {} DESTROYED! ***", entity.display_name()));
                        }
                        entity.doomed = true;
                        self.outcome.discarded += amount;
                        amount = 0;
                        crits = 0;
                    }
                    Some(_) if entity.doomed => {
                        self.outcome.discarded += amount;
                        amount = 0;
                    }
                    Some(_) if explosion && entity.has_case(location) => {
                        if amount > 0 {
                            self.report
                                .push(format!(" remaining {amount} damage prevented by CASE."));
                        }
                        self.outcome.discarded += amount;
                        amount = 0;
                    }
                    Some(to) => {
                        if amount > 0 {
                            self.report.push(format!(" {amount} damage transfers to {to}."));
                            next = Some(HitData::new(to, hit.rear && to.has_rear()));
                        }
                    }
                }
            }
        }

        if let Some(hit) = next {
            self.work.push(Work::Damage {
                hit,
                amount,
                explosion,
                crits: 0,
            });
        }
        if entity.is_mech() {
            for _ in 0..crits {
                self.work.push(Work::Critical(location));
            }
        }
    }

    /// Mark a location and everything in it lost, then anything attached to it.
    fn destroy_location(&mut self, entity: &mut Entity, location: Location) {
        let mut next = Some(location);
        while let Some(loc) = next.take() {
            let Some(state) = entity.location_mut(loc) else {
                break;
            };
            if state.internal.is_gone() {
                break;
            }
            self.outcome.lost_with_locations += state.total_points();
            state.armor = Points::Doomed;
            if let Some(rear) = state.rear_armor.as_mut() {
                *rear = Points::Doomed;
            }
            state.internal = Points::Doomed;
            for slot in state.slots.iter_mut().flatten() {
                slot.missing = true;
            }
            for mounted in entity.equipment.iter_mut().filter(|m| m.location == loc) {
                mounted.missing = true;
            }
            if entity.chassis.is_leg(loc) {
                self.piloting
                    .push(PilotingRequest::automatic_fail(entity.id, 5, "leg destroyed"));
            }
            next = entity.chassis.dependent(loc);
        }
    }

    fn critical(&mut self, entity: &mut Entity, location: Location) {
        if entity.doomed || entity.destroyed {
            return;
        }
        self.outcome.criticals_rolled += 1;
        let roll = self.dice.roll_2d6();
        self.report
            .push(format!("\n        Critical hit on {location}. Roll = {roll};"));
        let hits = match roll {
            ..=7 => {
                self.report.push(" no effect.");
                return;
            }
            8 | 9 => 1,
            10 | 11 => 2,
            _ if entity.chassis.is_leg(location) || entity.chassis.is_arm(location) => {
                if !entity.is_location_destroyed(location) {
                    self.report.push(" <<<LIMB BLOWN OFF>>>");
                    self.destroy_location(entity, location);
                }
                return;
            }
            _ if location == Location::Head => {
                self.report.push(" <<<HEAD BLOWN OFF>>>");
                self.destroy_location(entity, location);
                entity.crew.dead = true;
                entity.crew.rolls_needed = 0;
                entity.doomed = true;
                return;
            }
            _ => 3,
        };

        let mut target = location;
        for _ in 0..2 {
            let empty = entity
                .location(target)
                .map_or(true, |l| l.hittable_slots().is_empty());
            if !empty {
                break;
            }
            let Some(next) = entity.chassis.transfer(target) else {
                break;
            };
            target = next;
            self.report
                .push(format!(" Location is empty, so criticals transfer to {target}."));
        }

        for _ in 0..hits {
            let slots = entity
                .location(target)
                .map(|l| l.hittable_slots())
                .unwrap_or_default();
            if slots.is_empty() {
                break;
            }
            let slot = slots[self.dice.pick(slots.len())];
            self.slot_hit(entity, target, slot);
        }
    }

    fn slot_hit(&mut self, entity: &mut Entity, location: Location, index: usize) {
        let Some(slot) = entity
            .location_mut(location)
            .and_then(|l| l.slots.get_mut(index))
            .and_then(Option::as_mut)
        else {
            return;
        };
        slot.hit = true;
        match slot.content {
            SlotContent::System(system) => self.system_hit(entity, system),
            SlotContent::Equipment(equipment) => {
                let Some(mounted) = entity.equipment.get_mut(equipment) else {
                    return;
                };
                let first = mounted.is_working();
                mounted.hit = true;
                self.report
                    .push(format!("\n            <<<CRITICAL HIT>>> on {}.", mounted.name()));
                if first && mounted.is_explosive() {
                    self.work.push(Work::Explosion(equipment));
                }
            }
        }
    }

    fn system_hit(&mut self, entity: &mut Entity, system: SystemKind) {
        self.report
            .push(format!("\n            <<<CRITICAL HIT>>> on {}.", system_name(system)));
        let id = entity.id;
        match system {
            SystemKind::Cockpit => {
                entity.crew.dead = true;
                entity.crew.rolls_needed = 0;
                self.report.push(format!(
                    "\n*** {} PILOT KILLED! ***",
                    entity.display_name()
                ));
            }
            SystemKind::Engine if entity.engine_hits() > 2 && !entity.doomed => {
                entity.doomed = true;
                self.report.push(format!(
                    "\n*** {} ENGINE DESTROYED! ***",
                    entity.display_name()
                ));
            }
            SystemKind::Gyro if entity.gyro_hits() > 1 => {
                self.piloting
                    .push(PilotingRequest::automatic_fail(id, 3, "gyro destroyed"));
            }
            SystemKind::Gyro => self.piloting.push(PilotingRequest::new(id, 3, "gyro hit")),
            SystemKind::Hip => self
                .piloting
                .push(PilotingRequest::new(id, 2, "hip actuator hit")),
            SystemKind::UpperLeg | SystemKind::LowerLeg | SystemKind::Foot => self
                .piloting
                .push(PilotingRequest::new(id, 1, "leg/foot actuator hit")),
            _ => {}
        }
    }

    fn explosion(&mut self, entity: &mut Entity, index: usize) {
        if entity.doomed || entity.destroyed {
            return;
        }
        let Some(mounted) = entity.equipment.get_mut(index) else {
            return;
        };
        let damage = mounted.explosion_damage();
        if damage == 0 {
            return;
        }
        mounted.shots_left = 0;
        let location = mounted.location;
        self.report.push(format!(
            "\n*** {} EXPLODES!  {damage} DAMAGE! ***",
            mounted.name()
        ));
        self.outcome.explosion_damage += damage;
        self.work.push(Work::ExplosionAftermath);
        self.work.push(Work::Damage {
            hit: HitData::new(location, false),
            amount: damage,
            explosion: true,
            crits: 0,
        });
    }
}

const fn system_name(system: SystemKind) -> &'static str {
    match system {
        SystemKind::LifeSupport => "Life Support",
        SystemKind::Sensors => "Sensors",
        SystemKind::Cockpit => "Cockpit",
        SystemKind::Engine => "Engine",
        SystemKind::Gyro => "Gyro",
        SystemKind::Shoulder => "Shoulder",
        SystemKind::UpperArm => "Upper Arm Actuator",
        SystemKind::LowerArm => "Lower Arm Actuator",
        SystemKind::Hand => "Hand Actuator",
        SystemKind::Hip => "Hip",
        SystemKind::UpperLeg => "Upper Leg Actuator",
        SystemKind::LowerLeg => "Lower Leg Actuator",
        SystemKind::Foot => "Foot Actuator",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::UnitData;
    use crate::dice::{ScriptedDice, SeededDice};
    use crate::piloting::RollKind;
    use proptest::prelude::*;

    fn centurion() -> Entity {
        let unit = UnitData::mech("Centurion", "CN9-A", 50, 4)
            .with_armor(Location::Head, 9, 0)
            .with_armor(Location::CenterTorso, 20, 8)
            .with_armor(Location::LeftTorso, 10, 4)
            .with_armor(Location::RightTorso, 10, 4)
            .with_armor(Location::LeftArm, 8, 0)
            .with_armor(Location::RightArm, 8, 0)
            .with_armor(Location::LeftLeg, 12, 0)
            .with_armor(Location::RightLeg, 12, 0)
            .with_item("ac_10", Location::RightTorso)
            .with_item("ammo:ac_10", Location::LeftTorso)
            .with_item("medium_laser", Location::LeftArm);
        Entity::from_unit_data(1, 1, &unit).unwrap()
    }

    fn expose(entity: &mut Entity, location: Location, internal: u32) {
        let state = entity.location_mut(location).unwrap();
        state.armor = Points::Remaining(0);
        state.internal = Points::Remaining(internal);
    }

    struct Harness {
        dice: ScriptedDice,
        report: Report,
        piloting: PilotingQueue,
    }

    impl Harness {
        fn new(dice: ScriptedDice) -> Self {
            Self {
                dice,
                report: Report::new(),
                piloting: PilotingQueue::new(),
            }
        }

        fn apply(&mut self, entity: &mut Entity, hit: HitData, damage: u32) -> DamageOutcome {
            DamageResolver::new(&mut self.dice, &mut self.report, &mut self.piloting)
                .apply(entity, hit, damage)
        }
    }

    // ========================================================================
    // Armor and structure
    // ========================================================================

    #[test]
    fn test_armor_absorbs_first() {
        let mut entity = centurion();
        let mut harness = Harness::new(ScriptedDice::new([]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::CenterTorso, false), 5);
        assert_eq!(entity.armor(Location::CenterTorso, false), Points::Remaining(15));
        assert_eq!(entity.armor(Location::CenterTorso, true), Points::Remaining(8));
        assert_eq!(outcome.absorbed, 5);
        assert_eq!(outcome.criticals_rolled, 0);
        assert_eq!(entity.damage_this_phase, 5);
    }

    #[test]
    fn test_rear_hit_uses_rear_armor() {
        let mut entity = centurion();
        let mut harness = Harness::new(ScriptedDice::new([5]));
        harness.apply(&mut entity, HitData::new(Location::CenterTorso, true), 10);
        assert_eq!(entity.armor(Location::CenterTorso, true), Points::Remaining(0));
        assert_eq!(entity.armor(Location::CenterTorso, false), Points::Remaining(20));
        assert_eq!(entity.internal(Location::CenterTorso), Points::Remaining(14));
    }

    #[test]
    fn test_torso_overflow_transfers_excess() {
        let mut entity = centurion();
        expose(&mut entity, Location::LeftTorso, 4);
        let mut harness = Harness::new(ScriptedDice::new([5]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::LeftTorso, false), 7);

        assert_eq!(entity.internal(Location::LeftTorso), Points::Doomed);
        // The left arm goes with its torso.
        assert_eq!(entity.internal(Location::LeftArm), Points::Doomed);
        assert!(entity.equipment[2].missing);
        assert_eq!(entity.armor(Location::CenterTorso, false), Points::Remaining(17));
        assert_eq!(outcome.criticals_rolled, 1);
        assert!(harness.report.as_str().contains("3 damage transfers to CT"));
        assert!(!entity.doomed);
    }

    #[test]
    fn test_destroyed_location_passes_damage_on() {
        let mut entity = centurion();
        expose(&mut entity, Location::LeftArm, 1);
        let mut harness = Harness::new(ScriptedDice::new([2, 2]));
        harness.apply(&mut entity, HitData::new(Location::LeftArm, false), 1);
        assert_eq!(entity.internal(Location::LeftArm), Points::Doomed);
        let before = entity.location(Location::LeftArm).cloned();

        let outcome = harness.apply(&mut entity, HitData::new(Location::LeftArm, false), 6);
        assert_eq!(entity.location(Location::LeftArm).cloned(), before);
        assert_eq!(entity.armor(Location::LeftTorso, false), Points::Remaining(4));
        assert_eq!(outcome.absorbed, 6);
        // No critical check for a location lost earlier in the phase.
        assert_eq!(outcome.criticals_rolled, 0);
    }

    #[test]
    fn test_center_torso_destroyed_dooms_unit() {
        let mut entity = centurion();
        expose(&mut entity, Location::CenterTorso, 2);
        let mut harness = Harness::new(ScriptedDice::new([]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::CenterTorso, false), 10);
        assert!(entity.doomed);
        assert!(!entity.is_active());
        assert_eq!(outcome.absorbed, 2);
        assert_eq!(outcome.discarded, 8);
        assert_eq!(outcome.criticals_rolled, 0);
        assert!(harness.report.as_str().contains("DESTROYED!"));
    }

    #[test]
    fn test_leg_destroyed_queues_automatic_fall() {
        let mut entity = centurion();
        expose(&mut entity, Location::RightLeg, 3);
        let mut harness = Harness::new(ScriptedDice::new([4]));
        harness.apply(&mut entity, HitData::new(Location::RightLeg, false), 3);
        let requests = harness.piloting.requests_for(entity.id);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, RollKind::AutomaticFail);
        assert_eq!(requests[0].modifier, 5);
    }

    #[test]
    fn test_head_hit_wounds_pilot() {
        let mut entity = centurion();
        let mut harness = Harness::new(ScriptedDice::new([]));
        harness.apply(&mut entity, HitData::new(Location::Head, false), 3);
        assert_eq!(entity.crew.hits, 1);
        assert_eq!(entity.crew.rolls_needed, 1);
    }

    // ========================================================================
    // Criticals and explosions
    // ========================================================================

    #[test]
    fn test_through_armor_critical() {
        let mut entity = centurion();
        let mut harness = Harness::new(ScriptedDice::new([8]).with_picks([3]));
        let hit = HitData {
            location: Location::CenterTorso,
            rear: false,
            through_armor_critical: true,
        };
        let outcome = harness.apply(&mut entity, hit, 2);
        assert_eq!(outcome.criticals_rolled, 1);
        // Slot 3 of the center torso is the first gyro slot.
        assert_eq!(entity.gyro_hits(), 1);
        let requests = harness.piloting.requests_for(entity.id);
        assert_eq!(requests[0].reason, "gyro hit");
        assert_eq!(requests[0].kind, RollKind::Normal);
    }

    #[test]
    fn test_ammo_explosion_transfers_without_case() {
        let mut entity = centurion();
        expose(&mut entity, Location::LeftTorso, 12);
        // Crit check 8: one slot; the only hittable slot is the ammo bin.
        let mut harness = Harness::new(ScriptedDice::new([8, 4, 4]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::LeftTorso, false), 2);
        assert_eq!(outcome.explosion_damage, 100);
        assert!(entity.doomed);
        assert_eq!(entity.equipment[1].shots_left, 0);
        assert_eq!(2 + outcome.explosion_damage, outcome.absorbed + outcome.discarded);
        assert!(harness.report.as_str().contains("EXPLODES!  100 DAMAGE!"));
    }

    #[test]
    fn test_case_contains_explosion() {
        let unit = UnitData::mech("Centurion", "CN9-AL", 50, 4)
            .with_armor(Location::CenterTorso, 20, 8)
            .with_item("ammo:ac_10", Location::LeftTorso)
            .with_item("case", Location::LeftTorso);
        let mut entity = Entity::from_unit_data(1, 1, &unit).unwrap();
        let mut harness = Harness::new(ScriptedDice::new([9, 5]).with_picks([0]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::LeftTorso, false), 2);
        assert_eq!(outcome.explosion_damage, 100);
        assert!(!entity.doomed);
        assert_eq!(entity.internal(Location::LeftTorso), Points::Doomed);
        assert_eq!(entity.armor(Location::CenterTorso, false), Points::Remaining(20));
        assert_eq!(entity.crew.hits, 2);
        assert!(harness.report.as_str().contains("prevented by CASE"));
    }

    #[test]
    fn test_ammo_explodes_only_once() {
        let mut entity = centurion();
        entity.equipment[1].hit = true;
        expose(&mut entity, Location::LeftTorso, 12);
        // The bin's slot is still hittable but the mount was already hit.
        let mut harness = Harness::new(ScriptedDice::new([8]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::LeftTorso, false), 2);
        assert_eq!(outcome.explosion_damage, 0);
        assert!(!entity.doomed);
    }

    #[test]
    fn test_limb_blown_off() {
        let mut entity = centurion();
        expose(&mut entity, Location::RightArm, 8);
        let mut harness = Harness::new(ScriptedDice::new([12]));
        let outcome = harness.apply(&mut entity, HitData::new(Location::RightArm, false), 1);
        assert_eq!(entity.internal(Location::RightArm), Points::Doomed);
        assert_eq!(outcome.lost_with_locations, 7);
        assert!(harness.report.as_str().contains("LIMB BLOWN OFF"));
    }

    proptest! {
        #[test]
        fn prop_damage_is_conserved(
            seed in any::<u64>(),
            location in 0usize..8,
            rear in any::<bool>(),
            damage in 0u32..80,
            hits in 1usize..4,
        ) {
            let mut entity = centurion();
            let mut dice = SeededDice::new(seed);
            let mut report = Report::new();
            let mut piloting = PilotingQueue::new();
            let location = entity.chassis.locations()[location];
            for _ in 0..hits {
                let before = entity.total_points();
                let hit = HitData::new(location, rear && location.has_rear());
                let outcome = DamageResolver::new(&mut dice, &mut report, &mut piloting)
                    .apply(&mut entity, hit, damage);
                prop_assert_eq!(
                    damage + outcome.explosion_damage,
                    outcome.absorbed + outcome.discarded
                );
                prop_assert_eq!(
                    before - entity.total_points(),
                    outcome.absorbed + outcome.lost_with_locations
                );
            }
        }
    }
}
