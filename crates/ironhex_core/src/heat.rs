//! End phase heat and environment.

use crate::combat::Battle;
use crate::damage::DamageResolver;
use crate::entity::{Entity, EntityId, SystemKind};
use crate::piloting::{base_piloting_roll, damage_crew};

/// Heat added per damaged engine slot while the reactor runs.
pub const ENGINE_HEAT_PER_HIT: u32 = 5;
/// Heat at which shutdown checks begin.
pub const SHUTDOWN_THRESHOLD: u32 = 14;
/// Heat at which the reactor shuts down without a roll.
pub const AUTOMATIC_SHUTDOWN: u32 = 30;
/// Heat at which ammunition may cook off.
pub const AMMO_EXPLOSION_THRESHOLD: u32 = 19;

/// Target number to avoid shutdown (or to restart) at a heat level:
/// 4 at 14, rising by 2 every 4 points.
#[must_use]
pub const fn shutdown_target(heat: u32) -> i32 {
    if heat < SHUTDOWN_THRESHOLD {
        return 0;
    }
    4 + ((heat - SHUTDOWN_THRESHOLD) / 4) as i32 * 2
}

/// Target number to avoid an ammunition explosion, or `None` below the
/// threshold.
#[must_use]
pub const fn ammo_explosion_target(heat: u32) -> Option<i32> {
    match heat {
        0..=18 => None,
        19..=22 => Some(4),
        23..=27 => Some(6),
        _ => Some(8),
    }
}

/// Crew damage from a damaged life support system at a heat level.
#[must_use]
pub const fn life_support_damage(heat: u32) -> u32 {
    match heat {
        0..=14 => 0,
        15..=24 => 1,
        _ => 2,
    }
}

/// The loaded bin that would do the most damage if it went off.
fn largest_ammo_bin(entity: &Entity) -> Option<usize> {
    entity
        .equipment
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_explosive() && m.is_working())
        .max_by_key(|&(index, m)| (m.explosion_damage(), std::cmp::Reverse(index)))
        .map(|(index, _)| index)
}

impl Battle<'_> {
    /// Apply heat gained this round, then roll for start-up, shutdown and
    /// ammunition explosions.
    pub fn resolve_heat(&mut self) {
        self.report.header("Heat Phase");
        let ids: Vec<EntityId> = self
            .entities
            .sorted()
            .into_iter()
            .filter(|e| e.is_mech() && e.is_active() && e.position.is_some())
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.resolve_entity_heat(id);
        }
    }

    fn resolve_entity_heat(&mut self, id: EntityId) {
        let water = self
            .entities
            .get(id)
            .and_then(|e| e.position)
            .and_then(|p| self.board.hex(p))
            .map_or(0, |h| h.water);
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        let name = entity.display_name();

        if !entity.shut_down {
            entity.heat_buildup += ENGINE_HEAT_PER_HIT * entity.engine_hits();
        }
        let gained = std::mem::take(&mut entity.heat_buildup);
        let total = entity.heat + gained;
        let sunk = entity.heat_capacity(water).min(total);
        entity.heat = total - sunk;
        let heat = entity.heat;
        self.report.push(format!(
            "\n{name} gains {gained} heat, sinks {sunk} heat and is now at {heat} heat.\n"
        ));
        tracing::debug!(entity = id, gained, sunk, heat, "heat applied");

        if entity.shut_down && heat < AUTOMATIC_SHUTDOWN {
            if heat < SHUTDOWN_THRESHOLD {
                entity.shut_down = false;
                self.report
                    .push(format!("{name} automatically starts up.\n"));
            } else {
                let target = shutdown_target(heat);
                let roll = self.dice.roll_2d6();
                self.report.push(format!(
                    "{name} needs a {target}+ to start up, rolls {roll} : "
                ));
                if roll >= target {
                    entity.shut_down = false;
                    self.report.push("successful!\n");
                } else {
                    self.report.push("fails.\n");
                }
            }
        }

        let needs_check = self
            .entities
            .get(id)
            .is_some_and(|e| !e.shut_down && heat >= SHUTDOWN_THRESHOLD);
        if needs_check {
            self.check_shutdown(id, heat);
        }
        self.check_ammo_heat(id, heat);
        self.check_life_support_heat(id, heat);
    }

    fn check_shutdown(&mut self, id: EntityId, heat: u32) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        let name = entity.display_name();
        let shuts_down = if heat >= AUTOMATIC_SHUTDOWN {
            self.report.push(format!("{name} automatically shuts down.\n"));
            true
        } else {
            let target = shutdown_target(heat);
            let roll = self.dice.roll_2d6();
            self.report.push(format!(
                "{name} needs a {target}+ to avoid shutdown, rolls {roll} : "
            ));
            if roll >= target {
                self.report.push("avoids successfully!\n");
                false
            } else {
                self.report.push("shuts down.\n");
                true
            }
        };
        if !shuts_down {
            return;
        }
        let prone = entity.prone;
        let mut roll = base_piloting_roll(entity);
        roll.add(3, "reactor shutdown");
        if !prone {
            self.skill_check_in_place(id, &roll);
        }
        if let Some(entity) = self.entities.get_mut(id) {
            entity.shut_down = true;
        }
    }

    fn check_ammo_heat(&mut self, id: EntityId, heat: u32) {
        let Some(target) = ammo_explosion_target(heat) else {
            return;
        };
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        let roll = self.dice.roll_2d6();
        self.report.push(format!(
            "{} needs a {target}+ to avoid ammo explosion, rolls {roll} : ",
            entity.display_name()
        ));
        if roll >= target {
            self.report.push("avoids successfully!\n");
            return;
        }
        self.report.push("fails to avoid explosion.\n");
        match largest_ammo_bin(entity) {
            Some(bin) => {
                DamageResolver::new(&mut *self.dice, &mut *self.report, &mut *self.piloting)
                    .explode(entity, bin);
            }
            None => self.report.push("  Luckily, there is no ammo to explode.\n"),
        }
    }

    fn check_life_support_heat(&mut self, id: EntityId, heat: u32) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        if entity.damaged_systems(SystemKind::LifeSupport, None) == 0 {
            return;
        }
        let amount = life_support_damage(heat);
        if amount > 0 {
            self.report.push(format!(
                "{} has damaged life support.",
                entity.display_name()
            ));
            damage_crew(entity, amount, self.report);
            self.report.push("\n");
        }
    }

    /// Crews of mechs submerged with damaged life support take a hit.
    pub fn check_suffocation(&mut self) {
        for id in self.entities.sorted_ids() {
            let depth = self
                .entities
                .get(id)
                .and_then(|e| e.position)
                .and_then(|p| self.board.hex(p))
                .map_or(0, |h| h.water);
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            if !entity.is_mech() || !entity.is_active() {
                continue;
            }
            let submerged = depth > 1 || (depth == 1 && entity.prone);
            if !submerged || entity.damaged_systems(SystemKind::LifeSupport, None) == 0 {
                continue;
            }
            self.report.push(format!(
                "\n{} is underwater with damaged life support.  Mechwarrior takes 1 damage.",
                entity.display_name()
            ));
            damage_crew(entity, 1, self.report);
            self.report.push("\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Hex;
    use crate::combat::test_support::{centurion, Fixture};
    use crate::dice::ScriptedDice;
    use crate::entity::{EquipmentType, Location, SlotContent};
    use crate::hex::HexCoord;

    const HERE: HexCoord = HexCoord::new(5, 8);

    fn mech_at_heat(heat: u32, dice: ScriptedDice) -> Fixture {
        let mut fixture = Fixture::new(dice).with(centurion(1, 1, HERE, 0));
        fixture.entity_mut(1).heat_buildup = heat + 10;
        fixture
    }

    fn damage_system(entity: &mut Entity, system: SystemKind) {
        let slot = entity
            .locations
            .iter_mut()
            .flat_map(|l| l.slots.iter_mut().flatten())
            .find(|s| s.content == SlotContent::System(system))
            .unwrap();
        slot.hit = true;
    }

    #[test]
    fn test_threshold_tables() {
        assert_eq!(shutdown_target(14), 4);
        assert_eq!(shutdown_target(17), 4);
        assert_eq!(shutdown_target(18), 6);
        assert_eq!(shutdown_target(26), 10);
        assert_eq!(ammo_explosion_target(18), None);
        assert_eq!(ammo_explosion_target(19), Some(4));
        assert_eq!(ammo_explosion_target(23), Some(6));
        assert_eq!(ammo_explosion_target(28), Some(8));
    }

    #[test]
    fn test_sinks_apply_before_checks() {
        let mut fixture = mech_at_heat(5, ScriptedDice::new([]));
        fixture.battle().resolve_heat();
        let entity = fixture.entity(1);
        assert_eq!(entity.heat, 5);
        assert_eq!(entity.heat_buildup, 0);
        assert!(fixture
            .report
            .as_str()
            .contains("gains 15 heat, sinks 10 heat and is now at 5 heat."));
    }

    #[test]
    fn test_engine_damage_adds_heat() {
        let mut fixture = mech_at_heat(0, ScriptedDice::new([]));
        fixture.entity_mut(1).heat_buildup = 0;
        damage_system(fixture.entity_mut(1), SystemKind::Engine);
        fixture.battle().resolve_heat();
        assert!(fixture.report.as_str().contains("gains 5 heat"));
    }

    #[test]
    fn test_heat_19_ammo_check_needs_4() {
        // Shutdown avoid roll 12, ammo roll 4.
        let mut fixture = mech_at_heat(19, ScriptedDice::new([12, 4]));
        fixture.battle().resolve_heat();
        let report = fixture.report.as_str();
        assert!(report.contains("needs a 6+ to avoid shutdown, rolls 12 : avoids successfully!"));
        assert!(report.contains("needs a 4+ to avoid ammo explosion, rolls 4 : avoids successfully!"));
        assert!(!fixture.entity(1).shut_down);
    }

    #[test]
    fn test_failed_ammo_roll_explodes_largest_bin() {
        let mut fixture = mech_at_heat(19, ScriptedDice::new([12, 3]));
        fixture.battle().resolve_heat();
        assert!(fixture.report.as_str().contains("fails to avoid explosion."));
        let entity = fixture.entity(1);
        // LRM 10 ammo (120 damage) goes before AC/10 ammo (100).
        let lrm_bin = &entity.equipment[2];
        assert!(matches!(lrm_bin.kind, EquipmentType::Ammo { .. }));
        assert_eq!(lrm_bin.shots_left, 0);
        assert!(entity.doomed || entity.is_location_destroyed(Location::LeftTorso));
    }

    #[test]
    fn test_ammo_roll_made_without_ammo() {
        let unit = crate::data::UnitData::mech("Wasp", "WSP-1A", 20, 6)
            .with_item("medium_laser", Location::RightArm);
        let mut wasp = Entity::from_unit_data(1, 1, &unit).unwrap();
        wasp.position = Some(HERE);
        wasp.heat_buildup = 19 + 10;
        let mut fixture = Fixture::new(ScriptedDice::new([12, 3, 9])).with(wasp);
        fixture.battle().resolve_heat();
        let report = fixture.report.as_str();
        assert!(report.contains("needs a 4+ to avoid ammo explosion, rolls 3 : fails to avoid explosion."));
        assert!(report.contains("Luckily, there is no ammo to explode."));
        assert_eq!(fixture.dice.remaining(), 1);
    }

    #[test]
    fn test_automatic_shutdown_and_restart() {
        let mut fixture = mech_at_heat(30, ScriptedDice::new([]).with_fallback(12));
        fixture.battle().resolve_heat();
        assert!(fixture.entity(1).shut_down);
        assert!(fixture.report.as_str().contains("automatically shuts down."));
        assert!(fixture.report.as_str().contains("reactor shutdown"));

        fixture.report.clear();
        fixture.entity_mut(1).heat = 3;
        fixture.entity_mut(1).heat_buildup = 0;
        fixture.battle().resolve_heat();
        assert!(!fixture.entity(1).shut_down);
        assert!(fixture.report.as_str().contains("automatically starts up."));
    }

    #[test]
    fn test_restart_roll_while_hot() {
        let mut fixture = mech_at_heat(16, ScriptedDice::new([3]));
        fixture.entity_mut(1).shut_down = true;
        fixture.battle().resolve_heat();
        assert!(fixture.report.as_str().contains("needs a 4+ to start up, rolls 3 : fails."));
        assert!(fixture.entity(1).shut_down);
    }

    #[test]
    fn test_life_support_heat_damage() {
        let mut fixture = mech_at_heat(16, ScriptedDice::new([12]));
        damage_system(fixture.entity_mut(1), SystemKind::LifeSupport);
        fixture.battle().resolve_heat();
        assert_eq!(fixture.entity(1).crew.hits, 1);
    }

    #[test]
    fn test_suffocation_needs_depth() {
        let mut fixture = mech_at_heat(0, ScriptedDice::new([]));
        damage_system(fixture.entity_mut(1), SystemKind::LifeSupport);
        fixture.board.set_hex(HERE, Hex::clear(0).with_water(1));
        fixture.battle().check_suffocation();
        assert_eq!(fixture.entity(1).crew.hits, 0);

        fixture.entity_mut(1).prone = true;
        fixture.battle().check_suffocation();
        assert_eq!(fixture.entity(1).crew.hits, 1);

        fixture.entity_mut(1).prone = false;
        fixture.board.set_hex(HERE, Hex::clear(0).with_water(2));
        fixture.battle().check_suffocation();
        assert_eq!(fixture.entity(1).crew.hits, 2);
    }
}
