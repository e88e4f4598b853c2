//! Attack resolution.
//!
//! [`Battle`] bundles everything a resolver mutates: the entity arena, the
//! dice, the report being written and the piloting queue. Firing and
//! physical attacks are resolved from the frozen action list in declaration
//! order; a problem with one action is reported and the next one resolves
//! normally.

use crate::action::{Action, Arm, Leg};
use crate::board::Board;
use crate::damage::{DamageOutcome, DamageResolver};
use crate::data::{cluster_hits, WeaponDamage, WeaponTags};
use crate::dice::Dice;
use crate::entity::{
    ClubKind, Entity, EntityId, EntityStorage, EquipmentType, HitData, HitTable, Location,
    Mounted, SystemKind,
};
use crate::hex::{HexCoord, Side};
use crate::options::GameOptions;
use crate::piloting::{base_piloting_roll, PilotingQueue, PilotingRequest};
use crate::report::Report;
use crate::to_hit::{AttackContext, ToHit};

/// Mutable view of a session used while resolving a phase.
pub struct Battle<'a> {
    /// Terrain.
    pub board: &'a Board,
    /// Rule switches.
    pub options: &'a GameOptions,
    /// Units in play.
    pub entities: &'a mut EntityStorage,
    /// Dice.
    pub dice: &'a mut dyn Dice,
    /// Report being written.
    pub report: &'a mut Report,
    /// Piloting checks raised so far this phase.
    pub piloting: &'a mut PilotingQueue,
}

// ============================================================================
// Damage values
// ============================================================================

/// Punch damage: a tenth of the weight, halved for each missing arm actuator.
#[must_use]
pub fn punch_damage(entity: &Entity, arm: Location) -> u32 {
    let mut damage = entity.tonnage.div_ceil(10);
    for actuator in [SystemKind::UpperArm, SystemKind::LowerArm] {
        if !entity.has_working_system(actuator, arm) {
            damage /= 2;
        }
    }
    damage
}

/// Kick damage: a fifth of the weight, halved for each missing leg actuator.
#[must_use]
pub fn kick_damage(entity: &Entity, leg: Location) -> u32 {
    let mut damage = entity.tonnage / 5;
    for actuator in [SystemKind::UpperLeg, SystemKind::LowerLeg] {
        if !entity.has_working_system(actuator, leg) {
            damage /= 2;
        }
    }
    damage
}

/// Club damage: a fifth of the weight.
#[must_use]
pub const fn club_damage(tonnage: u32) -> u32 {
    tonnage.div_ceil(5)
}

/// Charge damage: a tenth of the weight per hex moved.
#[must_use]
pub const fn charge_damage(tonnage: u32, hexes_moved: u32) -> u32 {
    (tonnage * hexes_moved).div_ceil(10)
}

/// Damage a charging unit takes: a tenth of the target's weight.
#[must_use]
pub const fn charge_damage_taken(target_tonnage: u32) -> u32 {
    target_tonnage.div_ceil(10)
}

/// Death from above damage: three tenths of the weight.
#[must_use]
pub const fn dfa_damage(tonnage: u32) -> u32 {
    (tonnage * 3).div_ceil(10)
}

/// Damage a unit takes landing a death from above: a fifth of its weight.
#[must_use]
pub const fn dfa_damage_taken(tonnage: u32) -> u32 {
    tonnage.div_ceil(5)
}

/// `" (using Punch/Rear table)"`, or nothing for the standard front table.
#[must_use]
pub fn table_description(table: HitTable, side: Side) -> String {
    let table = match table {
        HitTable::Standard => None,
        HitTable::Punch => Some("Punch"),
        HitTable::Kick => Some("Kick"),
    };
    let side = match side {
        Side::Front => None,
        Side::Left => Some("Left Side"),
        Side::Right => Some("Right Side"),
        Side::Rear => Some("Rear"),
    };
    match (table, side) {
        (None, None) => String::new(),
        (Some(name), None) | (None, Some(name)) => format!(" (using {name} table)"),
        (Some(table), Some(side)) => format!(" (using {table}/{side} table)"),
    }
}

fn location_label(hit: HitData) -> String {
    if hit.rear {
        format!("{}(R)", hit.location.abbreviation())
    } else {
        hit.location.abbreviation().to_string()
    }
}

fn already_destroyed(entity: &Entity) -> bool {
    entity.destroyed || entity.doomed || entity.crew.dead || entity.removal.is_some()
}

fn needs(to_hit: &ToHit) -> String {
    match to_hit.value() {
        Some(value) => format!("; needs {value}, "),
        None => ", ".to_string(),
    }
}

// ============================================================================
// Resolution
// ============================================================================

impl Battle<'_> {
    /// Apply one hit to an entity.
    pub fn damage(&mut self, id: EntityId, hit: HitData, amount: u32) -> DamageOutcome {
        let Some(entity) = self.entities.get_mut(id) else {
            return DamageOutcome::default();
        };
        DamageResolver::new(&mut *self.dice, &mut *self.report, &mut *self.piloting)
            .apply(entity, hit, amount)
    }

    /// Apply damage in groups of `size`, rolling a location for each group.
    pub fn damage_in_groups(
        &mut self,
        id: EntityId,
        table: HitTable,
        side: Side,
        amount: u32,
        size: u32,
    ) {
        let mut remaining = amount;
        while remaining > 0 {
            let group = remaining.min(size.max(1));
            let Some(entity) = self.entities.get(id) else {
                return;
            };
            let hit = entity.roll_hit_location(&mut *self.dice, table, side);
            self.damage(id, hit, group);
            remaining -= group;
        }
    }

    /// Evaluate a to-hit function against both units' current state.
    fn to_hit(
        &self,
        attacker: EntityId,
        target: EntityId,
        evaluate: impl FnOnce(&AttackContext<'_>) -> ToHit,
    ) -> ToHit {
        let (Some(a), Some(t)) = (self.entities.get(attacker), self.entities.get(target)) else {
            return ToHit::Impossible("unit not found".to_string());
        };
        AttackContext::current(self.board, self.options, a, t).map_or_else(
            || ToHit::Impossible("unit not on the board".to_string()),
            |context| evaluate(&context),
        )
    }

    /// Apply the non-attack declarations that share the attack queue.
    /// Returns false for attacks.
    fn apply_declaration(&mut self, action: &Action) -> bool {
        match *action {
            Action::TorsoTwist { entity, facing } => {
                if let Some(e) = self.entities.get_mut(entity) {
                    e.secondary_facing = facing % 6;
                }
            }
            Action::FlipArms { entity, flipped } => {
                if let Some(e) = self.entities.get_mut(entity) {
                    e.arms_flipped = flipped;
                }
            }
            Action::FireModeChange {
                entity,
                weapon,
                mode,
            } => {
                let mounted = self
                    .entities
                    .get_mut(entity)
                    .and_then(|e| e.equipment.get_mut(weapon));
                if let Some(mounted) = mounted {
                    if mounted.weapon().is_some_and(|w| mode < w.modes().len()) {
                        mounted.mode = mode;
                    }
                }
            }
            Action::FindClub { entity } => {
                if let Some(e) = self.entities.get_mut(entity) {
                    e.finding_club = true;
                    e.equipment.push(Mounted::new(
                        EquipmentType::Club(ClubKind::Tree),
                        Location::CenterTorso,
                        false,
                    ));
                    self.report.push(format!(
                        "\n{} uproots a tree for use as a club.\n",
                        e.display_name()
                    ));
                }
            }
            _ => return false,
        }
        true
    }

    /// Resolve the frozen firing-phase list.
    pub fn resolve_weapon_attacks(&mut self, actions: &[Action]) {
        self.report.header("Weapon Attack Phase");
        let mut last = None;
        for action in actions {
            if self.apply_declaration(action) {
                continue;
            }
            match *action {
                Action::WeaponAttack {
                    entity,
                    target,
                    weapon,
                } => {
                    self.resolve_weapon_attack(entity, target, weapon, last != Some(entity));
                    last = Some(entity);
                }
                _ => tracing::warn!(?action, "non-weapon action in the firing queue"),
            }
        }
    }

    /// Resolve one weapon attack.
    pub fn resolve_weapon_attack(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        weapon: usize,
        header: bool,
    ) {
        let (Some(a), Some(t)) = (self.entities.get(attacker), self.entities.get(target)) else {
            tracing::warn!(attacker, target, "weapon attack with a missing unit");
            return;
        };
        let Some(stats) = a.equipment.get(weapon).and_then(Mounted::weapon) else {
            tracing::warn!(attacker, weapon, "weapon attack with a non-weapon");
            return;
        };
        if header {
            self.report
                .push(format!("\nWeapons fire for {}\n", a.display_name()));
        }
        self.report
            .push(format!("    {} at {}", stats.name, t.display_name()));

        let mounted = &a.equipment[weapon];
        if mounted.used_this_round {
            self.report
                .push(" but the weapon has already fired this round!\n");
            return;
        }
        if mounted.destroyed || mounted.missing {
            self.report
                .push(" but the weapon has been destroyed in a previous round!\n");
            return;
        }
        let target_gone = already_destroyed(t);
        let uses_ammo = stats.has(WeaponTags::AMMO);
        if uses_ammo {
            if let Some(a) = self.entities.get_mut(attacker) {
                a.reload_weapons();
            }
        }
        if target_gone {
            self.report.push(" but the target is already destroyed!\n");
            return;
        }

        let to_hit = self.to_hit(attacker, target, |c| c.weapon(weapon));
        match &to_hit {
            ToHit::Impossible(reason) => {
                self.report
                    .push(format!(", but the shot is impossible ({reason})\n"));
                return;
            }
            ToHit::AutomaticFail(reason) => self
                .report
                .push(format!(", the shot is an automatic miss ({reason}), ")),
            ToHit::AutomaticSuccess(reason) => self
                .report
                .push(format!(", the shot is an automatic hit ({reason}), ")),
            ToHit::Roll(_) => self.report.push(needs(&to_hit)),
        }

        let Some(a) = self.entities.get_mut(attacker) else {
            return;
        };
        let double = stats.has(WeaponTags::RAPID_FIRE) && a.equipment[weapon].mode == 1;
        let mut ammo = a.equipment[weapon].linked_ammo;
        let mut shots = 1;
        if uses_ammo {
            if let Some(bin) = ammo {
                a.equipment[bin].shots_left = a.equipment[bin].shots_left.saturating_sub(1);
            }
            if double {
                a.reload_weapons();
                ammo = a.equipment[weapon].linked_ammo;
                match ammo {
                    Some(bin) => {
                        a.equipment[bin].shots_left -= 1;
                        shots = 2;
                    }
                    None => {
                        a.equipment[weapon].mode = 0;
                        self.report.push("(Out of Ammo, Single Rate Only):");
                    }
                }
            }
        }
        let cluster_ammo = ammo
            .and_then(|bin| a.equipment.get(bin))
            .is_some_and(|bin| matches!(bin.kind, EquipmentType::Ammo { cluster: true, .. }));
        if stats.has(WeaponTags::ONE_SHOT) {
            a.equipment[weapon].shots_left = 0;
        }
        a.heat_buildup += stats.heat * shots;
        a.equipment[weapon].used_this_round = true;

        if matches!(to_hit, ToHit::AutomaticFail(_)) {
            self.report.push("misses.\n");
            return;
        }
        let roll = if matches!(to_hit, ToHit::AutomaticSuccess(_)) {
            12
        } else {
            let roll = self.dice.roll_2d6();
            self.report.push(format!("rolls {roll} : "));
            roll
        };

        if shots == 2 && roll == 2 {
            self.report.push("misses AND THE AUTOCANNON JAMS.\n");
            if let Some(a) = self.entities.get_mut(attacker) {
                a.equipment[weapon].jammed = true;
            }
            return;
        }
        if to_hit.value().is_some_and(|target_number| roll < target_number) {
            self.report.push("misses.\n");
            if stats.has(WeaponTags::STREAK) {
                if let Some(a) = self.entities.get_mut(attacker) {
                    a.heat_buildup = a.heat_buildup.saturating_sub(stats.heat);
                    if let Some(bin) = ammo {
                        a.equipment[bin].shots_left += 1;
                    }
                }
                self.report
                    .push("    Streak fails to achieve lock on target.\n");
            }
            return;
        }

        let (table, side) = to_hit.table();
        let tables = table_description(table, side);
        match stats.damage {
            WeaponDamage::Missile {
                per_missile,
                rack,
                group,
            } => {
                let hits = if stats.has(WeaponTags::STREAK) {
                    rack
                } else {
                    cluster_hits(rack, self.dice.roll_2d6())
                };
                self.report.push(format!("{hits} missiles hit{tables}."));
                let mut remaining = hits;
                while remaining > 0 {
                    let salvo = remaining.min(group.max(1));
                    self.damage_in_groups(target, table, side, salvo * per_missile, u32::MAX);
                    remaining -= salvo;
                }
            }
            WeaponDamage::Direct(damage) if cluster_ammo => {
                let hits = cluster_hits(damage, self.dice.roll_2d6());
                self.report.push(format!("{hits} pellets hit{tables}."));
                for _ in 0..hits {
                    self.damage_in_groups(target, table, side, 1, 1);
                }
            }
            WeaponDamage::Direct(damage) if shots == 2 => {
                let hits = cluster_hits(2, self.dice.roll_2d6());
                self.report.push(format!("{hits} shots hit{tables}."));
                for _ in 0..hits {
                    self.damage_in_groups(target, table, side, damage, damage);
                }
            }
            WeaponDamage::Direct(_)
                if stats.has(WeaponTags::FLAMER) && self.options.flamer_heat =>
            {
                self.report
                    .push("hits; target gains 2 more heat during heat phase.");
                if let Some(t) = self.entities.get_mut(target) {
                    t.heat_buildup += 2;
                }
            }
            WeaponDamage::Direct(damage) => {
                let Some(t) = self.entities.get(target) else {
                    return;
                };
                let hit = t.roll_hit_location(&mut *self.dice, table, side);
                self.report
                    .push(format!("hits{tables} {}", location_label(hit)));
                self.damage(target, hit, damage);
            }
        }
        self.report.push("\n");
    }

    /// Resolve the frozen physical-phase list. Displacement attacks come
    /// last in the list.
    pub fn resolve_physical_attacks(&mut self, actions: &[Action]) {
        self.report.header("Physical Attack Phase");
        let mut last = None;
        for action in actions {
            if self.apply_declaration(action) {
                continue;
            }
            let entity = action.entity();
            let header = last != Some(entity);
            if header {
                if let Some(e) = self.entities.get(entity) {
                    self.report
                        .push(format!("\nPhysical attacks for {}\n", e.display_name()));
                }
            }
            last = Some(entity);
            match *action {
                Action::Punch { target, arm, .. } => {
                    if arm == Arm::Both {
                        self.resolve_punch(entity, target, Arm::Left);
                        self.resolve_punch(entity, target, Arm::Right);
                    } else {
                        self.resolve_punch(entity, target, arm);
                    }
                }
                Action::Kick { target, leg, .. } => self.resolve_kick(entity, target, leg),
                Action::Club { target, .. } => self.resolve_club(entity, target),
                Action::Push { target, .. } => self.resolve_push(entity, target),
                Action::Charge {
                    target,
                    target_position,
                    ..
                } => self.resolve_charge(entity, target, target_position),
                Action::DeathFromAbove {
                    target,
                    target_position,
                    ..
                } => self.resolve_death_from_above(entity, target, target_position),
                _ => tracing::warn!(?action, "non-physical action in the physical queue"),
            }
        }
    }

    /// Common opening of a melee attack: report the attempt and roll.
    /// Returns the to-hit and whether it hit, or `None` when nothing happens.
    fn melee_roll(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        label: &str,
        noun: &str,
        evaluate: impl FnOnce(&AttackContext<'_>) -> ToHit,
    ) -> Option<(ToHit, bool)> {
        let t = self.entities.get(target)?;
        self.report
            .push(format!("    {label} {}", t.display_name()));
        if already_destroyed(t) {
            self.report.push(" but the target is already destroyed!\n");
            return None;
        }
        let to_hit = self.to_hit(attacker, target, evaluate);
        match &to_hit {
            ToHit::Impossible(reason) | ToHit::AutomaticFail(reason) => {
                self.report
                    .push(format!(", but the {noun} is impossible ({reason})\n"));
                return Some((to_hit, false));
            }
            ToHit::AutomaticSuccess(_) | ToHit::Roll(_) => {}
        }
        self.report.push(needs(&to_hit));
        let roll = self.dice.roll_2d6();
        self.report.push(format!("rolls {roll} : "));
        let hit = to_hit.value().map_or(true, |n| roll >= n);
        if !hit {
            self.report.push("misses.\n");
        }
        Some((to_hit, hit))
    }

    /// Roll a location, report it and apply damage.
    fn land_blow(&mut self, target: EntityId, to_hit: &ToHit, damage: u32) {
        let (table, side) = to_hit.table();
        let Some(t) = self.entities.get(target) else {
            return;
        };
        let hit = t.roll_hit_location(&mut *self.dice, table, side);
        self.report.push(format!(
            "hits{} {}",
            table_description(table, side),
            location_label(hit)
        ));
        self.damage(target, hit, damage);
        self.report.push("\n");
    }

    fn resolve_punch(&mut self, attacker: EntityId, target: EntityId, arm: Arm) {
        let (label, location) = match arm {
            Arm::Left => ("Punch (Left Arm) at", Location::LeftArm),
            _ => ("Punch (Right Arm) at", Location::RightArm),
        };
        let Some((to_hit, true)) = self.melee_roll(attacker, target, label, "punch", |c| c.punch(arm))
        else {
            return;
        };
        let damage = self
            .entities
            .get(attacker)
            .map_or(0, |a| punch_damage(a, location));
        self.land_blow(target, &to_hit, damage);
    }

    fn resolve_kick(&mut self, attacker: EntityId, target: EntityId, leg: Leg) {
        let label = match leg {
            Leg::Left => "Kick (Left Leg) at",
            Leg::Right => "Kick (Right Leg) at",
        };
        let Some((to_hit, hit)) = self.melee_roll(attacker, target, label, "kick", |c| c.kick(leg))
        else {
            return;
        };
        if !hit {
            self.piloting
                .push(PilotingRequest::new(attacker, 0, "missed a kick"));
            return;
        }
        let damage = self
            .entities
            .get(attacker)
            .map_or(0, |a| kick_damage(a, leg.location(a.chassis)));
        self.land_blow(target, &to_hit, damage);
        if self.entities.get(target).is_some_and(Entity::is_mech) {
            self.piloting
                .push(PilotingRequest::new(target, 0, "was kicked"));
        }
    }

    fn resolve_club(&mut self, attacker: EntityId, target: EntityId) {
        let Some(club) = self.entities.get(attacker).and_then(Entity::club) else {
            self.report.push("    Club attack cancelled, no club.\n");
            return;
        };
        let Some((to_hit, hit)) =
            self.melee_roll(attacker, target, "Tree Club attack on", "attack", |c| c.club())
        else {
            return;
        };
        if hit {
            let damage = self
                .entities
                .get(attacker)
                .map_or(0, |a| club_damage(a.tonnage));
            self.land_blow(target, &to_hit, damage);
        }
        if !matches!(to_hit, ToHit::Impossible(_)) {
            if let Some(a) = self.entities.get_mut(attacker) {
                a.equipment[club].destroyed = true;
                self.report.push("The Tree Club breaks.\n");
            }
        }
    }

    fn resolve_push(&mut self, attacker: EntityId, target: EntityId) {
        let Some((_, true)) = self.melee_roll(attacker, target, "Pushing", "push", |c| c.push())
        else {
            return;
        };
        let (Some(a), Some(t)) = (self.entities.get(attacker), self.entities.get(target)) else {
            return;
        };
        let direction = a.facing;
        let Some(src) = t.position else {
            return;
        };
        let dest = src.translated(direction);
        if self.is_valid_displacement(target, src, dest) {
            self.report.push(format!(
                "succeeds: target is pushed into hex {dest}\n"
            ));
            self.displace(target, src, dest, Some(PilotingRequest::new(target, 0, "was pushed")));
            self.follow_through(attacker, src);
        } else if self.options.push_off_board && !self.board.contains(dest) {
            self.force_off_board(target);
            self.follow_through(attacker, src);
        } else {
            self.report.push("succeeds, but target can't be moved.\n");
            self.piloting
                .push(PilotingRequest::new(target, 0, "was pushed"));
        }
    }

    /// Move the attacker into the hex its target vacated, if it is empty.
    fn follow_through(&mut self, attacker: EntityId, src: HexCoord) {
        if self.entities.occupant(src, None).is_none() {
            if let Some(a) = self.entities.get_mut(attacker) {
                a.position = Some(src);
            }
        }
    }

    fn resolve_charge(&mut self, attacker: EntityId, target: EntityId, target_position: HexCoord) {
        let Some(a) = self.entities.get_mut(attacker) else {
            return;
        };
        a.displacement_attack = None;
        let direction = a.facing;
        let attacker_prone = a.prone;
        let Some(t) = self.entities.get(target).filter(|t| !already_destroyed(t)) else {
            self.report
                .push("    Charge cancelled as the target has been destroyed.\n");
            return;
        };
        if attacker_prone {
            self.report
                .push("    Charge cancelled as the attacker has fallen.\n");
            return;
        }
        self.report
            .push(format!("    Charging {}", t.display_name()));
        if t.position != Some(target_position) {
            self.report.push(" but the target has moved.\n");
            return;
        }

        let to_hit = self.to_hit(attacker, target, |c| c.charge());
        let hit = match &to_hit {
            ToHit::Impossible(reason) | ToHit::AutomaticFail(reason) => {
                self.report
                    .push(format!(", but the charge is impossible ({reason}) : "));
                false
            }
            _ => {
                let roll = self.dice.roll_2d6();
                self.report
                    .push(format!("{}rolls {roll} : ", needs(&to_hit)));
                to_hit.value().map_or(true, |n| roll >= n)
            }
        };

        let Some(src) = self.entities.get(attacker).and_then(|a| a.position) else {
            return;
        };
        if !hit {
            self.report.push("misses.\n");
            let dest = self.missed_charge_displacement(attacker, src, direction);
            self.displace(attacker, src, dest, None);
            return;
        }

        let (Some(a), Some(t)) = (self.entities.get(attacker), self.entities.get(target)) else {
            return;
        };
        let damage = charge_damage(a.tonnage, a.hexes_moved);
        let taken = charge_damage_taken(t.tonnage);
        let (table, side) = to_hit.table();
        self.report.push(format!(
            "hits.\n  Defender takes {damage} damage{}.",
            table_description(table, side)
        ));
        self.damage_in_groups(target, table, side, damage, 5);
        self.report
            .push(format!("\n  Attacker takes {taken} damage."));
        self.damage_in_groups(attacker, HitTable::Standard, Side::Front, taken, 5);

        let dest = target_position.translated(direction);
        if self.is_valid_displacement(target, target_position, dest) {
            self.report.push("\n");
            self.displace(
                target,
                target_position,
                dest,
                Some(PilotingRequest::new(target, 2, "was charged")),
            );
            self.displace(
                attacker,
                src,
                target_position,
                Some(PilotingRequest::new(attacker, 2, "charging")),
            );
        } else {
            self.piloting
                .push(PilotingRequest::new(attacker, 2, "charging"));
            if self.options.push_off_board && !self.board.contains(dest) {
                self.force_off_board(target);
                self.displace(
                    attacker,
                    src,
                    target_position,
                    Some(PilotingRequest::new(attacker, 2, "charging")),
                );
            } else {
                self.piloting
                    .push(PilotingRequest::new(target, 2, "was charged"));
            }
        }
        self.report.push("\n");
    }

    fn resolve_death_from_above(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        target_position: HexCoord,
    ) {
        let Some(a) = self.entities.get_mut(attacker) else {
            return;
        };
        a.displacement_attack = None;
        let direction = a.facing;
        let attacker_prone = a.prone;
        let Some(src) = a.position else {
            return;
        };
        let landing = PilotingRequest::new(attacker, 4, "executed death from above");

        let Some(t) = self.entities.get(target).filter(|t| !already_destroyed(t)) else {
            self.report
                .push("    Death from above cancelled as the target has been destroyed.\n");
            self.displace(attacker, src, target_position, Some(landing));
            return;
        };
        self.report
            .push(format!("    Attempting death from above on {}", t.display_name()));
        if t.position != Some(target_position) {
            self.report.push(" but the target has moved.\n");
            return;
        }

        let to_hit = self.to_hit(attacker, target, |c| c.death_from_above());
        let hit = if attacker_prone {
            self.report.push(" but the attacker is prone : ");
            false
        } else if let ToHit::Impossible(reason) | ToHit::AutomaticFail(reason) = &to_hit {
            self.report
                .push(format!(" but the attack is impossible ({reason}) : "));
            false
        } else {
            let roll = self.dice.roll_2d6();
            self.report
                .push(format!("{}rolls {roll} : ", needs(&to_hit)));
            to_hit.value().map_or(true, |n| roll >= n)
        };

        if !hit {
            self.report.push("misses.\n");
            match self.preferred_displacement(target, target_position, direction) {
                Some(target_dest) => {
                    self.displace(target, target_position, target_dest, None);
                    if let Some(a) = self.entities.get(attacker) {
                        self.report.push(format!(
                            "{} falls into hex {target_position}.\n",
                            a.display_name()
                        ));
                        let roll = base_piloting_roll(a);
                        self.fall_on(attacker, target_position, 2, 3, &roll);
                    }
                }
                None => self.destroy_by_displacement(attacker),
            }
            return;
        }

        let Some(a) = self.entities.get(attacker) else {
            return;
        };
        let damage = dfa_damage(a.tonnage);
        let taken = dfa_damage_taken(a.tonnage);
        let (table, side) = to_hit.table();
        self.report.push(format!(
            "hits.\n  Defender takes {damage} damage{}.",
            table_description(table, side)
        ));
        self.damage_in_groups(target, table, side, damage, 5);
        self.report
            .push(format!("\n  Attacker takes {taken} damage."));
        self.damage_in_groups(attacker, HitTable::Kick, Side::Front, taken, 5);
        self.report.push("\n");

        if self.options.push_off_board && !self.board.contains(target_position.translated(direction))
        {
            self.force_off_board(target);
        } else {
            match self.valid_displacement(target, target_position, direction) {
                Some(dest) => {
                    self.displace(
                        target,
                        target_position,
                        dest,
                        Some(PilotingRequest::new(target, 2, "hit by death from above")),
                    );
                }
                None => self.destroy_by_displacement(target),
            }
        }
        self.displace(attacker, src, target_position, Some(landing));
    }

    /// Queue a piloting check for every mech that took 20 or more damage this phase.
    pub fn check_for_20_damage(&mut self) {
        for entity in self.entities.sorted() {
            if entity.is_mech() && entity.is_active() && entity.damage_this_phase >= 20 {
                self.piloting
                    .push(PilotingRequest::new(entity.id, 1, "20+ damage"));
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{centurion, Fixture};
    use super::*;
    use crate::dice::ScriptedDice;
    use crate::entity::{MoveType, Points};

    const HERE: HexCoord = HexCoord::new(5, 8);

    /// Attacker 1 at HERE facing north, target 2 directly ahead facing south.
    fn duel(dice: ScriptedDice) -> Fixture {
        let ahead = HERE.translated(0);
        Fixture::new(dice)
            .with(centurion(1, 1, HERE, 0))
            .with(centurion(2, 2, ahead, 3))
    }

    fn fire(weapon: usize) -> Vec<Action> {
        vec![Action::WeaponAttack {
            entity: 1,
            target: 2,
            weapon,
        }]
    }

    // ========================================================================
    // Damage values
    // ========================================================================

    #[test]
    fn test_physical_damage_values() {
        let mut mech = centurion(1, 1, HERE, 0);
        assert_eq!(punch_damage(&mech, Location::RightArm), 5);
        assert_eq!(kick_damage(&mech, Location::RightLeg), 10);
        assert_eq!(club_damage(50), 10);
        assert_eq!(charge_damage(50, 4), 20);
        assert_eq!(charge_damage_taken(75), 8);
        assert_eq!(dfa_damage(50), 15);
        assert_eq!(dfa_damage_taken(50), 10);

        // Upper arm actuator is slot 1.
        let arm = mech.location_mut(Location::RightArm).unwrap();
        arm.slots[1].as_mut().unwrap().destroyed = true;
        assert_eq!(punch_damage(&mech, Location::RightArm), 2);
    }

    #[test]
    fn test_table_description() {
        assert_eq!(table_description(HitTable::Standard, Side::Front), "");
        assert_eq!(
            table_description(HitTable::Punch, Side::Rear),
            " (using Punch/Rear table)"
        );
        assert_eq!(
            table_description(HitTable::Standard, Side::Left),
            " (using Left Side table)"
        );
    }

    // ========================================================================
    // Weapons
    // ========================================================================

    #[test]
    fn test_direct_fire_hit() {
        // To-hit 12, location 7 (center torso).
        let mut fixture = duel(ScriptedDice::new([12, 7]));
        fixture.battle().resolve_weapon_attacks(&fire(3));
        let attacker = fixture.entity(1);
        assert_eq!(attacker.heat_buildup, 3);
        assert_eq!(attacker.equipment[4].shots_left, 9);
        assert!(attacker.equipment[3].used_this_round);
        let target = fixture.entity(2);
        assert_eq!(target.armor(Location::CenterTorso, false), Points::Remaining(6));
        assert!(fixture.report.as_str().contains("Weapons fire for Centurion CN9-A"));
        assert!(fixture.report.as_str().contains("AC/10 at Centurion CN9-A; needs 4, rolls 12 : hits CT"));
    }

    #[test]
    fn test_miss_still_spends_ammo_and_heat() {
        let mut fixture = duel(ScriptedDice::new([3]));
        fixture.battle().resolve_weapon_attacks(&fire(3));
        let attacker = fixture.entity(1);
        assert_eq!(attacker.heat_buildup, 3);
        assert_eq!(attacker.equipment[4].shots_left, 9);
        assert_eq!(fixture.entity(2).damage_this_phase, 0);
    }

    #[test]
    fn test_missiles_land_in_groups_of_five() {
        // Target 4 at 1 hex is inside LRM minimum range (6): 4 + 6 = 10.
        // To-hit 12, cluster roll 12 (10 missiles), two location rolls of 7.
        let mut fixture = duel(ScriptedDice::new([12, 12, 7, 7]));
        fixture.battle().resolve_weapon_attacks(&fire(1));
        assert!(fixture.report.as_str().contains("10 missiles hit."));
        let target = fixture.entity(2);
        assert_eq!(target.armor(Location::CenterTorso, false), Points::Remaining(6));
        assert_eq!(fixture.dice.remaining(), 0);
    }

    #[test]
    fn test_weapon_fires_once_per_round() {
        let mut fixture = duel(ScriptedDice::new([12, 7]));
        let mut actions = fire(0);
        actions.extend(fire(0));
        fixture.battle().resolve_weapon_attacks(&actions);
        assert!(fixture.report.as_str().contains("already fired this round"));
        assert_eq!(fixture.entity(1).heat_buildup, 3);
    }

    #[test]
    fn test_empty_bin_reloads_from_another() {
        let mut fixture = duel(ScriptedDice::new([12, 7]));
        {
            let attacker = fixture.entity_mut(1);
            attacker.equipment.push(Mounted::new(
                EquipmentType::Ammo {
                    weapon: "ac_10".to_string(),
                    cluster: false,
                },
                Location::CenterTorso,
                false,
            ));
            attacker.equipment[4].shots_left = 0;
        }
        fixture.battle().resolve_weapon_attacks(&fire(3));
        let attacker = fixture.entity(1);
        assert_eq!(attacker.equipment[3].linked_ammo, Some(5));
        assert_eq!(attacker.equipment[5].shots_left, 9);
        assert_eq!(fixture.entity(2).damage_this_phase, 10);
    }

    #[test]
    fn test_destroyed_target_is_skipped() {
        let mut fixture = duel(ScriptedDice::new([12]));
        fixture.entity_mut(2).doomed = true;
        fixture.battle().resolve_weapon_attacks(&fire(0));
        assert!(fixture.report.as_str().contains("target is already destroyed"));
        assert_eq!(fixture.dice.remaining(), 1);
        assert_eq!(fixture.entity(1).heat_buildup, 0);
    }

    #[test]
    fn test_impossible_shot_costs_nothing() {
        let mut fixture = duel(ScriptedDice::new([12]));
        // Target behind the attacker.
        fixture.entity_mut(1).facing = 3;
        fixture.entity_mut(1).secondary_facing = 3;
        fixture.battle().resolve_weapon_attacks(&fire(3));
        assert!(fixture.report.as_str().contains("the shot is impossible (target not in arc)"));
        assert_eq!(fixture.entity(1).equipment[4].shots_left, 10);
    }

    #[test]
    fn test_torso_twist_applies_before_later_shots() {
        let mut fixture = duel(ScriptedDice::new([12, 7]));
        fixture.entity_mut(1).secondary_facing = 3;
        let mut actions = vec![Action::TorsoTwist {
            entity: 1,
            facing: 0,
        }];
        actions.extend(fire(3));
        fixture.battle().resolve_weapon_attacks(&actions);
        assert_eq!(fixture.entity(2).damage_this_phase, 10);
    }

    // ========================================================================
    // Physical attacks
    // ========================================================================

    #[test]
    fn test_missed_kick_queues_attacker_check() {
        let mut fixture = duel(ScriptedDice::new([2]));
        let kick = Action::Kick {
            entity: 1,
            target: 2,
            leg: Leg::Right,
        };
        fixture.battle().resolve_physical_attacks(&[kick]);
        let requests = fixture.piloting.requests_for(1);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].reason, "missed a kick");
    }

    #[test]
    fn test_kick_hit_queues_target_check() {
        // To-hit 12, kick table d6 1 (right leg).
        let mut fixture = duel(ScriptedDice::new([12]).with_singles([1]));
        let kick = Action::Kick {
            entity: 1,
            target: 2,
            leg: Leg::Right,
        };
        fixture.battle().resolve_physical_attacks(&[kick]);
        assert_eq!(fixture.entity(2).armor(Location::RightLeg, false), Points::Remaining(2));
        assert_eq!(fixture.piloting.requests_for(2)[0].reason, "was kicked");
        assert!(fixture.piloting.requests_for(1).is_empty());
    }

    #[test]
    fn test_both_arms_punch_separately() {
        // Two to-hit rolls, two punch table rolls (3 = center torso).
        let mut fixture = duel(ScriptedDice::new([12, 12]).with_singles([3, 3]));
        let punch = Action::Punch {
            entity: 1,
            target: 2,
            arm: Arm::Both,
        };
        fixture.battle().resolve_physical_attacks(&[punch]);
        assert_eq!(fixture.entity(2).damage_this_phase, 10);
        assert!(fixture.report.as_str().contains("Punch (Left Arm)"));
        assert!(fixture.report.as_str().contains("Punch (Right Arm)"));
    }

    #[test]
    fn test_push_moves_target_and_attacker_follows() {
        let mut fixture = duel(ScriptedDice::new([12]));
        let ahead = HERE.translated(0);
        fixture
            .battle()
            .resolve_physical_attacks(&[Action::Push { entity: 1, target: 2 }]);
        assert_eq!(fixture.entity(2).position, Some(ahead.translated(0)));
        assert_eq!(fixture.entity(1).position, Some(ahead));
        assert_eq!(fixture.piloting.requests_for(2)[0].reason, "was pushed");
    }

    #[test]
    fn test_push_off_board_removes_target() {
        let edge = HexCoord::new(5, 0);
        let mut fixture = Fixture::new(ScriptedDice::new([12]))
            .with(centurion(1, 1, edge.translated(3), 0))
            .with(centurion(2, 2, edge, 3));
        fixture
            .battle()
            .resolve_physical_attacks(&[Action::Push { entity: 1, target: 2 }]);
        let target = fixture.entity(2);
        assert_eq!(target.removal, Some(crate::entity::Removal::PushedOff));
        assert_eq!(target.position, None);
        assert_eq!(fixture.entity(1).position, Some(edge));
        assert!(fixture.report.as_str().contains("forced from the field"));
    }

    #[test]
    fn test_charge_hits_both_units() {
        let ahead = HERE.translated(0);
        let mut fixture = duel(ScriptedDice::new([12]).with_fallback(7));
        {
            let attacker = fixture.entity_mut(1);
            attacker.moved = MoveType::Run;
            attacker.hexes_moved = 4;
        }
        let charge = Action::Charge {
            entity: 1,
            target: 2,
            target_position: ahead,
        };
        fixture.battle().resolve_physical_attacks(&[charge]);
        // 20 damage to the target, 5 back to the attacker.
        assert_eq!(fixture.entity(2).damage_this_phase, 20);
        assert_eq!(fixture.entity(1).damage_this_phase, 5);
        assert_eq!(fixture.entity(2).position, Some(ahead.translated(0)));
        assert_eq!(fixture.entity(1).position, Some(ahead));
        assert_eq!(fixture.piloting.requests_for(1)[0].modifier, 2);
    }

    #[test]
    fn test_charge_cancelled_when_target_moved() {
        let mut fixture = duel(ScriptedDice::new([12]));
        fixture.entity_mut(1).moved = MoveType::Walk;
        let charge = Action::Charge {
            entity: 1,
            target: 2,
            target_position: HERE.translated(1),
        };
        fixture.battle().resolve_physical_attacks(&[charge]);
        assert!(fixture.report.as_str().contains("but the target has moved"));
        assert_eq!(fixture.dice.remaining(), 1);
    }

    #[test]
    fn test_death_from_above_hits_both_units() {
        let ahead = HERE.translated(0);
        let mut fixture = duel(ScriptedDice::new([12]).with_fallback(7));
        fixture.entity_mut(1).moved = MoveType::Jump;
        let dfa = Action::DeathFromAbove {
            entity: 1,
            target: 2,
            target_position: ahead,
        };
        fixture.battle().resolve_physical_attacks(&[dfa]);
        assert_eq!(fixture.entity(2).damage_this_phase, 15);
        assert_eq!(fixture.entity(1).damage_this_phase, 10);
        assert_eq!(fixture.entity(2).position, Some(ahead.translated(0)));
        assert_eq!(fixture.entity(1).position, Some(ahead));
        assert_eq!(fixture.piloting.requests_for(1)[0].modifier, 4);
    }

    #[test]
    fn test_twenty_damage_check() {
        let mut fixture = duel(ScriptedDice::new([]));
        fixture.entity_mut(2).damage_this_phase = 20;
        fixture.entity_mut(1).damage_this_phase = 19;
        fixture.battle().check_for_20_damage();
        assert_eq!(fixture.piloting.len(), 1);
        assert_eq!(fixture.piloting.requests_for(2)[0].modifier, 1);
    }

    #[test]
    fn test_find_club_then_swing() {
        let mut fixture = duel(ScriptedDice::new([12, 7]));
        fixture
            .battle()
            .resolve_physical_attacks(&[Action::FindClub { entity: 1 }]);
        assert!(fixture.entity(1).club().is_some());
        fixture
            .battle()
            .resolve_physical_attacks(&[Action::Club { entity: 1, target: 2 }]);
        assert_eq!(fixture.entity(2).damage_this_phase, 10);
        assert!(fixture.entity(1).club().is_none());
    }
}
