//! Piloting skill rolls, falls and crew injuries.
//!
//! Checks raised during a phase are queued as [`PilotingRequest`]s and
//! rolled together when the phase ends. Movement and displacement roll
//! some checks immediately instead; both paths end in [`Battle::fall`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::combat::Battle;
use crate::entity::{Crew, DisplacementKind, Entity, EntityId, HitTable, SystemKind};
use crate::hex::{rotate, HexCoord, Side};
use crate::report::Report;
use crate::to_hit::Modifier;

/// How a piloting check resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RollKind {
    /// Roll 2d6 against the target number.
    #[default]
    Normal,
    /// Fails without a roll.
    AutomaticFail,
    /// Cannot be attempted.
    Impossible,
}

/// A check raised during a phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PilotingRequest {
    /// Entity that must roll.
    pub entity: EntityId,
    /// Added to the base target number.
    pub modifier: i32,
    /// Automatic results override the roll.
    pub kind: RollKind,
    /// Why.
    pub reason: String,
}

impl PilotingRequest {
    /// A normal check.
    #[must_use]
    pub fn new(entity: EntityId, modifier: i32, reason: impl Into<String>) -> Self {
        Self {
            entity,
            modifier,
            kind: RollKind::Normal,
            reason: reason.into(),
        }
    }

    /// A check that fails without a roll.
    #[must_use]
    pub fn automatic_fail(entity: EntityId, modifier: i32, reason: impl Into<String>) -> Self {
        Self {
            kind: RollKind::AutomaticFail,
            ..Self::new(entity, modifier, reason)
        }
    }
}

/// Checks waiting for the end of the phase, in the order raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PilotingQueue {
    requests: Vec<PilotingRequest>,
}

impl PilotingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a check.
    pub fn push(&mut self, request: PilotingRequest) {
        tracing::debug!(entity = request.entity, reason = %request.reason, "piloting check queued");
        self.requests.push(request);
    }

    /// Number of queued checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drop every check.
    pub fn clear(&mut self) {
        self.requests.clear();
    }

    /// Checks queued for one entity.
    #[must_use]
    pub fn requests_for(&self, entity: EntityId) -> Vec<&PilotingRequest> {
        self.requests.iter().filter(|r| r.entity == entity).collect()
    }

    /// Entities with queued checks, sorted.
    #[must_use]
    pub fn entities(&self) -> BTreeSet<EntityId> {
        self.requests.iter().map(|r| r.entity).collect()
    }

    /// Remove and return everything queued.
    pub fn take(&mut self) -> Vec<PilotingRequest> {
        std::mem::take(&mut self.requests)
    }
}

/// Target number for a piloting check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PilotingRoll {
    /// Automatic results override the number.
    pub kind: RollKind,
    modifiers: Vec<Modifier>,
    automatic_reason: Option<String>,
}

impl PilotingRoll {
    /// Add a modifier.
    pub fn add(&mut self, value: i32, reason: impl Into<String>) {
        self.modifiers.push(Modifier {
            value,
            reason: reason.into(),
        });
    }

    /// Mark as failing without a roll, unless already impossible.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.kind == RollKind::Normal {
            self.kind = RollKind::AutomaticFail;
            self.automatic_reason = Some(reason.into());
        }
    }

    /// Mark as impossible.
    pub fn impossible(&mut self, reason: impl Into<String>) {
        self.kind = RollKind::Impossible;
        self.automatic_reason = Some(reason.into());
    }

    /// Fold a queued request in.
    pub fn append(&mut self, request: &PilotingRequest) {
        match request.kind {
            RollKind::Normal => {}
            RollKind::AutomaticFail => self.fail(request.reason.clone()),
            RollKind::Impossible => self.impossible(request.reason.clone()),
        }
        if request.modifier != 0 {
            self.add(request.modifier, request.reason.clone());
        }
    }

    /// Target number.
    #[must_use]
    pub fn value(&self) -> i32 {
        self.modifiers.iter().map(|m| m.value).sum()
    }

    /// Same modifiers with any automatic failure dropped.
    #[must_use]
    pub fn without_automatic_fail(&self) -> Self {
        let mut roll = self.clone();
        if roll.kind == RollKind::AutomaticFail {
            roll.kind = RollKind::Normal;
            roll.automatic_reason = None;
        }
        roll
    }

    /// `"5 (base) + 3 (gyro hit)"`, or the automatic reason.
    #[must_use]
    pub fn description(&self) -> String {
        if let Some(reason) = &self.automatic_reason {
            return reason.clone();
        }
        let parts: Vec<String> = self
            .modifiers
            .iter()
            .map(|m| format!("{} ({})", m.value, m.reason))
            .collect();
        parts.join(" + ")
    }
}

/// Base piloting target for an entity's current condition.
#[must_use]
pub fn base_piloting_roll(entity: &Entity) -> PilotingRoll {
    let mut roll = PilotingRoll::default();
    roll.add(entity.crew.piloting, "base");
    if !entity.is_mech() {
        roll.impossible("only mechs make piloting rolls");
        return roll;
    }
    if entity.crew.unconscious {
        roll.fail("pilot unconscious");
    }
    if entity.shut_down {
        roll.fail("reactor shut down");
    }
    match entity.gyro_hits() {
        0 => {}
        1 => roll.add(3, "gyro damaged"),
        _ => roll.fail("gyro destroyed"),
    }
    let legs = entity.destroyed_legs();
    if legs > 0 {
        roll.add(5 * legs as i32, "leg destroyed");
    }
    let hips = entity.damaged_systems(SystemKind::Hip, None);
    if hips > 0 {
        roll.add(2 * hips as i32, "hip actuator destroyed");
    }
    let actuators = entity.damaged_systems(SystemKind::UpperLeg, None)
        + entity.damaged_systems(SystemKind::LowerLeg, None)
        + entity.damaged_systems(SystemKind::Foot, None);
    if actuators > 0 {
        roll.add(actuators as i32, "leg/foot actuators damaged");
    }
    roll
}

/// Wound the pilot. Six wounds kill; each survivable wound owes a
/// consciousness roll, made by [`Battle::resolve_crew_damage`].
pub fn damage_crew(entity: &mut Entity, amount: u32, report: &mut Report) {
    if entity.crew.dead || amount == 0 {
        return;
    }
    let name = entity.display_name();
    let crew = &mut entity.crew;
    crew.hits = (crew.hits + amount).min(Crew::LETHAL_HITS);
    report.push(format!(
        "\n        Pilot of {name} \"{}\" takes {amount} damage ({} total hits).",
        crew.name, crew.hits
    ));
    if crew.hits < Crew::LETHAL_HITS {
        crew.rolls_needed += amount;
    } else {
        crew.dead = true;
        crew.rolls_needed = 0;
        report.push(format!("\n*** {name} PILOT KILLED! ***"));
    }
}

/// Fall damage before water: a tenth of the weight, rounded, per level fallen plus one.
fn fall_damage(tonnage: u32, height: i32) -> u32 {
    tonnage.saturating_add(5) / 10 * (height.max(0) as u32 + 1)
}

impl Battle<'_> {
    /// Knock an entity down into `position` after falling `height` levels.
    ///
    /// Rolls the landing side, deals fall damage in groups of 5 and makes
    /// the pilot's damage-avoidance roll at the check's target number
    /// plus the height.
    pub fn fall(&mut self, id: EntityId, position: HexCoord, height: i32, roll: &PilotingRoll) {
        if !self.entities.get(id).is_some_and(Entity::is_mech) {
            return;
        }
        let facing_roll = self.dice.d6();
        self.fall_on(id, position, height, facing_roll, roll);
    }

    /// [`Battle::fall`] with the landing roll already made: 1-2 right side,
    /// 3 rear, 4-5 left side, 6 front. The unit turns `facing_roll - 1`
    /// hexsides.
    pub fn fall_on(
        &mut self,
        id: EntityId,
        position: HexCoord,
        height: i32,
        facing_roll: i32,
        roll: &PilotingRoll,
    ) {
        let water = self.board.hex(position).map_or(0, |h| h.water);
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        if !entity.is_mech() {
            return;
        }
        if entity
            .displacement_attack
            .is_some_and(|a| a.kind == DisplacementKind::DeathFromAbove)
        {
            // Damage waits for the physical phase.
            self.report.push(format!(
                "
{} falls, but damage is dealt with its death from above attack.",
                entity.display_name()
            ));
            entity.prone = true;
            return;
        }
        let side = Side::from_fall_roll(facing_roll);
        let mut damage = fall_damage(entity.tonnage, height);
        if water > 0 {
            damage = damage.div_ceil(2);
        }
        let name = entity.display_name();
        self.report.push(format!(
            "\n*** {name} falls on its {} side into hex {position}, suffering {damage} damage.",
            side_name(side)
        ));
        tracing::debug!(entity = id, %position, height, damage, "entity fell");

        let mut pilot = roll.without_automatic_fail();
        if height > 0 {
            pilot.add(height, "height of fall");
        }
        if pilot.kind == RollKind::Impossible {
            self.report
                .push(format!("\n        Pilot of {name} cannot avoid damage."));
            damage_crew(entity, 1, self.report);
        } else {
            let target = pilot.value();
            let diceroll = self.dice.roll_2d6();
            self.report.push(format!(
                "\n        Pilot of {name} \"{}\" needs a {target} to avoid damage, rolls {diceroll} : ",
                entity.crew.name
            ));
            if diceroll >= target {
                self.report.push("succeeds.");
            } else {
                self.report.push("fails.");
                damage_crew(entity, 1, self.report);
            }
        }

        entity.position = Some(position);
        entity.facing = rotate(entity.facing, facing_roll - 1);
        entity.secondary_facing = entity.facing;
        entity.prone = true;

        while damage > 0 && entity.is_active() {
            let cluster = damage.min(5);
            let hit = entity.roll_hit_location(&mut *self.dice, HitTable::Standard, side);
            crate::damage::DamageResolver::new(&mut *self.dice, &mut *self.report, &mut *self.piloting)
                .apply(entity, hit, cluster);
            damage -= cluster;
        }
    }

    /// Roll a check immediately; on a failure the entity falls where it stands.
    /// Returns whether it stayed up.
    pub fn skill_check_in_place(&mut self, id: EntityId, roll: &PilotingRoll) -> bool {
        let Some(entity) = self.entities.get(id) else {
            return false;
        };
        let Some(position) = entity.position else {
            return false;
        };
        let name = entity.display_name();
        match roll.kind {
            RollKind::Impossible => return true,
            RollKind::AutomaticFail => {
                self.report.push(format!(
                    "\n{name} must make a piloting skill check and automatically fails ({}).",
                    roll.description()
                ));
            }
            RollKind::Normal => {
                let target = roll.value();
                let diceroll = self.dice.roll_2d6();
                self.report.push(format!(
                    "\n{name} must make a piloting skill check, needs {target} [{}], rolls {diceroll} : ",
                    roll.description()
                ));
                if diceroll >= target {
                    self.report.push("succeeds.");
                    return true;
                }
                self.report.push("falls.");
            }
        }
        self.fall(id, position, 0, roll);
        false
    }

    /// Roll every queued check. Each entity's checks share one target
    /// number; rolling stops at the first failure.
    pub fn resolve_piloting_rolls(&mut self) {
        let requests = self.piloting.take();
        let mut ids: Vec<EntityId> = requests.iter().map(|r| r.entity).collect();
        ids.sort_unstable();
        ids.dedup();

        for id in ids {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            if !entity.is_targetable() || entity.prone || !entity.is_mech() {
                continue;
            }
            let Some(position) = entity.position else {
                continue;
            };
            let mine: Vec<&PilotingRequest> = requests.iter().filter(|r| r.entity == id).collect();
            let mut roll = base_piloting_roll(entity);
            for request in &mine {
                roll.append(request);
            }
            let reasons: Vec<&str> = mine.iter().map(|r| r.reason.as_str()).collect();
            let name = entity.display_name();
            self.report.push(format!(
                "\n{name} must make {} piloting skill roll(s) ({}).",
                mine.len(),
                reasons.join(", ")
            ));

            if roll.kind != RollKind::Normal {
                self.report
                    .push(format!(" Automatically fails ({}).", roll.description()));
                self.fall(id, position, 0, &roll);
                continue;
            }
            let target = roll.value();
            self.report
                .push(format!("\n    The target is {target} [{}].", roll.description()));
            for attempt in 1..=mine.len() {
                let diceroll = self.dice.roll_2d6();
                self.report.push(format!(
                    "\n    Roll #{attempt}, needs {target}, rolls {diceroll} : "
                ));
                if diceroll < target {
                    self.report.push("falls.");
                    self.fall(id, position, 0, &roll);
                    break;
                }
                self.report.push("remains standing.");
            }
        }
        // Checks raised by the falls themselves are moot.
        self.piloting.clear();
    }

    /// Consciousness rolls for wounds taken since the last call, one per
    /// wound; the first failure knocks the pilot out for the round.
    pub fn resolve_crew_damage(&mut self) {
        for id in self.entities.sorted_ids() {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let owed = std::mem::take(&mut entity.crew.rolls_needed);
            if owed == 0 || !entity.crew.is_active() || entity.removal.is_some() {
                continue;
            }
            let name = entity.display_name();
            let hits = entity.crew.hits;
            for wound in (hits + 1).saturating_sub(owed)..=hits {
                let target = Crew::consciousness_for(wound);
                let diceroll = self.dice.roll_2d6();
                self.report.push(format!(
                    "\nPilot of {name} \"{}\" needs a {target} to stay conscious.  Rolls {diceroll} : ",
                    entity.crew.name
                ));
                if diceroll >= target {
                    self.report.push("successful!");
                } else {
                    entity.crew.unconscious = true;
                    entity.crew.knocked_out_this_round = true;
                    self.report.push("blacks out.");
                    break;
                }
            }
        }
    }

    /// Unconscious pilots knocked out in an earlier round try to wake up.
    pub fn resolve_wake_up(&mut self) {
        for id in self.entities.sorted_ids() {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let crew = &entity.crew;
            if !crew.unconscious || crew.dead || crew.knocked_out_this_round {
                continue;
            }
            let target = crew.consciousness_number();
            let diceroll = self.dice.roll_2d6();
            self.report.push(format!(
                "\nPilot of {} \"{}\" needs a {target} to regain conciousness.  Rolls {diceroll} : ",
                entity.display_name(),
                crew.name
            ));
            if diceroll >= target {
                entity.crew.unconscious = false;
                self.report.push("successful!");
            } else {
                self.report.push("fails.");
            }
        }
    }
}

const fn side_name(side: Side) -> &'static str {
    match side {
        Side::Front => "front",
        Side::Left => "left",
        Side::Right => "right",
        Side::Rear => "rear",
    }
}
