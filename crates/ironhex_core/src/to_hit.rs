//! To-hit numbers for weapon and physical attacks.
//!
//! Every function here is pure: the same attacker, target, board and
//! options always give the same [`ToHit`], and no dice are consumed.
//! Resolution evaluates an [`AttackContext`] built from the units' current
//! state; planners call the `estimate_*` functions with projected
//! [`EntityState`]s. Both paths run the same code.

use serde::{Deserialize, Serialize};

use crate::action::{Arm, Leg};
use crate::board::{Board, LosEndpoint};
use crate::data::{RangeBracket, WeaponTags};
use crate::entity::{
    Chassis, Entity, EquipmentType, HitTable, Location, MoveType, Mounted, SystemKind, UnitClass,
};
use crate::hex::{is_in_arc, Arc, HexCoord, Side};
use crate::options::GameOptions;

/// One contribution to a target number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifier {
    /// Added to the target number.
    pub value: i32,
    /// Why.
    pub reason: String,
}

/// A finite target number with its breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRoll {
    modifiers: Vec<Modifier>,
    /// Table used for hit locations.
    pub table: HitTable,
    /// Side of the target struck.
    pub side: Side,
}

impl TargetRoll {
    fn new(table: HitTable, side: Side) -> Self {
        Self {
            modifiers: Vec::new(),
            table,
            side,
        }
    }

    fn add(&mut self, value: i32, reason: impl Into<String>) {
        if value != 0 || self.modifiers.is_empty() {
            self.modifiers.push(Modifier {
                value,
                reason: reason.into(),
            });
        }
    }

    /// Sum of all modifiers.
    #[must_use]
    pub fn value(&self) -> i32 {
        self.modifiers.iter().map(|m| m.value).sum()
    }

    /// Contributions in the order they were applied.
    #[must_use]
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// `"4 (gunnery skill) + 2 (medium range)"`.
    #[must_use]
    pub fn description(&self) -> String {
        let mut out = String::new();
        for (i, m) in self.modifiers.iter().enumerate() {
            if i > 0 {
                out.push_str(if m.value < 0 { " - " } else { " + " });
                out.push_str(&format!("{} ({})", m.value.abs(), m.reason));
            } else {
                out.push_str(&format!("{} ({})", m.value, m.reason));
            }
        }
        out
    }
}

/// Outcome of a to-hit evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToHit {
    /// Roll 2d6 against this number.
    Roll(TargetRoll),
    /// The attack cannot be made.
    Impossible(String),
    /// The attack is made but misses without a roll.
    AutomaticFail(String),
    /// The attack hits without a roll.
    AutomaticSuccess(String),
}

impl ToHit {
    /// Target number, when a roll is needed.
    #[must_use]
    pub fn value(&self) -> Option<i32> {
        match self {
            ToHit::Roll(roll) => Some(roll.value()),
            _ => None,
        }
    }

    /// Whether the attack cannot be made at all.
    #[must_use]
    pub fn is_impossible(&self) -> bool {
        matches!(self, ToHit::Impossible(_))
    }

    /// Hit table and side, for results that can hit.
    #[must_use]
    pub fn table(&self) -> (HitTable, Side) {
        match self {
            ToHit::Roll(roll) => (roll.table, roll.side),
            _ => (HitTable::Standard, Side::Front),
        }
    }

    /// Reason or modifier breakdown.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            ToHit::Roll(roll) => roll.description(),
            ToHit::Impossible(reason)
            | ToHit::AutomaticFail(reason)
            | ToHit::AutomaticSuccess(reason) => reason.clone(),
        }
    }
}

/// Where a unit is and how it moved, as seen by to-hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityState {
    /// Hex occupied.
    pub position: HexCoord,
    /// Leg facing.
    pub facing: u8,
    /// Torso facing.
    pub secondary_facing: u8,
    /// Lying down.
    pub prone: bool,
    /// Shut down or crew unconscious.
    pub immobile: bool,
    /// Movement mode used this round.
    pub moved: MoveType,
    /// Hexes entered this round.
    pub hexes_moved: u32,
}

impl EntityState {
    /// Current state of a deployed entity.
    #[must_use]
    pub fn of(entity: &Entity) -> Option<Self> {
        Some(Self {
            position: entity.position?,
            facing: entity.facing,
            secondary_facing: entity.secondary_facing,
            prone: entity.prone,
            immobile: entity.is_immobile(),
            moved: entity.moved,
            hexes_moved: entity.hexes_moved,
        })
    }

    /// Builder: projected position and facing.
    #[must_use]
    pub const fn at(mut self, position: HexCoord, facing: u8) -> Self {
        self.position = position;
        self.facing = facing;
        self.secondary_facing = facing;
        self
    }

    /// Builder: projected movement.
    #[must_use]
    pub const fn moving(mut self, moved: MoveType, hexes_moved: u32) -> Self {
        self.moved = moved;
        self.hexes_moved = hexes_moved;
        self
    }
}

/// Attacker, target and environment of one attack.
#[derive(Debug, Clone, Copy)]
pub struct AttackContext<'a> {
    board: &'a Board,
    options: &'a GameOptions,
    attacker: &'a Entity,
    attacker_state: EntityState,
    target: &'a Entity,
    target_state: EntityState,
}

type Gate<T> = std::result::Result<T, ToHit>;

fn impossible<T>(reason: &str) -> Gate<T> {
    Err(ToHit::Impossible(reason.to_string()))
}

fn collapse(result: Gate<TargetRoll>) -> ToHit {
    result.map_or_else(|sentinel| sentinel, ToHit::Roll)
}

impl<'a> AttackContext<'a> {
    /// Context from both units' current state; `None` unless both are deployed.
    #[must_use]
    pub fn current(
        board: &'a Board,
        options: &'a GameOptions,
        attacker: &'a Entity,
        target: &'a Entity,
    ) -> Option<Self> {
        Some(Self::planned(
            board,
            options,
            attacker,
            EntityState::of(attacker)?,
            target,
            EntityState::of(target)?,
        ))
    }

    /// Context from projected states.
    #[must_use]
    pub const fn planned(
        board: &'a Board,
        options: &'a GameOptions,
        attacker: &'a Entity,
        attacker_state: EntityState,
        target: &'a Entity,
        target_state: EntityState,
    ) -> Self {
        Self {
            board,
            options,
            attacker,
            attacker_state,
            target,
            target_state,
        }
    }

    fn distance(&self) -> u32 {
        self.attacker_state.position.distance(self.target_state.position)
    }

    fn side(&self) -> Side {
        Side::of_attack(
            self.target_state.position,
            self.target_state.facing,
            self.attacker_state.position,
        )
    }

    fn endpoint(&self, entity: &Entity, state: &EntityState) -> Option<LosEndpoint> {
        let hex = self.board.hex(state.position)?;
        let bottom = entity.standing_level(hex);
        let height = i32::from(entity.is_mech() && !state.prone);
        Some(LosEndpoint {
            position: state.position,
            bottom,
            top: bottom + height,
        })
    }

    fn check_target(&self) -> Gate<()> {
        if self.attacker.id == self.target.id {
            return impossible("cannot attack itself");
        }
        if !self.target.is_targetable() {
            return impossible("target is not on the board");
        }
        if self.attacker.owner == self.target.owner && !self.options.friendly_fire {
            return impossible("friendly fire is disabled");
        }
        Ok(())
    }

    /// Modifiers shared by every attack, in fixed order.
    fn common(&self, roll: &mut TargetRoll, attacker_movement: bool) -> Gate<()> {
        if attacker_movement {
            match self.attacker_state.moved {
                MoveType::None => {}
                MoveType::Walk => roll.add(1, "attacker walked"),
                MoveType::Run | MoveType::Skid => roll.add(2, "attacker ran"),
                MoveType::Jump => roll.add(3, "attacker jumped"),
                MoveType::Sprint => return impossible("attacker sprinted"),
            }
        }

        let target = &self.target_state;
        if target.immobile {
            roll.add(-4, "target immobile");
        } else {
            roll.add(
                target_movement_modifier(target.hexes_moved),
                format!("target moved {} hexes", target.hexes_moved),
            );
            match target.moved {
                MoveType::Jump => roll.add(1, "target jumped"),
                MoveType::Sprint => roll.add(-1, "target sprinted"),
                MoveType::Skid => roll.add(2, "target skidded"),
                MoveType::None
                    if self.options.standing_still
                        && target.hexes_moved == 0
                        && self.target.class != UnitClass::Infantry =>
                {
                    roll.add(-1, "target didn't move");
                }
                _ => {}
            }
        }

        if self.attacker_state.prone {
            roll.add(2, "attacker prone");
        }

        if let Some(hex) = self.board.hex(target.position) {
            let level = hex.woods.max(hex.jungle);
            if level > 0 {
                roll.add(i32::from(level), "target in woods");
            }
        }

        if target.prone {
            if self.distance() > 1 {
                roll.add(1, "target prone and at range");
            } else {
                roll.add(-2, "target prone and adjacent");
            }
        }

        if self.attacker.is_mech() {
            match self.target.class {
                UnitClass::BattleArmor => roll.add(1, "battle armor target"),
                UnitClass::EjectedPilot => roll.add(2, "ejected pilot target"),
                UnitClass::Infantry => roll.add(1, "infantry target"),
                UnitClass::Mech => {}
            }
        }

        if self.target.quirks.low_profile {
            roll.add(1, "target has low profile");
        }
        Ok(())
    }

    fn weapon_arc(&self, mounted: &Mounted) -> (Arc, u8) {
        let state = &self.attacker_state;
        if !self.attacker.is_mech() {
            return (Arc::Any, state.facing);
        }
        if mounted.rear_mounted {
            return (Arc::Rear, state.secondary_facing);
        }
        let chassis = self.attacker.chassis;
        if chassis.is_leg(mounted.location) {
            return (Arc::Forward, state.facing);
        }
        match mounted.location {
            Location::LeftArm | Location::RightArm if self.attacker.arms_flipped => {
                (Arc::Rear, state.secondary_facing)
            }
            Location::LeftArm => (Arc::LeftArm, state.secondary_facing),
            Location::RightArm => (Arc::RightArm, state.secondary_facing),
            _ => (Arc::Forward, state.secondary_facing),
        }
    }

    /// To-hit for firing the weapon at `index` in the attacker's equipment.
    #[must_use]
    pub fn weapon(&self, index: usize) -> ToHit {
        collapse(self.weapon_roll(index))
    }

    fn weapon_roll(&self, index: usize) -> Gate<TargetRoll> {
        self.check_target()?;
        let Some(mounted) = self.attacker.equipment.get(index) else {
            return impossible("no such weapon");
        };
        let Some(stats) = mounted.weapon() else {
            return impossible("not a weapon");
        };
        if !mounted.is_working() || mounted.jammed {
            return impossible("weapon cannot fire");
        }
        let ammo = if stats.has(WeaponTags::AMMO) {
            let Some(bin) = mounted.linked_ammo.and_then(|i| self.attacker.equipment.get(i)) else {
                return impossible("ammo is gone");
            };
            if bin.shots_left == 0 || !bin.is_working() {
                return impossible("weapon out of ammo");
            }
            Some(bin)
        } else {
            None
        };
        if stats.has(WeaponTags::ONE_SHOT) && mounted.shots_left == 0 {
            return impossible("weapon already fired");
        }
        if self.attacker_state.prone
            && self.attacker.chassis == Chassis::Biped
            && (self.attacker.is_location_destroyed(Location::LeftArm)
                || self.attacker.is_location_destroyed(Location::RightArm))
        {
            return impossible("prone and missing an arm");
        }
        let (arc, facing) = self.weapon_arc(mounted);
        if !is_in_arc(self.attacker_state.position, facing, self.target_state.position, arc) {
            return impossible("target not in arc");
        }

        let distance = self.distance();
        let infantry = !self.attacker.is_mech() || stats.has(WeaponTags::INFANTRY);
        if distance == 0 && !infantry {
            return Err(ToHit::AutomaticFail(
                "noninfantry shooting with zero range".to_string(),
            ));
        }

        let mut roll = TargetRoll::new(HitTable::Standard, self.side());
        roll.add(self.attacker.crew.gunnery, "gunnery skill");
        self.common(&mut roll, true)?;

        let (Some(from), Some(to)) = (
            self.endpoint(self.attacker, &self.attacker_state),
            self.endpoint(self.target, &self.target_state),
        ) else {
            return impossible("off the board");
        };
        let los = self.board.line_of_sight(from, to);
        if los.blocked {
            return impossible("line of sight blocked");
        }
        if los.intervening_woods > 0 {
            roll.add(los.intervening_woods as i32, "intervening woods");
        }
        if los.partial_cover {
            roll.add(1, "target has partial cover");
        }

        let ranges = stats.ranges;
        match ranges.bracket(distance) {
            RangeBracket::Out => {
                return Err(ToHit::AutomaticFail("out of range".to_string()));
            }
            RangeBracket::Short if ranges.minimum > 0 && distance <= ranges.minimum => {
                roll.add((ranges.minimum - distance) as i32 + 1, "minimum range");
            }
            RangeBracket::Short => {}
            RangeBracket::Medium => roll.add(2, "medium range"),
            RangeBracket::Long => {
                roll.add(4, "long range");
                if self.attacker.quirks.improved_targeting_long {
                    roll.add(-1, "improved targeting (long)");
                }
            }
        }

        let heat = self.attacker.heat_firing_modifier();
        if heat != 0 {
            roll.add(heat, "heat");
        }

        self.weapon_damage_modifiers(&mut roll, mounted)?;
        if stats.to_hit_modifier != 0 {
            roll.add(stats.to_hit_modifier, "weapon to-hit");
        }
        let cluster_ammo = matches!(
            ammo.map(|a| &a.kind),
            Some(EquipmentType::Ammo { cluster: true, .. })
        );
        if cluster_ammo {
            roll.add(-1, "cluster ammunition");
        }
        if self.attacker.has_targeting_computer()
            && stats.has(WeaponTags::DIRECT_FIRE)
            && !cluster_ammo
        {
            roll.add(-1, "targeting computer");
        }
        Ok(roll)
    }

    fn weapon_damage_modifiers(&self, roll: &mut TargetRoll, mounted: &Mounted) -> Gate<()> {
        let attacker = self.attacker;
        if !attacker.is_mech() {
            return Ok(());
        }
        match attacker.damaged_systems(SystemKind::Sensors, None) {
            0 => {}
            1 => roll.add(2, "sensor damage"),
            _ => return impossible("sensors destroyed"),
        }
        let location = mounted.location;
        if attacker.chassis.is_arm(location) {
            if !attacker.has_working_system(SystemKind::Shoulder, location) {
                roll.add(4, "shoulder actuator destroyed");
            } else {
                if !attacker.has_working_system(SystemKind::UpperArm, location) {
                    roll.add(1, "upper arm actuator destroyed");
                }
                if !attacker.has_working_system(SystemKind::LowerArm, location) {
                    roll.add(1, "lower arm actuator destroyed");
                }
            }
        }
        Ok(())
    }

    fn physical_gates(&self) -> Gate<()> {
        if !self.attacker.is_mech() {
            return impossible("non-mechs don't make physical attacks");
        }
        self.check_target()?;
        if self.distance() > 1 {
            return impossible("target not adjacent");
        }
        Ok(())
    }

    /// Levels (bottom, top) of both units: attacker first.
    fn elevations(&self) -> Gate<((i32, i32), (i32, i32))> {
        let (Some(a), Some(t)) = (
            self.endpoint(self.attacker, &self.attacker_state),
            self.endpoint(self.target, &self.target_state),
        ) else {
            return impossible("off the board");
        };
        Ok(((a.bottom, a.top), (t.bottom, t.top)))
    }

    fn directly_ahead(&self) -> bool {
        self.attacker_state
            .position
            .translated(self.attacker_state.facing)
            == self.target_state.position
    }

    fn arm_present(&self, location: Location) -> Gate<()> {
        if self.attacker.chassis != Chassis::Biped {
            return impossible("no arms");
        }
        if self.attacker.is_location_destroyed(location) {
            return impossible("arm destroyed");
        }
        if !self.attacker.has_working_system(SystemKind::Shoulder, location) {
            return impossible("shoulder destroyed");
        }
        Ok(())
    }

    fn arm_actuators(&self, roll: &mut TargetRoll, location: Location, hand: i32) {
        if !self.attacker.has_working_system(SystemKind::UpperArm, location) {
            roll.add(2, "upper arm actuator destroyed");
        }
        if !self.attacker.has_working_system(SystemKind::LowerArm, location) {
            roll.add(2, "lower arm actuator missing or destroyed");
        }
        if hand > 0 && !self.attacker.has_working_system(SystemKind::Hand, location) {
            roll.add(hand, "hand actuator missing or destroyed");
        }
    }

    /// To-hit for a punch with one arm. [`Arm::Both`] is evaluated per arm
    /// by the caller.
    #[must_use]
    pub fn punch(&self, arm: Arm) -> ToHit {
        collapse(self.punch_roll(arm))
    }

    fn punch_roll(&self, arm: Arm) -> Gate<TargetRoll> {
        self.physical_gates()?;
        let (location, arc) = match arm {
            Arm::Left => (Location::LeftArm, Arc::LeftArm),
            Arm::Right => (Location::RightArm, Arc::RightArm),
            Arm::Both => return impossible("one arm at a time"),
        };
        let state = &self.attacker_state;
        if self.distance() > 0
            && !is_in_arc(state.position, state.secondary_facing, self.target_state.position, arc)
        {
            return impossible("target not in arc");
        }
        let ((_, attacker_top), (target_bottom, target_top)) = self.elevations()?;
        if attacker_top < target_bottom || attacker_top > target_top {
            return impossible("target elevation not in range");
        }
        if state.prone {
            return impossible("can't punch while prone");
        }
        if self.target.class == UnitClass::Infantry {
            return impossible("can't punch infantry");
        }
        self.arm_present(location)?;

        let mut roll = TargetRoll::new(HitTable::Punch, self.side());
        roll.add(self.attacker.crew.piloting, "base");
        self.common(&mut roll, true)?;
        self.arm_actuators(&mut roll, location, 1);
        Ok(roll)
    }

    /// To-hit for a kick.
    #[must_use]
    pub fn kick(&self, leg: Leg) -> ToHit {
        collapse(self.kick_roll(leg))
    }

    fn kick_roll(&self, leg: Leg) -> Gate<TargetRoll> {
        self.physical_gates()?;
        let state = &self.attacker_state;
        let distance = self.distance();
        if distance > 0 && !is_in_arc(state.position, state.facing, self.target_state.position, Arc::Forward)
        {
            return impossible("target not in arc");
        }
        if state.prone {
            return impossible("can't kick while prone");
        }
        let location = leg.location(self.attacker.chassis);
        if self.attacker.is_location_destroyed(location) {
            return impossible("leg destroyed");
        }
        let ((attacker_bottom, _), (target_bottom, target_top)) = self.elevations()?;
        if attacker_bottom < target_bottom || attacker_bottom > target_top {
            return impossible("target elevation not in range");
        }
        if self.attacker.damaged_systems(SystemKind::Hip, None) > 0 {
            return impossible("can't kick with broken hip");
        }

        let mut roll = TargetRoll::new(HitTable::Kick, self.side());
        roll.add(self.attacker.crew.piloting - 2, "base");
        if self.target.class == UnitClass::Infantry {
            if distance == 0 {
                roll.add(3, "kicking infantry");
            } else {
                return impossible("infantry too far away");
            }
        }
        self.common(&mut roll, true)?;
        if !self.attacker.has_working_system(SystemKind::UpperLeg, location) {
            roll.add(2, "upper leg actuator destroyed");
        }
        if !self.attacker.has_working_system(SystemKind::LowerLeg, location) {
            roll.add(2, "lower leg actuator destroyed");
        }
        if !self.attacker.has_working_system(SystemKind::Foot, location) {
            roll.add(1, "foot actuator destroyed");
        }
        Ok(roll)
    }

    /// To-hit for a club swing.
    #[must_use]
    pub fn club(&self) -> ToHit {
        collapse(self.club_roll())
    }

    fn club_roll(&self) -> Gate<TargetRoll> {
        self.physical_gates()?;
        if self.attacker.club().is_none() {
            return impossible("no club");
        }
        let state = &self.attacker_state;
        if self.distance() > 0
            && !is_in_arc(state.position, state.secondary_facing, self.target_state.position, Arc::Forward)
        {
            return impossible("target not in arc");
        }
        if state.prone {
            return impossible("can't swing a club while prone");
        }
        for arm in [Location::LeftArm, Location::RightArm] {
            self.arm_present(arm)?;
            if !self.attacker.has_working_system(SystemKind::Hand, arm) {
                return impossible("a club needs both hands");
            }
        }
        let ((_, attacker_top), (target_bottom, target_top)) = self.elevations()?;
        if attacker_top < target_bottom || attacker_top > target_top {
            return impossible("target elevation not in range");
        }

        let mut roll = TargetRoll::new(HitTable::Standard, self.side());
        roll.add(self.attacker.crew.piloting - 1, "base");
        self.common(&mut roll, true)?;
        for arm in [Location::LeftArm, Location::RightArm] {
            self.arm_actuators(&mut roll, arm, 0);
        }
        Ok(roll)
    }

    /// To-hit for a push.
    #[must_use]
    pub fn push(&self) -> ToHit {
        collapse(self.push_roll())
    }

    fn push_roll(&self) -> Gate<TargetRoll> {
        self.physical_gates()?;
        if !self.directly_ahead() {
            return impossible("target not directly ahead of feet");
        }
        if !self.target.is_mech() {
            return impossible("can only push mechs");
        }
        let state = &self.attacker_state;
        if state.prone {
            return impossible("can't push while prone");
        }
        if state.secondary_facing != state.facing {
            return impossible("can't push with torso twisted");
        }
        for arm in [Location::LeftArm, Location::RightArm] {
            self.arm_present(arm)?;
        }
        let ((attacker_bottom, _), (target_bottom, _)) = self.elevations()?;
        if attacker_bottom != target_bottom {
            return impossible("target not at same elevation");
        }

        let mut roll = TargetRoll::new(HitTable::Standard, self.side());
        roll.add(self.attacker.crew.piloting - 1, "base");
        self.common(&mut roll, true)?;
        for arm in [Location::LeftArm, Location::RightArm] {
            self.arm_actuators(&mut roll, arm, 0);
        }
        Ok(roll)
    }

    fn piloting_differential(&self, roll: &mut TargetRoll) {
        if self.target.is_mech() {
            roll.add(
                self.attacker.crew.piloting - self.target.crew.piloting,
                "piloting skill differential",
            );
        }
    }

    /// To-hit for a charge from the attacker's end-of-movement position.
    #[must_use]
    pub fn charge(&self) -> ToHit {
        collapse(self.charge_roll())
    }

    fn charge_roll(&self) -> Gate<TargetRoll> {
        self.physical_gates()?;
        let state = &self.attacker_state;
        match state.moved {
            MoveType::Jump => return impossible("can't charge while jumping"),
            MoveType::None => return impossible("charging requires movement"),
            _ => {}
        }
        if !self.directly_ahead() {
            return impossible("target not directly ahead");
        }
        if state.prone {
            return impossible("attacker prone");
        }
        let ((attacker_bottom, attacker_top), (target_bottom, target_top)) = self.elevations()?;
        if attacker_bottom > target_top || attacker_top < target_bottom {
            return impossible("target elevation not in range");
        }

        let mut roll = TargetRoll::new(HitTable::Standard, self.side());
        roll.add(self.attacker.crew.piloting, "base");
        self.common(&mut roll, false)?;
        self.piloting_differential(&mut roll);
        Ok(roll)
    }

    /// To-hit for a death from above.
    #[must_use]
    pub fn death_from_above(&self) -> ToHit {
        collapse(self.dfa_roll())
    }

    fn dfa_roll(&self) -> Gate<TargetRoll> {
        self.physical_gates()?;
        if self.attacker_state.moved != MoveType::Jump {
            return impossible("death from above requires a jump");
        }
        if !self.directly_ahead() {
            return impossible("target not directly ahead");
        }
        let mut roll = TargetRoll::new(HitTable::Punch, self.side());
        roll.add(self.attacker.crew.piloting, "base");
        self.common(&mut roll, false)?;
        self.piloting_differential(&mut roll);
        Ok(roll)
    }
}

/// Modifier for how far a target moved this round.
#[must_use]
pub const fn target_movement_modifier(hexes_moved: u32) -> i32 {
    match hexes_moved {
        0..=2 => 0,
        3..=4 => 1,
        5..=6 => 2,
        7..=9 => 3,
        10..=17 => 4,
        18..=24 => 5,
        _ => 6,
    }
}

/// Planner estimate for a weapon attack from projected states.
#[must_use]
pub fn estimate_weapon(
    board: &Board,
    options: &GameOptions,
    attacker: &Entity,
    attacker_state: EntityState,
    target: &Entity,
    target_state: EntityState,
    weapon: usize,
) -> ToHit {
    AttackContext::planned(board, options, attacker, attacker_state, target, target_state)
        .weapon(weapon)
}

/// Planner estimate for the best punch or kick from projected states.
#[must_use]
pub fn estimate_physical(
    board: &Board,
    options: &GameOptions,
    attacker: &Entity,
    attacker_state: EntityState,
    target: &Entity,
    target_state: EntityState,
) -> ToHit {
    let context =
        AttackContext::planned(board, options, attacker, attacker_state, target, target_state);
    [
        context.punch(Arm::Left),
        context.punch(Arm::Right),
        context.kick(Leg::Left),
        context.kick(Leg::Right),
    ]
    .into_iter()
    .min_by_key(|t| t.value().unwrap_or(i32::MAX))
    .unwrap_or_else(|| ToHit::Impossible("no physical attack".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Hex;
    use crate::data::UnitData;
    use crate::entity::Points;
    use proptest::prelude::*;

    fn mech(id: u32, owner: u32, x: i32, y: i32, facing: u8) -> Entity {
        let unit = UnitData::mech("Centurion", "CN9-A", 50, 4)
            .with_crew("Pilot", 4, 5)
            .with_item("medium_laser", Location::RightArm)
            .with_item("lrm_10", Location::LeftTorso)
            .with_item("ammo:lrm_10", Location::LeftTorso)
            .with_item("ac_10", Location::RightTorso)
            .with_item("ammo:ac_10", Location::RightTorso);
        let mut entity = Entity::from_unit_data(id, owner, &unit).unwrap();
        entity.position = Some(HexCoord::new(x, y));
        entity.facing = facing;
        entity.secondary_facing = facing;
        entity
    }

    fn values(to_hit: &ToHit) -> Vec<(i32, String)> {
        match to_hit {
            ToHit::Roll(roll) => roll
                .modifiers()
                .iter()
                .map(|m| (m.value, m.reason.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_weapon_short_range_base() {
        let board = Board::blank(16, 17);
        let options = GameOptions::default();
        let attacker = mech(1, 1, 5, 8, 0);
        let target = mech(2, 2, 5, 6, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        let to_hit = ctx.weapon(0);
        assert_eq!(to_hit.value(), Some(4));
        assert_eq!(to_hit.table(), (HitTable::Standard, Side::Front));
    }

    #[test]
    fn test_weapon_modifier_order() {
        let mut board = Board::blank(16, 17);
        board.set_hex(HexCoord::new(5, 2), Hex::clear(0).with_woods(2));
        let options = GameOptions::default();
        let mut attacker = mech(1, 1, 5, 8, 0);
        attacker.moved = MoveType::Run;
        attacker.heat = 9;
        let mut target = mech(2, 2, 5, 2, 3);
        target.hexes_moved = 5;
        target.moved = MoveType::Jump;
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        // Medium laser at 6 hexes is medium range.
        let to_hit = ctx.weapon(0);
        assert_eq!(
            values(&to_hit),
            vec![
                (4, "gunnery skill".to_string()),
                (2, "attacker ran".to_string()),
                (2, "target moved 5 hexes".to_string()),
                (1, "target jumped".to_string()),
                (2, "target in woods".to_string()),
                (2, "medium range".to_string()),
                (1, "heat".to_string()),
            ]
        );
        assert_eq!(to_hit.value(), Some(14));
    }

    #[test]
    fn test_minimum_range_scales() {
        let board = Board::blank(16, 17);
        let options = GameOptions::default();
        let attacker = mech(1, 1, 5, 8, 0);
        let target = mech(2, 2, 5, 6, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        // LRM 10 at 2 hexes: minimum 6, so 6 - 2 + 1.
        assert_eq!(ctx.weapon(1).value(), Some(4 + 5));
    }

    #[test]
    fn test_sentinels_short_circuit() {
        let board = Board::blank(16, 17);
        let options = GameOptions::default();
        let attacker = mech(1, 1, 5, 8, 0);

        let shooter = mech(6, 1, 5, 14, 0);
        let far = mech(2, 2, 5, 2, 3);
        let ctx = AttackContext::current(&board, &options, &shooter, &far).unwrap();
        assert_eq!(
            ctx.weapon(0),
            ToHit::AutomaticFail("out of range".to_string())
        );

        let behind = mech(3, 2, 5, 10, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &behind).unwrap();
        assert!(ctx.weapon(0).is_impossible());

        let ally = mech(4, 1, 5, 6, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &ally).unwrap();
        assert!(ctx.weapon(0).is_impossible());

        let mut empty = attacker.clone();
        empty.equipment[2].shots_left = 0;
        let target = mech(5, 2, 5, 6, 3);
        let ctx = AttackContext::current(&board, &options, &empty, &target).unwrap();
        assert_eq!(ctx.weapon(1), ToHit::Impossible("weapon out of ammo".to_string()));
    }

    #[test]
    fn test_blocked_line_of_sight() {
        let mut board = Board::blank(16, 17);
        board.set_hex(HexCoord::new(5, 6), Hex::clear(4));
        let options = GameOptions::default();
        let attacker = mech(1, 1, 5, 8, 0);
        let target = mech(2, 2, 5, 4, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        assert_eq!(
            ctx.weapon(0),
            ToHit::Impossible("line of sight blocked".to_string())
        );
    }

    #[test]
    fn test_punch_and_kick() {
        let board = Board::blank(16, 17);
        let options = GameOptions::default();
        let attacker = mech(1, 1, 5, 8, 0);
        let target = mech(2, 2, 5, 7, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        assert_eq!(ctx.punch(Arm::Right).value(), Some(5));
        assert_eq!(ctx.punch(Arm::Right).table().0, HitTable::Punch);
        assert_eq!(ctx.kick(Leg::Left).value(), Some(3));
        assert!(ctx.punch(Arm::Both).is_impossible());

        let mut broken = attacker.clone();
        broken.location_mut(Location::RightArm).unwrap().internal = Points::Destroyed;
        let ctx = AttackContext::current(&board, &options, &broken, &target).unwrap();
        assert!(ctx.punch(Arm::Right).is_impossible());

        let far = mech(3, 2, 5, 5, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &far).unwrap();
        assert_eq!(
            ctx.kick(Leg::Left),
            ToHit::Impossible("target not adjacent".to_string())
        );
    }

    #[test]
    fn test_charge_requires_ground_movement() {
        let board = Board::blank(16, 17);
        let options = GameOptions::default();
        let mut attacker = mech(1, 1, 5, 8, 0);
        let target = mech(2, 2, 5, 7, 3);
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        assert!(ctx.charge().is_impossible());

        attacker.moved = MoveType::Run;
        attacker.hexes_moved = 4;
        let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
        // Piloting 5, target stood still, equal pilots.
        assert_eq!(ctx.charge().value(), Some(5));
        assert!(ctx.death_from_above().is_impossible());
    }

    #[test]
    fn test_estimate_matches_current_state() {
        let board = Board::blank(16, 17);
        let options = GameOptions::default();
        let attacker = mech(1, 1, 5, 8, 0);
        let target = mech(2, 2, 5, 5, 3);
        let projected = EntityState::of(&attacker)
            .unwrap()
            .at(HexCoord::new(5, 7), 0)
            .moving(MoveType::Walk, 1);
        let estimate = estimate_weapon(
            &board,
            &options,
            &attacker,
            projected,
            &target,
            EntityState::of(&target).unwrap(),
            0,
        );

        let mut moved = attacker.clone();
        moved.position = Some(HexCoord::new(5, 7));
        moved.moved = MoveType::Walk;
        moved.hexes_moved = 1;
        let actual = AttackContext::current(&board, &options, &moved, &target)
            .unwrap()
            .weapon(0);
        assert_eq!(estimate, actual);
    }

    proptest! {
        #[test]
        fn prop_to_hit_is_idempotent(
            ax in 0i32..16, ay in 0i32..17, tx in 0i32..16, ty in 0i32..17,
            facing in 0u8..6, heat in 0u32..30, hexes in 0u32..12, weapon in 0usize..5,
        ) {
            let board = Board::blank(16, 17);
            let options = GameOptions::default();
            let mut attacker = mech(1, 1, ax, ay, facing);
            attacker.heat = heat;
            let mut target = mech(2, 2, tx, ty, 0);
            target.hexes_moved = hexes;
            let before = (attacker.clone(), target.clone());
            let ctx = AttackContext::current(&board, &options, &attacker, &target).unwrap();
            let first = ctx.weapon(weapon);
            let second = ctx.weapon(weapon);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(ctx.kick(Leg::Left), ctx.kick(Leg::Left));
            prop_assert_eq!(before, (attacker.clone(), target.clone()));
        }
    }
}
