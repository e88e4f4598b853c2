//! Combat units and their mutable battle state.
//!
//! An [`Entity`] is built from a [`UnitData`] definition when a player adds
//! it in the lounge, deployed at Exchange, and mutated by every phase after
//! that. Destroyed or withdrawn entities leave [`EntityStorage`] for the
//! session's inactive roster and never come back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::board::{Board, Hex, LosEndpoint};
use crate::data::{self, UnitData, WeaponTags, WeaponType};
use crate::dice::Dice;
use crate::error::{GameError, Result};
use crate::hex::{HexCoord, Side};
use crate::player::PlayerId;

/// Stable entity identifier.
pub type EntityId = u32;

// ============================================================================
// Body layout
// ============================================================================

/// Target class, used by to-hit modifiers and physical attack rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitClass {
    /// Battle mech.
    #[default]
    Mech,
    /// Powered-armor squad.
    BattleArmor,
    /// Conventional infantry.
    Infantry,
    /// A pilot who has left their machine.
    EjectedPilot,
}

/// Body layout; decides locations, transfer table and slot counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Chassis {
    /// Two legs, two arms.
    #[default]
    Biped,
    /// Four legs; the arm locations hold the front legs.
    Quad,
    /// A single pool of troopers.
    Platoon,
}

/// Engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EngineKind {
    /// Engine entirely in the center torso.
    #[default]
    Standard,
    /// Engine extends three slots into each side torso.
    Xl,
}

/// Hit location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    /// Head.
    Head,
    /// Center torso.
    CenterTorso,
    /// Right torso.
    RightTorso,
    /// Left torso.
    LeftTorso,
    /// Right arm, or right front leg on a quad.
    RightArm,
    /// Left arm, or left front leg on a quad.
    LeftArm,
    /// Right leg.
    RightLeg,
    /// Left leg.
    LeftLeg,
    /// Platoon troopers.
    Troopers,
}

const MECH_LOCATIONS: [Location; 8] = [
    Location::Head,
    Location::CenterTorso,
    Location::RightTorso,
    Location::LeftTorso,
    Location::RightArm,
    Location::LeftArm,
    Location::RightLeg,
    Location::LeftLeg,
];

impl Location {
    /// Short display name.
    #[must_use]
    pub const fn abbreviation(self) -> &'static str {
        match self {
            Location::Head => "HD",
            Location::CenterTorso => "CT",
            Location::RightTorso => "RT",
            Location::LeftTorso => "LT",
            Location::RightArm => "RA",
            Location::LeftArm => "LA",
            Location::RightLeg => "RL",
            Location::LeftLeg => "LL",
            Location::Troopers => "TR",
        }
    }

    /// Whether the location carries rear armor.
    #[must_use]
    pub const fn has_rear(self) -> bool {
        matches!(
            self,
            Location::CenterTorso | Location::LeftTorso | Location::RightTorso
        )
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl Chassis {
    /// Locations of this layout in table order.
    #[must_use]
    pub fn locations(self) -> &'static [Location] {
        match self {
            Chassis::Biped | Chassis::Quad => &MECH_LOCATIONS,
            Chassis::Platoon => &[Location::Troopers],
        }
    }

    /// Where excess damage goes once `location` is gone.
    /// `None` means the whole unit is destroyed.
    #[must_use]
    pub const fn transfer(self, location: Location) -> Option<Location> {
        match location {
            Location::RightArm | Location::RightLeg => Some(Location::RightTorso),
            Location::LeftArm | Location::LeftLeg => Some(Location::LeftTorso),
            Location::RightTorso | Location::LeftTorso => Some(Location::CenterTorso),
            Location::CenterTorso | Location::Head | Location::Troopers => None,
        }
    }

    /// Location that is lost together with `location`.
    #[must_use]
    pub const fn dependent(self, location: Location) -> Option<Location> {
        match (self, location) {
            (Chassis::Biped, Location::RightTorso) => Some(Location::RightArm),
            (Chassis::Biped, Location::LeftTorso) => Some(Location::LeftArm),
            _ => None,
        }
    }

    /// Whether a location is a leg.
    #[must_use]
    pub const fn is_leg(self, location: Location) -> bool {
        match (self, location) {
            (Chassis::Platoon, _) => false,
            (_, Location::LeftLeg | Location::RightLeg) => true,
            (Chassis::Quad, Location::LeftArm | Location::RightArm) => true,
            _ => false,
        }
    }

    /// Whether a location is an arm.
    #[must_use]
    pub const fn is_arm(self, location: Location) -> bool {
        matches!(
            (self, location),
            (Chassis::Biped, Location::LeftArm | Location::RightArm)
        )
    }
}

// ============================================================================
// Structure and critical slots
// ============================================================================

/// Armor or structure points of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Points {
    /// Points left (0 once exhausted).
    Remaining(u32),
    /// Lost this phase; becomes [`Points::Destroyed`] at the next phase reset.
    Doomed,
    /// Lost.
    Destroyed,
}

impl Points {
    /// Remaining points, 0 for the destroyed markers.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Points::Remaining(v) => v,
            Points::Doomed | Points::Destroyed => 0,
        }
    }

    /// Whether the location this belongs to has been lost.
    #[must_use]
    pub const fn is_gone(self) -> bool {
        !matches!(self, Points::Remaining(_))
    }
}

/// Fixed internal systems occupying critical slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemKind {
    /// Life support.
    LifeSupport,
    /// Sensors.
    Sensors,
    /// Cockpit.
    Cockpit,
    /// Engine.
    Engine,
    /// Balance gyro.
    Gyro,
    /// Shoulder actuator.
    Shoulder,
    /// Upper arm actuator.
    UpperArm,
    /// Lower arm actuator.
    LowerArm,
    /// Hand actuator.
    Hand,
    /// Hip actuator.
    Hip,
    /// Upper leg actuator.
    UpperLeg,
    /// Lower leg actuator.
    LowerLeg,
    /// Foot actuator.
    Foot,
}

/// What occupies a critical slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotContent {
    /// A fixed system.
    System(SystemKind),
    /// Index into [`Entity::equipment`].
    Equipment(usize),
}

/// A critical slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CriticalSlot {
    /// Occupant.
    pub content: SlotContent,
    /// Hit this phase.
    pub hit: bool,
    /// Hit in an earlier phase.
    pub destroyed: bool,
    /// Lost with its location.
    pub missing: bool,
}

impl CriticalSlot {
    /// An undamaged slot.
    #[must_use]
    pub const fn new(content: SlotContent) -> Self {
        Self {
            content,
            hit: false,
            destroyed: false,
            missing: false,
        }
    }

    /// Can still be selected by a critical roll.
    #[must_use]
    pub const fn is_hittable(&self) -> bool {
        !self.hit && !self.destroyed && !self.missing
    }

    /// Hit, destroyed or missing.
    #[must_use]
    pub const fn is_damaged(&self) -> bool {
        self.hit || self.destroyed || self.missing
    }
}

/// Per-location armor, structure and slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationState {
    /// Which location.
    pub location: Location,
    /// Front armor.
    pub armor: Points,
    /// Rear armor, torsos only.
    pub rear_armor: Option<Points>,
    /// Internal structure.
    pub internal: Points,
    /// Critical slots; `None` is an empty slot.
    pub slots: Vec<Option<CriticalSlot>>,
}

impl LocationState {
    /// Armor facing the given direction.
    #[must_use]
    pub fn armor_for(&self, rear: bool) -> Points {
        match (rear, self.rear_armor) {
            (true, Some(points)) => points,
            _ => self.armor,
        }
    }

    /// Sum of remaining armor (front and rear) and structure.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.armor.value() + self.rear_armor.map_or(0, Points::value) + self.internal.value()
    }

    /// Indices of slots a critical roll may select.
    #[must_use]
    pub fn hittable_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.filter(CriticalSlot::is_hittable).map(|_| i))
            .collect()
    }
}

// ============================================================================
// Equipment
// ============================================================================

/// Improvised melee weapons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClubKind {
    /// A tree torn from a woods hex; breaks after one use.
    Tree,
}

/// What a mounted item is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentType {
    /// A weapon from the weapon table.
    Weapon(String),
    /// Ammunition for a weapon.
    Ammo {
        /// Weapon identifier this ammunition feeds.
        weapon: String,
        /// Cluster munitions.
        cluster: bool,
    },
    /// Additional heat sink.
    HeatSink,
    /// Explosion containment.
    Case,
    /// Targeting computer.
    TargetingComputer,
    /// Jump jet.
    JumpJet,
    /// Improvised club.
    Club(ClubKind),
}

impl EquipmentType {
    /// Parse an item identifier from a unit definition.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown items or ammunition for weapons that
    /// do not use it.
    pub fn parse(item: &str) -> Result<Self> {
        match item {
            "heat_sink" => return Ok(Self::HeatSink),
            "case" => return Ok(Self::Case),
            "targeting_computer" => return Ok(Self::TargetingComputer),
            "jump_jet" => return Ok(Self::JumpJet),
            _ => {}
        }
        if let Some(rest) = item.strip_prefix("ammo:") {
            let (weapon, cluster) = match rest.strip_suffix(":cluster") {
                Some(weapon) => (weapon, true),
                None => (rest, false),
            };
            let stats = data::weapon_type(weapon)
                .ok_or_else(|| GameError::InvalidUnit(format!("no weapon '{weapon}' for {item}")))?;
            if !stats.has(WeaponTags::AMMO) {
                return Err(GameError::InvalidUnit(format!("{weapon} does not use ammunition")));
            }
            if cluster && !stats.has(WeaponTags::CLUSTER) {
                return Err(GameError::InvalidUnit(format!("{weapon} cannot fire cluster rounds")));
            }
            return Ok(Self::Ammo {
                weapon: weapon.to_string(),
                cluster,
            });
        }
        data::weapon_type(item)
            .map(|w| Self::Weapon(w.id.to_string()))
            .ok_or_else(|| GameError::InvalidUnit(format!("unknown item '{item}'")))
    }

    /// Critical slots occupied.
    #[must_use]
    pub fn criticals(&self) -> usize {
        match self {
            Self::Weapon(id) => data::weapon_type(id).map_or(1, |w| w.criticals as usize),
            Self::Club(_) => 0,
            _ => 1,
        }
    }
}

/// A mounted item and its battle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mounted {
    /// What it is.
    pub kind: EquipmentType,
    /// Where it is.
    pub location: Location,
    /// Fires into the rear arc.
    pub rear_mounted: bool,
    /// Hit this phase.
    pub hit: bool,
    /// Destroyed in an earlier phase.
    pub destroyed: bool,
    /// Lost with its location.
    pub missing: bool,
    /// Rapid-fire weapon jammed.
    pub jammed: bool,
    /// Ammunition rounds, or remaining shots of a one-shot weapon.
    pub shots_left: u32,
    /// Weapon fired this round.
    pub used_this_round: bool,
    /// Ammunition bin feeding this weapon.
    pub linked_ammo: Option<usize>,
    /// Selected firing mode index.
    pub mode: usize,
}

impl Mounted {
    /// A fresh mount.
    #[must_use]
    pub fn new(kind: EquipmentType, location: Location, rear_mounted: bool) -> Self {
        let shots_left = match &kind {
            EquipmentType::Ammo { weapon, .. } => {
                data::weapon_type(weapon).map_or(0, |w| w.ammo_per_ton)
            }
            EquipmentType::Weapon(id) => data::weapon_type(id)
                .filter(|w| w.has(WeaponTags::ONE_SHOT))
                .map_or(0, |_| 1),
            _ => 0,
        };
        Self {
            kind,
            location,
            rear_mounted,
            hit: false,
            destroyed: false,
            missing: false,
            jammed: false,
            shots_left,
            used_this_round: false,
            linked_ammo: None,
            mode: 0,
        }
    }

    /// Weapon statistics, if this is a weapon.
    #[must_use]
    pub fn weapon(&self) -> Option<&'static WeaponType> {
        match &self.kind {
            EquipmentType::Weapon(id) => data::weapon_type(id),
            _ => None,
        }
    }

    /// Not hit, destroyed or missing.
    #[must_use]
    pub const fn is_working(&self) -> bool {
        !self.hit && !self.destroyed && !self.missing
    }

    /// Ammunition with rounds left explodes when hit.
    #[must_use]
    pub fn is_explosive(&self) -> bool {
        matches!(self.kind, EquipmentType::Ammo { .. }) && self.shots_left > 0
    }

    /// Damage dealt if this item explodes.
    #[must_use]
    pub fn explosion_damage(&self) -> u32 {
        match &self.kind {
            EquipmentType::Ammo { weapon, .. } => data::weapon_type(weapon)
                .map_or(0, |w| w.damage_per_shot() * self.shots_left),
            _ => 0,
        }
    }

    /// Whether this ammunition bin can feed `weapon`.
    #[must_use]
    pub fn feeds(&self, weapon: &str) -> bool {
        matches!(&self.kind, EquipmentType::Ammo { weapon: w, .. } if w == weapon)
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            EquipmentType::Weapon(id) => data::weapon_type(id).map_or(id.clone(), |w| w.name.to_string()),
            EquipmentType::Ammo { weapon, cluster } => {
                let name = data::weapon_type(weapon).map_or(weapon.as_str(), |w| w.name);
                if *cluster {
                    format!("{name} Cluster Ammo")
                } else {
                    format!("{name} Ammo")
                }
            }
            EquipmentType::HeatSink => "Heat Sink".to_string(),
            EquipmentType::Case => "CASE".to_string(),
            EquipmentType::TargetingComputer => "Targeting Computer".to_string(),
            EquipmentType::JumpJet => "Jump Jet".to_string(),
            EquipmentType::Club(ClubKind::Tree) => "Tree Club".to_string(),
        }
    }
}

// ============================================================================
// Crew
// ============================================================================

/// Pilot state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crew {
    /// Pilot name.
    pub name: String,
    /// Gunnery skill.
    pub gunnery: i32,
    /// Piloting skill.
    pub piloting: i32,
    /// Wounds taken.
    pub hits: u32,
    /// Knocked out.
    pub unconscious: bool,
    /// Killed.
    pub dead: bool,
    /// Knocked out this round; no wake-up roll until next round.
    pub knocked_out_this_round: bool,
    /// Consciousness rolls owed for wounds taken this phase.
    pub rolls_needed: u32,
}

impl Crew {
    /// Wounds that kill a pilot.
    pub const LETHAL_HITS: u32 = 6;

    /// Roll needed to stay (or become) conscious with the current wounds.
    #[must_use]
    pub const fn consciousness_number(&self) -> i32 {
        Self::consciousness_for(self.hits)
    }

    /// Roll needed to stay conscious after taking the `hits`-th wound.
    #[must_use]
    pub const fn consciousness_for(hits: u32) -> i32 {
        match hits {
            0 | 1 => 3,
            2 => 5,
            3 => 7,
            4 => 10,
            _ => 11,
        }
    }

    /// Usable: alive and awake.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.dead && !self.unconscious
    }
}

// ============================================================================
// Entity
// ============================================================================

/// How a unit moved this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveType {
    /// Did not move.
    #[default]
    None,
    /// Walked.
    Walk,
    /// Ran.
    Run,
    /// Jumped.
    Jump,
    /// Sprinted (optional rule).
    Sprint,
    /// Fell while running and skidded.
    Skid,
}

/// Movement-phase attack that resolves during the physical phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplacementKind {
    /// Charge.
    Charge,
    /// Death from above.
    DeathFromAbove,
}

/// A declared charge or death from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplacementAttack {
    /// Kind of attack.
    pub kind: DisplacementKind,
    /// Target entity.
    pub target: EntityId,
    /// Where the target stood when the attack was declared.
    pub target_position: HexCoord,
}

/// Why an entity left play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Removal {
    /// Destroyed.
    Destroyed,
    /// Pilot killed.
    CrewKilled,
    /// Withdrew from the board.
    Fled,
    /// Forced off the board edge.
    PushedOff,
}

/// Design quirks that modify to-hit numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Quirks {
    /// Harder to hit.
    #[serde(default)]
    pub low_profile: bool,
    /// Better at long range.
    #[serde(default)]
    pub improved_targeting_long: bool,
}

/// Which table a hit is rolled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitTable {
    /// 2d6 standard table.
    Standard,
    /// 1d6 punch table.
    Punch,
    /// 1d6 kick table.
    Kick,
}

/// A rolled hit location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HitData {
    /// Location struck.
    pub location: Location,
    /// Strikes rear armor.
    pub rear: bool,
    /// A natural 2 on the standard table: roll for a critical even if armor holds.
    pub through_armor_critical: bool,
}

impl HitData {
    /// A plain hit.
    #[must_use]
    pub const fn new(location: Location, rear: bool) -> Self {
        Self {
            location,
            rear,
            through_armor_critical: false,
        }
    }
}

/// A combat unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier.
    pub id: EntityId,
    /// Owning player.
    pub owner: PlayerId,
    /// Chassis name.
    pub chassis_name: String,
    /// Model designation.
    pub model: String,
    /// Target class.
    pub class: UnitClass,
    /// Body layout.
    pub chassis: Chassis,
    /// Weight in tons.
    pub tonnage: u32,
    /// Undamaged walking MP.
    pub walk_mp: u32,
    /// Undamaged jumping MP.
    pub jump_mp: u32,
    /// Engine-integral heat sinks.
    pub heat_sinks: u32,
    /// Design quirks.
    pub quirks: Quirks,
    /// Board position; `None` until deployed.
    pub position: Option<HexCoord>,
    /// Leg facing.
    pub facing: u8,
    /// Torso facing.
    pub secondary_facing: u8,
    /// Per-location state, in chassis order.
    pub locations: Vec<LocationState>,
    /// Mounted items.
    pub equipment: Vec<Mounted>,
    /// Current heat.
    pub heat: u32,
    /// Heat gained this round, applied at End.
    pub heat_buildup: u32,
    /// Pilot.
    pub crew: Crew,
    /// Lying down.
    pub prone: bool,
    /// Reactor shut down.
    pub shut_down: bool,
    /// Lost this phase; becomes destroyed at the next phase reset.
    pub doomed: bool,
    /// Destroyed.
    pub destroyed: bool,
    /// Why it left play.
    pub removal: Option<Removal>,
    /// May still act this phase.
    pub ready: bool,
    /// Movement mode used this round.
    pub moved: MoveType,
    /// Hexes entered this round.
    pub hexes_moved: u32,
    /// Movement points spent this round, carried into a move resumed after a fall.
    #[serde(default)]
    pub mp_used: u32,
    /// Damage taken this phase.
    pub damage_this_phase: u32,
    /// Pending charge or death from above.
    pub displacement_attack: Option<DisplacementAttack>,
    /// Spent the turn searching for a club.
    pub finding_club: bool,
    /// Arms flipped to fire into the rear arc.
    pub arms_flipped: bool,
}

impl Entity {
    /// Build an entity from a unit definition.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown items, items placed in locations the
    /// chassis does not have, or locations without enough free slots.
    pub fn from_unit_data(id: EntityId, owner: PlayerId, unit: &UnitData) -> Result<Self> {
        let chassis = unit.layout;
        let mut locations: Vec<LocationState> = chassis
            .locations()
            .iter()
            .map(|&location| {
                let armor = unit.armor.iter().find(|a| a.location == location);
                let internal = if chassis == Chassis::Platoon {
                    unit.troopers.max(1)
                } else {
                    data::internal_structure(chassis, unit.tonnage, location)
                };
                LocationState {
                    location,
                    armor: Points::Remaining(armor.map_or(0, |a| a.front)),
                    rear_armor: (location.has_rear() && chassis != Chassis::Platoon)
                        .then(|| Points::Remaining(armor.map_or(0, |a| a.rear))),
                    internal: Points::Remaining(internal),
                    slots: data::system_layout(chassis, unit.engine, location)
                        .into_iter()
                        .map(|s| s.map(|system| CriticalSlot::new(SlotContent::System(system))))
                        .collect(),
                }
            })
            .collect();

        let mut equipment = Vec::with_capacity(unit.equipment.len());
        for mount in &unit.equipment {
            let kind = EquipmentType::parse(&mount.item)?;
            let Some(state) = locations.iter_mut().find(|l| l.location == mount.location) else {
                return Err(GameError::InvalidUnit(format!(
                    "{} has no location {}",
                    unit.display_name(),
                    mount.location
                )));
            };
            let index = equipment.len();
            let needed = kind.criticals();
            let free: Vec<usize> = state
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_none())
                .map(|(i, _)| i)
                .take(needed)
                .collect();
            if chassis != Chassis::Platoon && free.len() < needed {
                return Err(GameError::InvalidUnit(format!(
                    "{} has no room for {} in {}",
                    unit.display_name(),
                    mount.item,
                    mount.location
                )));
            }
            for slot in free {
                state.slots[slot] = Some(CriticalSlot::new(SlotContent::Equipment(index)));
            }
            let mut mounted = Mounted::new(kind, mount.location, mount.rear);
            if let Some(shots) = mount.shots {
                if matches!(mounted.kind, EquipmentType::Ammo { .. }) {
                    mounted.shots_left = shots;
                }
            }
            equipment.push(mounted);
        }

        let mut entity = Self {
            id,
            owner,
            chassis_name: unit.chassis.clone(),
            model: unit.model.clone(),
            class: unit.class,
            chassis,
            tonnage: unit.tonnage,
            walk_mp: unit.walk_mp,
            jump_mp: unit.jump_mp,
            heat_sinks: unit.heat_sinks,
            quirks: unit.quirks,
            position: None,
            facing: 0,
            secondary_facing: 0,
            locations,
            equipment,
            heat: 0,
            heat_buildup: 0,
            crew: Crew {
                name: unit.crew.name.clone(),
                gunnery: unit.crew.gunnery,
                piloting: unit.crew.piloting,
                hits: 0,
                unconscious: false,
                dead: false,
                knocked_out_this_round: false,
                rolls_needed: 0,
            },
            prone: false,
            shut_down: false,
            doomed: false,
            destroyed: false,
            removal: None,
            ready: false,
            moved: MoveType::None,
            hexes_moved: 0,
            mp_used: 0,
            damage_this_phase: 0,
            displacement_attack: None,
            finding_club: false,
            arms_flipped: false,
        };
        entity.reload_weapons();
        Ok(entity)
    }

    /// Display name, `"Chassis Model"`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.chassis_name, self.model)
    }

    /// Whether this is a mech.
    #[must_use]
    pub fn is_mech(&self) -> bool {
        self.class == UnitClass::Mech
    }

    /// Location state.
    #[must_use]
    pub fn location(&self, location: Location) -> Option<&LocationState> {
        self.locations.iter().find(|l| l.location == location)
    }

    /// Mutable location state.
    pub fn location_mut(&mut self, location: Location) -> Option<&mut LocationState> {
        self.locations.iter_mut().find(|l| l.location == location)
    }

    /// Internal structure of a location; destroyed for locations the chassis lacks.
    #[must_use]
    pub fn internal(&self, location: Location) -> Points {
        self.location(location).map_or(Points::Destroyed, |l| l.internal)
    }

    /// Armor of a location.
    #[must_use]
    pub fn armor(&self, location: Location, rear: bool) -> Points {
        self.location(location)
            .map_or(Points::Destroyed, |l| l.armor_for(rear))
    }

    /// Whether a location has been lost.
    #[must_use]
    pub fn is_location_destroyed(&self, location: Location) -> bool {
        self.internal(location).is_gone()
    }

    /// Remaining armor and structure over all locations.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.locations.iter().map(LocationState::total_points).sum()
    }

    /// Still fighting.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.destroyed && !self.doomed && !self.crew.dead && self.removal.is_none()
    }

    /// Active and on the board.
    #[must_use]
    pub fn is_targetable(&self) -> bool {
        self.is_active() && self.position.is_some()
    }

    /// Cannot move or dodge.
    #[must_use]
    pub const fn is_immobile(&self) -> bool {
        self.shut_down || self.crew.unconscious
    }

    /// Slots of a system that are hit, destroyed or missing.
    #[must_use]
    pub fn damaged_systems(&self, system: SystemKind, location: Option<Location>) -> u32 {
        self.locations
            .iter()
            .filter(|l| location.map_or(true, |loc| loc == l.location))
            .flat_map(|l| l.slots.iter().flatten())
            .filter(|s| s.content == SlotContent::System(system) && s.is_damaged())
            .count() as u32
    }

    /// Whether an undamaged slot of a system exists in a location.
    #[must_use]
    pub fn has_working_system(&self, system: SystemKind, location: Location) -> bool {
        self.location(location).map_or(false, |l| {
            l.slots
                .iter()
                .flatten()
                .any(|s| s.content == SlotContent::System(system) && !s.is_damaged())
        })
    }

    /// Damaged engine slots.
    #[must_use]
    pub fn engine_hits(&self) -> u32 {
        self.damaged_systems(SystemKind::Engine, None)
    }

    /// Damaged gyro slots.
    #[must_use]
    pub fn gyro_hits(&self) -> u32 {
        self.damaged_systems(SystemKind::Gyro, None)
    }

    /// Number of destroyed legs.
    #[must_use]
    pub fn destroyed_legs(&self) -> u32 {
        self.chassis
            .locations()
            .iter()
            .filter(|&&loc| self.chassis.is_leg(loc) && self.is_location_destroyed(loc))
            .count() as u32
    }

    /// Whether explosion containment protects a location.
    #[must_use]
    pub fn has_case(&self, location: Location) -> bool {
        self.equipment
            .iter()
            .any(|m| m.kind == EquipmentType::Case && m.location == location)
    }

    /// Whether a working targeting computer is mounted.
    #[must_use]
    pub fn has_targeting_computer(&self) -> bool {
        self.equipment
            .iter()
            .any(|m| m.kind == EquipmentType::TargetingComputer && m.is_working())
    }

    /// Whether the unit carries a working club.
    #[must_use]
    pub fn club(&self) -> Option<usize> {
        self.equipment
            .iter()
            .position(|m| matches!(m.kind, EquipmentType::Club(_)) && m.is_working())
    }

    /// Heat dissipated per round. Standing in water doubles sink capacity,
    /// up to 6 extra points.
    #[must_use]
    pub fn heat_capacity(&self, water_depth: u8) -> u32 {
        let extra = self
            .equipment
            .iter()
            .filter(|m| m.kind == EquipmentType::HeatSink && m.is_working())
            .count() as u32;
        let base = self.heat_sinks + extra;
        if water_depth > 0 && self.is_mech() {
            base + base.min(6)
        } else {
            base
        }
    }

    /// To-hit penalty from heat.
    #[must_use]
    pub const fn heat_firing_modifier(&self) -> i32 {
        match self.heat {
            0..=7 => 0,
            8..=12 => 1,
            13..=16 => 2,
            17..=23 => 3,
            _ => 4,
        }
    }

    /// Walking MP after heat and leg damage.
    #[must_use]
    pub fn current_walk_mp(&self) -> u32 {
        let actuators = self.damaged_systems(SystemKind::UpperLeg, None)
            + self.damaged_systems(SystemKind::LowerLeg, None)
            + self.damaged_systems(SystemKind::Foot, None);
        let mut mp = self
            .walk_mp
            .saturating_sub(self.heat / 5)
            .saturating_sub(actuators);
        match (self.chassis, self.destroyed_legs()) {
            (_, 0) => {}
            (Chassis::Quad, 1) => mp = mp.saturating_sub(1),
            (Chassis::Quad, 2) | (Chassis::Biped, 1) => mp = mp.min(1),
            _ => mp = 0,
        }
        mp
    }

    /// Running MP: one and a half times walking, unless hips or legs are gone.
    #[must_use]
    pub fn current_run_mp(&self) -> u32 {
        let walk = self.current_walk_mp();
        if self.damaged_systems(SystemKind::Hip, None) > 0 || self.destroyed_legs() > 0 {
            walk
        } else {
            (walk * 3).div_ceil(2)
        }
    }

    /// Jumping MP from working jump jets, capped at the design value.
    #[must_use]
    pub fn current_jump_mp(&self) -> u32 {
        let lost = self
            .equipment
            .iter()
            .filter(|m| m.kind == EquipmentType::JumpJet && !m.is_working())
            .count() as u32;
        self.jump_mp.saturating_sub(lost)
    }

    /// Levels occupied above the standing level.
    #[must_use]
    pub fn height(&self) -> i32 {
        if self.is_mech() && !self.prone {
            1
        } else {
            0
        }
    }

    /// Level this unit stands on in a hex. Mechs wade along the bottom.
    #[must_use]
    pub fn standing_level(&self, hex: &Hex) -> i32 {
        if self.is_mech() {
            hex.floor()
        } else {
            hex.surface()
        }
    }

    /// Line-of-sight endpoint for this unit's current position.
    #[must_use]
    pub fn los_endpoint(&self, board: &Board) -> Option<LosEndpoint> {
        let position = self.position?;
        let hex = board.hex(position)?;
        let bottom = self.standing_level(hex);
        Some(LosEndpoint {
            position,
            bottom,
            top: bottom + self.height(),
        })
    }

    /// Roll a hit location against this unit.
    pub fn roll_hit_location(&self, dice: &mut dyn Dice, table: HitTable, side: Side) -> HitData {
        if self.chassis == Chassis::Platoon {
            return HitData::new(Location::Troopers, false);
        }
        let rear = side == Side::Rear;
        match table {
            HitTable::Standard => {
                let roll = dice.roll_2d6();
                let location = standard_hit(side, roll);
                HitData {
                    location,
                    rear: rear && location.has_rear(),
                    through_armor_critical: roll == 2,
                }
            }
            HitTable::Punch => {
                let location = punch_hit(side, dice.d6());
                HitData::new(location, rear && location.has_rear())
            }
            HitTable::Kick => HitData::new(kick_hit(side, dice.d6()), false),
        }
    }

    /// Point weapons at their ammunition: keep a link that still has rounds,
    /// otherwise link the first working bin with rounds left.
    pub fn reload_weapons(&mut self) {
        for index in 0..self.equipment.len() {
            let Some(stats) = self.equipment[index].weapon() else {
                continue;
            };
            if !stats.has(WeaponTags::AMMO) {
                continue;
            }
            let current_ok = self.equipment[index]
                .linked_ammo
                .and_then(|a| self.equipment.get(a))
                .map_or(false, |a| a.is_working() && a.shots_left > 0);
            if current_ok {
                continue;
            }
            let next = self
                .equipment
                .iter()
                .position(|m| m.feeds(stats.id) && m.is_working() && m.shots_left > 0);
            self.equipment[index].linked_ammo = next;
        }
    }

    /// Clear per-round state.
    pub fn new_round(&mut self) {
        self.moved = MoveType::None;
        self.hexes_moved = 0;
        self.mp_used = 0;
        self.displacement_attack = None;
        self.finding_club = false;
        self.arms_flipped = false;
        self.secondary_facing = self.facing;
        self.crew.knocked_out_this_round = false;
        for mounted in &mut self.equipment {
            mounted.used_this_round = false;
        }
    }

    /// Settle damage taken during the phase that just ended.
    ///
    /// Hits become permanent, doomed locations and units are destroyed and
    /// weapons relink to ammunition. Returns `true` when the unit has left
    /// play and belongs on the inactive roster.
    pub fn new_phase(&mut self) -> bool {
        if self.doomed {
            self.doomed = false;
            self.destroyed = true;
        }
        for state in &mut self.locations {
            for points in [Some(&mut state.armor), state.rear_armor.as_mut(), Some(&mut state.internal)]
                .into_iter()
                .flatten()
            {
                if *points == Points::Doomed {
                    *points = Points::Destroyed;
                }
            }
            for slot in state.slots.iter_mut().flatten() {
                if slot.hit {
                    slot.hit = false;
                    slot.destroyed = true;
                }
            }
        }
        for mounted in &mut self.equipment {
            if mounted.hit {
                mounted.hit = false;
                mounted.destroyed = true;
            }
        }
        self.reload_weapons();
        self.damage_this_phase = 0;

        if self.removal.is_none() {
            if self.destroyed {
                self.removal = Some(Removal::Destroyed);
            } else if self.crew.dead {
                self.removal = Some(Removal::CrewKilled);
            }
        }
        self.removal.is_some()
    }

    /// One-line status for end-of-game reports.
    #[must_use]
    pub fn status_line(&self) -> String {
        let status = match self.removal {
            Some(Removal::Destroyed) => "destroyed",
            Some(Removal::CrewKilled) => "pilot killed",
            Some(Removal::Fled) => "withdrew",
            Some(Removal::PushedOff) => "forced off the field",
            None if self.destroyed || self.doomed => "destroyed",
            None => "operational",
        };
        let armor: u32 = self
            .locations
            .iter()
            .map(|l| l.armor.value() + l.rear_armor.map_or(0, Points::value))
            .sum();
        let internal: u32 = self.locations.iter().map(|l| l.internal.value()).sum();
        format!(
            "{} ({}): {status}, armor {armor}, structure {internal}, pilot hits {}",
            self.display_name(),
            self.crew.name,
            self.crew.hits
        )
    }
}

fn standard_hit(side: Side, roll: i32) -> Location {
    use Location::{CenterTorso, Head, LeftArm, LeftLeg, LeftTorso, RightArm, RightLeg, RightTorso};
    match side {
        Side::Front | Side::Rear => match roll {
            2 | 7 => CenterTorso,
            3 | 4 => RightArm,
            5 => RightLeg,
            6 => RightTorso,
            8 => LeftTorso,
            9 => LeftLeg,
            10 | 11 => LeftArm,
            _ => Head,
        },
        Side::Left => match roll {
            2 | 7 => LeftTorso,
            3 | 6 => LeftLeg,
            4 | 5 => LeftArm,
            8 => CenterTorso,
            9 => RightTorso,
            10 => RightArm,
            11 => RightLeg,
            _ => Head,
        },
        Side::Right => match roll {
            2 | 7 => RightTorso,
            3 | 6 => RightLeg,
            4 | 5 => RightArm,
            8 => CenterTorso,
            9 => LeftTorso,
            10 => LeftArm,
            11 => LeftLeg,
            _ => Head,
        },
    }
}

fn punch_hit(side: Side, roll: i32) -> Location {
    use Location::{CenterTorso, Head, LeftArm, LeftTorso, RightArm, RightTorso};
    match side {
        Side::Left => match roll {
            1 | 2 => LeftTorso,
            3 => CenterTorso,
            4 | 5 => LeftArm,
            _ => Head,
        },
        Side::Right => match roll {
            1 | 2 => RightTorso,
            3 => CenterTorso,
            4 | 5 => RightArm,
            _ => Head,
        },
        Side::Front | Side::Rear => match roll {
            1 => LeftArm,
            2 => LeftTorso,
            3 => CenterTorso,
            4 => RightTorso,
            5 => RightArm,
            _ => Head,
        },
    }
}

fn kick_hit(side: Side, roll: i32) -> Location {
    match side {
        Side::Left => Location::LeftLeg,
        Side::Right => Location::RightLeg,
        Side::Front | Side::Rear if roll <= 3 => Location::RightLeg,
        Side::Front | Side::Rear => Location::LeftLeg,
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Storage for all entities in play.
///
/// Uses a `HashMap` for O(1) lookup by ID, with deterministic iteration
/// via sorted keys whenever order matters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStorage {
    /// Map of entity ID to entity data.
    entities: HashMap<EntityId, Entity>,
    /// Next entity ID to assign.
    next_id: EntityId,
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Reserve the next ID.
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    /// Insert an entity under its own ID.
    pub fn insert(&mut self, entity: Entity) {
        self.next_id = self.next_id.max(entity.id + 1);
        self.entities.insert(entity.id, entity);
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in ID order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Entity> {
        let mut all: Vec<&Entity> = self.entities.values().collect();
        all.sort_unstable_by_key(|e| e.id);
        all
    }

    /// Entity standing in a hex, other than `except`.
    #[must_use]
    pub fn occupant(&self, position: HexCoord, except: Option<EntityId>) -> Option<EntityId> {
        self.sorted()
            .into_iter()
            .find(|e| e.position == Some(position) && Some(e.id) != except && e.is_active())
            .map(|e| e.id)
    }

    /// IDs owned by a player, sorted.
    #[must_use]
    pub fn owned_by(&self, player: PlayerId) -> Vec<EntityId> {
        self.sorted()
            .into_iter()
            .filter(|e| e.owner == player)
            .map(|e| e.id)
            .collect()
    }

    /// Remove every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
