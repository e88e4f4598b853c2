//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::entity::{Chassis, EngineKind, Location, Quirks, UnitClass};

/// Armor values for one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmorData {
    /// Location armored.
    pub location: Location,
    /// Front armor points.
    pub front: u32,
    /// Rear armor points (torsos only).
    #[serde(default)]
    pub rear: u32,
}

/// A piece of equipment mounted in a location.
///
/// `item` is a weapon identifier (`"medium_laser"`), an ammunition bin
/// (`"ammo:lrm_20"`, `"ammo:lb_10x:cluster"`) or one of `"heat_sink"`,
/// `"case"`, `"targeting_computer"`, `"jump_jet"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountData {
    /// Equipment identifier.
    pub item: String,
    /// Location mounted in.
    pub location: Location,
    /// Fires into the rear arc.
    #[serde(default)]
    pub rear: bool,
    /// Shots override for ammunition bins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots: Option<u32>,
}

/// Pilot record of a unit definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewData {
    /// Pilot name.
    pub name: String,
    /// Gunnery skill (lower is better).
    pub gunnery: i32,
    /// Piloting skill (lower is better).
    pub piloting: i32,
}

impl Default for CrewData {
    fn default() -> Self {
        Self {
            name: "Unnamed".to_string(),
            gunnery: 4,
            piloting: 5,
        }
    }
}

/// Data-driven unit definition.
///
/// Sent by clients when adding a unit in the lounge, and loaded from RON
/// files by the tools.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     chassis: "Hunchback",
///     model: "HBK-4G",
///     tonnage: 50,
///     walk_mp: 4,
///     heat_sinks: 13,
///     armor: [(location: CenterTorso, front: 26, rear: 5)],
///     equipment: [
///         (item: "ac_20", location: RightTorso),
///         (item: "ammo:ac_20", location: LeftTorso),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Chassis name.
    pub chassis: String,
    /// Model designation.
    pub model: String,
    /// Target class.
    #[serde(default)]
    pub class: UnitClass,
    /// Body layout.
    #[serde(default)]
    pub layout: Chassis,
    /// Engine type.
    #[serde(default)]
    pub engine: EngineKind,
    /// Weight in tons.
    pub tonnage: u32,
    /// Walking movement points.
    pub walk_mp: u32,
    /// Jumping movement points.
    #[serde(default)]
    pub jump_mp: u32,
    /// Heat sinks integral to the engine.
    #[serde(default = "default_heat_sinks")]
    pub heat_sinks: u32,
    /// Troopers in a platoon; ignored for mechs.
    #[serde(default)]
    pub troopers: u32,
    /// Armor by location. Unlisted locations get no armor.
    #[serde(default)]
    pub armor: Vec<ArmorData>,
    /// Mounted equipment.
    #[serde(default)]
    pub equipment: Vec<MountData>,
    /// Pilot.
    #[serde(default)]
    pub crew: CrewData,
    /// Design quirks.
    #[serde(default)]
    pub quirks: Quirks,
}

/// Default engine heat sinks.
const fn default_heat_sinks() -> u32 {
    10
}

impl UnitData {
    /// A biped mech with no armor or equipment.
    #[must_use]
    pub fn mech(chassis: &str, model: &str, tonnage: u32, walk_mp: u32) -> Self {
        Self {
            chassis: chassis.to_string(),
            model: model.to_string(),
            class: UnitClass::Mech,
            layout: Chassis::Biped,
            engine: EngineKind::Standard,
            tonnage,
            walk_mp,
            jump_mp: 0,
            heat_sinks: default_heat_sinks(),
            troopers: 0,
            armor: Vec::new(),
            equipment: Vec::new(),
            crew: CrewData::default(),
            quirks: Quirks::default(),
        }
    }

    /// A conventional infantry platoon.
    #[must_use]
    pub fn platoon(name: &str, troopers: u32, walk_mp: u32) -> Self {
        Self {
            class: UnitClass::Infantry,
            layout: Chassis::Platoon,
            troopers,
            heat_sinks: 0,
            ..Self::mech(name, "Platoon", 3, walk_mp)
        }
    }

    /// Builder: set armor on a location.
    #[must_use]
    pub fn with_armor(mut self, location: Location, front: u32, rear: u32) -> Self {
        self.armor.retain(|a| a.location != location);
        self.armor.push(ArmorData {
            location,
            front,
            rear,
        });
        self
    }

    /// Builder: mount an item.
    #[must_use]
    pub fn with_item(mut self, item: &str, location: Location) -> Self {
        self.equipment.push(MountData {
            item: item.to_string(),
            location,
            rear: false,
            shots: None,
        });
        self
    }

    /// Builder: mount an item firing to the rear.
    #[must_use]
    pub fn with_rear_item(mut self, item: &str, location: Location) -> Self {
        self.equipment.push(MountData {
            item: item.to_string(),
            location,
            rear: true,
            shots: None,
        });
        self
    }

    /// Builder: set pilot skills.
    #[must_use]
    pub fn with_crew(mut self, name: &str, gunnery: i32, piloting: i32) -> Self {
        self.crew = CrewData {
            name: name.to_string(),
            gunnery,
            piloting,
        };
        self
    }

    /// Builder: set jump movement.
    #[must_use]
    pub const fn with_jump(mut self, jump_mp: u32) -> Self {
        self.jump_mp = jump_mp;
        self
    }

    /// Builder: set the engine type.
    #[must_use]
    pub const fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// Builder: switch to a four-legged layout.
    #[must_use]
    pub const fn quad(mut self) -> Self {
        self.layout = Chassis::Quad;
        self
    }

    /// Builder: set quirks.
    #[must_use]
    pub const fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// Display name, `"Chassis Model"`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.chassis, self.model)
    }
}
