//! Chassis construction tables: internal structure and critical slot layout.

use crate::entity::{Chassis, EngineKind, Location, SystemKind};

/// Internal structure by tonnage: `(tonnage, center torso, side torso, arm, leg)`.
const INTERNAL_STRUCTURE: [(u32, u32, u32, u32, u32); 17] = [
    (20, 6, 5, 3, 4),
    (25, 8, 6, 4, 6),
    (30, 10, 7, 5, 7),
    (35, 11, 8, 6, 8),
    (40, 12, 10, 6, 10),
    (45, 14, 11, 7, 11),
    (50, 16, 12, 8, 12),
    (55, 18, 13, 9, 13),
    (60, 20, 14, 10, 14),
    (65, 21, 15, 10, 15),
    (70, 22, 15, 11, 15),
    (75, 23, 16, 12, 16),
    (80, 25, 17, 13, 17),
    (85, 27, 18, 14, 18),
    (90, 29, 19, 15, 19),
    (95, 30, 20, 16, 20),
    (100, 31, 21, 17, 21),
];

/// Head structure is the same for every tonnage.
const HEAD_STRUCTURE: u32 = 3;

/// Internal structure points of a mech location.
///
/// Tonnage is clamped to the table and rounded down to a multiple of 5.
/// Quad front legs use the leg value.
#[must_use]
pub fn internal_structure(chassis: Chassis, tonnage: u32, location: Location) -> u32 {
    let tonnage = tonnage.clamp(20, 100) / 5 * 5;
    let Some(&(_, ct, side, arm, leg)) = INTERNAL_STRUCTURE.iter().find(|row| row.0 == tonnage)
    else {
        return 0;
    };
    match location {
        Location::Head => HEAD_STRUCTURE,
        Location::CenterTorso => ct,
        Location::LeftTorso | Location::RightTorso => side,
        Location::LeftArm | Location::RightArm if chassis == Chassis::Quad => leg,
        Location::LeftArm | Location::RightArm => arm,
        Location::LeftLeg | Location::RightLeg => leg,
        Location::Troopers => 0,
    }
}

/// Maximum armor a location can mount.
#[must_use]
pub fn max_armor(chassis: Chassis, tonnage: u32, location: Location) -> u32 {
    match location {
        Location::Head => 9,
        other => internal_structure(chassis, tonnage, other) * 2,
    }
}

/// Number of critical slots in a location.
#[must_use]
pub fn slot_count(chassis: Chassis, location: Location) -> usize {
    match (chassis, location) {
        (Chassis::Platoon, _) | (_, Location::Troopers) => 0,
        (_, Location::Head) => 6,
        (Chassis::Quad, Location::LeftArm | Location::RightArm) => 6,
        (_, Location::LeftLeg | Location::RightLeg) => 6,
        _ => 12,
    }
}

/// Fixed system slots of a location; `None` marks a slot free for equipment.
#[must_use]
pub fn system_layout(chassis: Chassis, engine: EngineKind, location: Location) -> Vec<Option<SystemKind>> {
    let mut slots = vec![None; slot_count(chassis, location)];
    let fixed: &[SystemKind] = match (chassis, location) {
        (Chassis::Platoon, _) | (_, Location::Troopers) => &[],
        (_, Location::Head) => &[
            SystemKind::LifeSupport,
            SystemKind::Sensors,
            SystemKind::Cockpit,
        ],
        (_, Location::CenterTorso) => &[
            SystemKind::Engine,
            SystemKind::Engine,
            SystemKind::Engine,
            SystemKind::Gyro,
            SystemKind::Gyro,
            SystemKind::Gyro,
            SystemKind::Gyro,
            SystemKind::Engine,
            SystemKind::Engine,
            SystemKind::Engine,
        ],
        (_, Location::LeftTorso | Location::RightTorso) => match engine {
            EngineKind::Standard => &[],
            EngineKind::Xl => &[SystemKind::Engine, SystemKind::Engine, SystemKind::Engine],
        },
        (Chassis::Biped, Location::LeftArm | Location::RightArm) => &[
            SystemKind::Shoulder,
            SystemKind::UpperArm,
            SystemKind::LowerArm,
            SystemKind::Hand,
        ],
        _ => &[
            SystemKind::Hip,
            SystemKind::UpperLeg,
            SystemKind::LowerLeg,
            SystemKind::Foot,
        ],
    };
    for (slot, system) in slots.iter_mut().zip(fixed) {
        *slot = Some(*system);
    }
    // The head's fifth and sixth slots mirror the first two.
    if location == Location::Head && slots.len() == 6 {
        slots[4] = Some(SystemKind::Sensors);
        slots[5] = Some(SystemKind::LifeSupport);
    }
    slots
}
