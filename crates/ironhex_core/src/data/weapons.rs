//! Weapon statistics keyed by identifier.
//!
//! Weapons are not types: every weapon is a row in [`WEAPONS`] and the
//! resolution code asks capability questions through [`WeaponTags`].

use bitflags::bitflags;

bitflags! {
    /// Behavioral tags consumed by attack resolution.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WeaponTags: u16 {
        /// Consumes ammunition from a linked bin.
        const AMMO = 1 << 0;
        /// Can fire cluster munitions rolled on the cluster table.
        const CLUSTER = 1 << 1;
        /// Infantry-carried weapon; no point-blank penalty.
        const INFANTRY = 1 << 2;
        /// Fires once per battle.
        const ONE_SHOT = 1 << 3;
        /// Energy weapon.
        const ENERGY = 1 << 4;
        /// Direct-fire weapon, eligible for targeting computer bonus.
        const DIRECT_FIRE = 1 << 5;
        /// Missile rack rolled on the cluster table.
        const MISSILE = 1 << 6;
        /// Fires only on a lock: a miss spends no heat or ammo.
        const STREAK = 1 << 7;
        /// May fire twice per turn and jam.
        const RAPID_FIRE = 1 << 8;
        /// Sets targets on fire, adding heat.
        const FLAMER = 1 << 9;
    }
}

/// How a weapon deals damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponDamage {
    /// One hit of fixed damage.
    Direct(u32),
    /// A rack of missiles. Hits are rolled on the cluster table and grouped.
    Missile {
        /// Damage per missile.
        per_missile: u32,
        /// Missiles per salvo.
        rack: u32,
        /// Missiles striking the same location.
        group: u32,
    },
}

/// Range brackets in hexes. A shot beyond `long` cannot be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeBands {
    /// Minimum range; 0 when none.
    pub minimum: u32,
    /// Short range upper bound.
    pub short: u32,
    /// Medium range upper bound.
    pub medium: u32,
    /// Long range upper bound.
    pub long: u32,
}

/// Range bracket of a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBracket {
    /// Short range.
    Short,
    /// Medium range.
    Medium,
    /// Long range.
    Long,
    /// Beyond long range.
    Out,
}

impl RangeBands {
    /// Bracket for a distance.
    #[must_use]
    pub const fn bracket(&self, distance: u32) -> RangeBracket {
        if distance <= self.short {
            RangeBracket::Short
        } else if distance <= self.medium {
            RangeBracket::Medium
        } else if distance <= self.long {
            RangeBracket::Long
        } else {
            RangeBracket::Out
        }
    }
}

/// Static statistics of a weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponType {
    /// Identifier used in unit definitions.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Heat generated per shot.
    pub heat: u32,
    /// Damage model.
    pub damage: WeaponDamage,
    /// Range brackets.
    pub ranges: RangeBands,
    /// Weapon-specific to-hit modifier.
    pub to_hit_modifier: i32,
    /// Shots per ton of ammunition; 0 for weapons without ammo.
    pub ammo_per_ton: u32,
    /// Critical slots occupied.
    pub criticals: u32,
    /// Behavioral tags.
    pub tags: WeaponTags,
}

impl WeaponType {
    /// Whether the weapon carries a tag.
    #[must_use]
    pub const fn has(&self, tag: WeaponTags) -> bool {
        self.tags.contains(tag)
    }

    /// Damage dealt by one round of ammunition, used for explosions.
    #[must_use]
    pub const fn damage_per_shot(&self) -> u32 {
        match self.damage {
            WeaponDamage::Direct(damage) => damage,
            WeaponDamage::Missile {
                per_missile, rack, ..
            } => per_missile * rack,
        }
    }

    /// Firing modes; weapons without modes have a single unnamed mode.
    #[must_use]
    pub const fn modes(&self) -> &'static [&'static str] {
        if self.tags.contains(WeaponTags::RAPID_FIRE) {
            &["single", "double"]
        } else {
            &[]
        }
    }
}

const fn bands(minimum: u32, short: u32, medium: u32, long: u32) -> RangeBands {
    RangeBands {
        minimum,
        short,
        medium,
        long,
    }
}

const ENERGY_DIRECT: WeaponTags = WeaponTags::ENERGY.union(WeaponTags::DIRECT_FIRE);
const BALLISTIC: WeaponTags = WeaponTags::AMMO.union(WeaponTags::DIRECT_FIRE);
const MISSILE: WeaponTags = WeaponTags::AMMO.union(WeaponTags::MISSILE);

const fn weapon(
    id: &'static str,
    name: &'static str,
    heat: u32,
    damage: WeaponDamage,
    ranges: RangeBands,
    ammo_per_ton: u32,
    criticals: u32,
    tags: WeaponTags,
) -> WeaponType {
    WeaponType {
        id,
        name,
        heat,
        damage,
        ranges,
        to_hit_modifier: 0,
        ammo_per_ton,
        criticals,
        tags,
    }
}

const fn srm(id: &'static str, name: &'static str, heat: u32, rack: u32, shots: u32) -> WeaponType {
    weapon(
        id,
        name,
        heat,
        WeaponDamage::Missile {
            per_missile: 2,
            rack,
            group: 1,
        },
        bands(0, 3, 6, 9),
        shots,
        rack.div_ceil(4),
        MISSILE,
    )
}

const fn lrm(id: &'static str, name: &'static str, heat: u32, rack: u32, shots: u32) -> WeaponType {
    weapon(
        id,
        name,
        heat,
        WeaponDamage::Missile {
            per_missile: 1,
            rack,
            group: 5,
        },
        bands(6, 7, 14, 21),
        shots,
        rack.div_ceil(5),
        MISSILE,
    )
}

/// Every known weapon.
pub static WEAPONS: &[WeaponType] = &[
    weapon("small_laser", "Small Laser", 1, WeaponDamage::Direct(3), bands(0, 1, 2, 3), 0, 1, ENERGY_DIRECT),
    weapon("medium_laser", "Medium Laser", 3, WeaponDamage::Direct(5), bands(0, 3, 6, 9), 0, 1, ENERGY_DIRECT),
    weapon("large_laser", "Large Laser", 8, WeaponDamage::Direct(8), bands(0, 5, 10, 15), 0, 2, ENERGY_DIRECT),
    weapon("ppc", "PPC", 10, WeaponDamage::Direct(10), bands(3, 6, 12, 18), 0, 3, ENERGY_DIRECT),
    weapon(
        "flamer",
        "Flamer",
        3,
        WeaponDamage::Direct(2),
        bands(0, 1, 2, 3),
        0,
        1,
        ENERGY_DIRECT.union(WeaponTags::FLAMER),
    ),
    weapon("machine_gun", "Machine Gun", 0, WeaponDamage::Direct(2), bands(0, 1, 2, 3), 200, 1, BALLISTIC),
    weapon("ac_2", "AC/2", 1, WeaponDamage::Direct(2), bands(4, 8, 16, 24), 45, 1, BALLISTIC),
    weapon("ac_5", "AC/5", 1, WeaponDamage::Direct(5), bands(3, 6, 12, 18), 20, 4, BALLISTIC),
    weapon("ac_10", "AC/10", 3, WeaponDamage::Direct(10), bands(0, 5, 10, 15), 10, 7, BALLISTIC),
    weapon("ac_20", "AC/20", 7, WeaponDamage::Direct(20), bands(0, 3, 6, 9), 5, 10, BALLISTIC),
    weapon(
        "lb_10x",
        "LB 10-X AC",
        2,
        WeaponDamage::Direct(10),
        bands(0, 6, 12, 18),
        10,
        6,
        BALLISTIC.union(WeaponTags::CLUSTER),
    ),
    weapon(
        "ultra_ac_5",
        "Ultra AC/5",
        1,
        WeaponDamage::Direct(5),
        bands(2, 6, 13, 20),
        20,
        5,
        BALLISTIC.union(WeaponTags::RAPID_FIRE),
    ),
    srm("srm_2", "SRM 2", 2, 2, 50),
    srm("srm_4", "SRM 4", 3, 4, 25),
    srm("srm_6", "SRM 6", 4, 6, 15),
    weapon(
        "streak_srm_2",
        "Streak SRM 2",
        2,
        WeaponDamage::Missile {
            per_missile: 2,
            rack: 2,
            group: 1,
        },
        bands(0, 3, 6, 9),
        50,
        1,
        MISSILE.union(WeaponTags::STREAK),
    ),
    lrm("lrm_5", "LRM 5", 2, 5, 24),
    lrm("lrm_10", "LRM 10", 4, 10, 12),
    lrm("lrm_15", "LRM 15", 5, 15, 8),
    lrm("lrm_20", "LRM 20", 6, 20, 6),
    weapon(
        "lrm_20_os",
        "LRM 20 (OS)",
        6,
        WeaponDamage::Missile {
            per_missile: 1,
            rack: 20,
            group: 5,
        },
        bands(6, 7, 14, 21),
        0,
        5,
        WeaponTags::MISSILE.union(WeaponTags::ONE_SHOT),
    ),
    weapon(
        "infantry_laser_rifle",
        "Laser Rifle",
        0,
        WeaponDamage::Direct(2),
        bands(0, 1, 2, 3),
        0,
        0,
        WeaponTags::INFANTRY
            .union(WeaponTags::ENERGY)
            .union(WeaponTags::DIRECT_FIRE),
    ),
];

/// Look up a weapon by identifier.
#[must_use]
pub fn weapon_type(id: &str) -> Option<&'static WeaponType> {
    WEAPONS.iter().find(|w| w.id == id)
}

/// Number of missiles (or cluster submunitions) that hit, from a 2d6 roll.
///
/// Rows are the standard cluster hits table; unusual rack sizes scale the
/// 20-rack column.
#[must_use]
pub fn cluster_hits(rack: u32, roll: i32) -> u32 {
    const COLUMNS: [(u32, [u32; 11]); 8] = [
        (2, [1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2]),
        (3, [1, 1, 1, 2, 2, 2, 2, 2, 2, 3, 3]),
        (4, [1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4]),
        (5, [1, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5]),
        (6, [2, 2, 3, 3, 4, 4, 4, 5, 5, 6, 6]),
        (10, [3, 3, 4, 6, 6, 6, 6, 8, 8, 10, 10]),
        (15, [5, 5, 6, 9, 9, 9, 9, 12, 12, 15, 15]),
        (20, [6, 6, 9, 12, 12, 12, 12, 16, 16, 20, 20]),
    ];
    if rack <= 1 {
        return rack;
    }
    let row = (roll.clamp(2, 12) - 2) as usize;
    match COLUMNS.iter().find(|(size, _)| *size == rack) {
        Some((_, hits)) => hits[row],
        None => (rack * COLUMNS[7].1[row]).div_ceil(20).max(1),
    }
}
