//! Player intents and the per-phase action queue.
//!
//! Movement is executed as soon as it is declared. Everything else is
//! queued and resolved together when the phase ends, from a queue that is
//! frozen and pruned before the first action resolves.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::{Chassis, EntityId, EntityStorage, Location};
use crate::hex::HexCoord;

/// Which arm throws a punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arm {
    /// Left arm.
    Left,
    /// Right arm.
    Right,
    /// Both arms, resolved left then right.
    Both,
}

/// Which leg kicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    /// Left leg.
    Left,
    /// Right leg.
    Right,
}

impl Arm {
    /// Arm location used; `None` for [`Arm::Both`].
    #[must_use]
    pub const fn location(self) -> Option<Location> {
        match self {
            Arm::Left => Some(Location::LeftArm),
            Arm::Right => Some(Location::RightArm),
            Arm::Both => None,
        }
    }
}

impl Leg {
    /// Location that kicks. Quads kick with their front legs, which use the
    /// arm locations.
    #[must_use]
    pub const fn location(self, chassis: Chassis) -> Location {
        match (chassis, self) {
            (Chassis::Quad, Leg::Left) => Location::LeftArm,
            (Chassis::Quad, Leg::Right) => Location::RightArm,
            (_, Leg::Left) => Location::LeftLeg,
            (_, Leg::Right) => Location::RightLeg,
        }
    }
}

/// One step of a movement path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveStep {
    /// Enter the hex ahead.
    Forward,
    /// Back into the hex behind.
    Backward,
    /// Turn one hexside counter-clockwise.
    TurnLeft,
    /// Turn one hexside clockwise.
    TurnRight,
    /// Stand up from prone.
    GetUp,
    /// Leave the battlefield from an edge hex.
    Flee,
    /// Charge the unit in the hex ahead.
    Charge,
    /// Jump onto the unit in the hex ahead.
    DeathFromAbove,
}

/// A declared movement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementPath {
    /// Moving entity.
    pub entity: EntityId,
    /// Jump instead of walking or running.
    pub jump: bool,
    /// Steps in order.
    pub steps: Vec<MoveStep>,
}

impl MovementPath {
    /// A ground movement.
    #[must_use]
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            jump: false,
            steps: Vec::new(),
        }
    }

    /// Builder: jump.
    #[must_use]
    pub fn jumping(mut self) -> Self {
        self.jump = true;
        self
    }

    /// Builder: append a step.
    #[must_use]
    pub fn step(mut self, step: MoveStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Builder: append the same step `count` times.
    #[must_use]
    pub fn repeat(mut self, step: MoveStep, count: usize) -> Self {
        self.steps.extend(std::iter::repeat(step).take(count));
        self
    }
}

/// A declared action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Movement, executed immediately.
    Move(MovementPath),
    /// Fire a mounted weapon.
    WeaponAttack {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
        /// Index into the attacker's equipment.
        weapon: usize,
    },
    /// Punch.
    Punch {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
        /// Arm or arms used.
        arm: Arm,
    },
    /// Kick.
    Kick {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
        /// Leg used.
        leg: Leg,
    },
    /// Swing a carried club.
    Club {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
    },
    /// Shove the target one hex.
    Push {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
    },
    /// Charge declared during movement.
    Charge {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
        /// Where the target stood when the charge was declared.
        target_position: HexCoord,
    },
    /// Death from above declared during movement.
    DeathFromAbove {
        /// Attacker.
        entity: EntityId,
        /// Target.
        target: EntityId,
        /// Where the target stood when the attack was declared.
        target_position: HexCoord,
    },
    /// Twist the torso to a new facing.
    TorsoTwist {
        /// Entity.
        entity: EntityId,
        /// New secondary facing.
        facing: u8,
    },
    /// Flip the arms to fire into the rear arc.
    FlipArms {
        /// Entity.
        entity: EntityId,
        /// Flipped or not.
        flipped: bool,
    },
    /// Spend the physical turn tearing a club from a woods hex.
    FindClub {
        /// Entity.
        entity: EntityId,
    },
    /// Switch a weapon's firing mode.
    FireModeChange {
        /// Entity.
        entity: EntityId,
        /// Index into the entity's equipment.
        weapon: usize,
        /// Mode index.
        mode: usize,
    },
}

impl Action {
    /// Entity that declared the action.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        match self {
            Action::Move(path) => path.entity,
            Action::WeaponAttack { entity, .. }
            | Action::Punch { entity, .. }
            | Action::Kick { entity, .. }
            | Action::Club { entity, .. }
            | Action::Push { entity, .. }
            | Action::Charge { entity, .. }
            | Action::DeathFromAbove { entity, .. }
            | Action::TorsoTwist { entity, .. }
            | Action::FlipArms { entity, .. }
            | Action::FindClub { entity }
            | Action::FireModeChange { entity, .. } => *entity,
        }
    }

    /// Target entity, for attacks.
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        match self {
            Action::WeaponAttack { target, .. }
            | Action::Punch { target, .. }
            | Action::Kick { target, .. }
            | Action::Club { target, .. }
            | Action::Push { target, .. }
            | Action::Charge { target, .. }
            | Action::DeathFromAbove { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Attacks resolved in the physical phase, one per entity.
    #[must_use]
    pub fn is_physical(&self) -> bool {
        matches!(
            self,
            Action::Punch { .. }
                | Action::Kick { .. }
                | Action::Club { .. }
                | Action::Push { .. }
                | Action::Charge { .. }
                | Action::DeathFromAbove { .. }
                | Action::FindClub { .. }
        )
    }

    /// Attacks that move units and resolve after every other physical attack.
    #[must_use]
    pub fn is_displacement(&self) -> bool {
        matches!(
            self,
            Action::Push { .. } | Action::Charge { .. } | Action::DeathFromAbove { .. }
        )
    }
}

/// Actions waiting for the end of the phase.
///
/// Displacement attacks are held separately and appended after every
/// other declaration so that they resolve last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionQueue {
    attacks: Vec<Action>,
    displacements: Vec<Action>,
}

impl ActionQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action.
    pub fn push(&mut self, action: Action) {
        if action.is_displacement() {
            self.displacements.push(action);
        } else {
            self.attacks.push(action);
        }
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attacks.len() + self.displacements.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.attacks.clear();
        self.displacements.clear();
    }

    /// Whether an entity has already declared a physical attack this phase.
    #[must_use]
    pub fn has_physical(&self, entity: EntityId) -> bool {
        self.attacks
            .iter()
            .chain(&self.displacements)
            .any(|a| a.entity() == entity && a.is_physical())
    }

    /// Take the frozen list for resolution.
    ///
    /// Actions from entities that are no longer active are dropped, and only
    /// the first physical attack of each entity is kept. Displacement
    /// attacks come last.
    pub fn drain(&mut self, entities: &EntityStorage) -> Vec<Action> {
        let mut seen_physical = BTreeSet::new();
        let mut kept = Vec::with_capacity(self.len());
        for action in self.attacks.drain(..).chain(self.displacements.drain(..)) {
            let active = entities
                .get(action.entity())
                .map_or(false, |e| e.is_active());
            if !active {
                tracing::debug!(entity = action.entity(), "dropping action from inactive entity");
                continue;
            }
            if action.is_physical() && !seen_physical.insert(action.entity()) {
                tracing::debug!(entity = action.entity(), "dropping duplicate physical attack");
                continue;
            }
            kept.push(action);
        }
        kept
    }
}
