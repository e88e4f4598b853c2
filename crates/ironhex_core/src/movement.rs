//! Movement.
//!
//! A declared [`MovementPath`] is first compiled against the board without
//! touching any state: every step is costed and checked, and an illegal path
//! is rejected whole. The compiled path is then executed step by step, which
//! is where piloting checks for rubble, water and standing up are rolled. A
//! failed check drops the unit where it stands and ends the move.

use crate::action::{Action, MoveStep, MovementPath};
use crate::board::{Board, Hex};
use crate::combat::Battle;
use crate::entity::{
    DisplacementAttack, DisplacementKind, Entity, EntityId, EntityStorage, MoveType, Removal,
    SystemKind,
};
use crate::error::{GameError, Result};
use crate::hex::{rotate, HexCoord};
use crate::options::GameOptions;
use crate::piloting::{base_piloting_roll, PilotingRequest};

/// Movement points spent standing up.
pub const GET_UP_COST: u32 = 2;

/// What a single compiled step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Change facing.
    Turn,
    /// Enter a hex.
    Enter,
    /// Stand up.
    GetUp,
    /// Leave the board.
    Flee,
    /// Declare a charge or death from above on the unit ahead.
    Attack(DisplacementKind, EntityId),
}

/// A step with its resulting position and the movement points spent so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathNode {
    /// What the step does.
    pub action: StepAction,
    /// Position after the step.
    pub position: HexCoord,
    /// Facing after the step.
    pub facing: u8,
    /// Total movement points spent including this step.
    pub mp_used: u32,
}

/// A checked movement path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    /// Moving entity.
    pub entity: EntityId,
    /// Steps in order.
    pub nodes: Vec<PathNode>,
    /// Movement mode the path needs.
    pub move_type: MoveType,
    /// Movement points spent.
    pub mp_used: u32,
    /// Hexes entered.
    pub hexes: u32,
}

impl CompiledPath {
    /// Final position.
    #[must_use]
    pub fn end(&self) -> Option<HexCoord> {
        self.nodes.last().map(|n| n.position)
    }
}

/// Heat generated by a movement mode.
#[must_use]
pub fn movement_heat(move_type: MoveType, hexes: u32) -> u32 {
    match move_type {
        MoveType::None | MoveType::Skid => 0,
        MoveType::Walk => 1,
        MoveType::Run => 2,
        MoveType::Sprint => 3,
        MoveType::Jump => hexes.max(3),
    }
}

/// Piloting modifier for wading into water.
#[must_use]
pub const fn water_modifier(depth: u8) -> i32 {
    match depth {
        0 | 1 => -1,
        2 => 0,
        _ => 1,
    }
}

/// Extra movement points for terrain when walking into a hex.
fn terrain_cost(entity: &Entity, hex: &Hex) -> u32 {
    let mut cost = u32::from(hex.foliage());
    if hex.rubble > 0 {
        cost += 1;
    }
    if entity.is_mech() {
        cost += match hex.water {
            0 => 0,
            1 => 1,
            _ => 3,
        };
    }
    cost
}

fn invalid(reason: impl Into<String>) -> GameError {
    GameError::InvalidAction(reason.into())
}

fn enemy_at(
    entities: &EntityStorage,
    options: &GameOptions,
    mover: &Entity,
    position: HexCoord,
) -> Option<EntityId> {
    let occupant = entities.get(entities.occupant(position, Some(mover.id))?)?;
    (occupant.owner != mover.owner || options.friendly_fire).then_some(occupant.id)
}

/// Check and cost a movement path without changing anything.
///
/// # Errors
///
/// Returns [`GameError::InvalidAction`] if any step is illegal or the path
/// needs more movement points than the unit has.
pub fn compile_path(
    board: &Board,
    options: &GameOptions,
    entities: &EntityStorage,
    path: &MovementPath,
) -> Result<CompiledPath> {
    let entity = entities
        .get(path.entity)
        .ok_or(GameError::EntityNotFound(path.entity))?;
    let start = entity
        .position
        .ok_or_else(|| invalid("unit is not deployed"))?;
    if !entity.is_active() {
        return Err(invalid("unit is out of play"));
    }
    if entity.is_immobile() && !path.steps.is_empty() {
        return Err(invalid("unit cannot move"));
    }
    if path.jump && entity.current_jump_mp() == 0 {
        return Err(invalid("unit has no jump jets"));
    }
    if path.jump && entity.prone {
        return Err(invalid("can't jump while prone"));
    }
    let start_level = board.hex(start).map_or(0, |h| entity.standing_level(h));

    let mut nodes = Vec::with_capacity(path.steps.len());
    let (mut position, mut facing) = (start, entity.facing);
    let mut prone = entity.prone;
    let (mut mp, mut hexes) = (entity.mp_used, 0u32);
    let mut backward = false;

    for (index, &step) in path.steps.iter().enumerate() {
        let last = index + 1 == path.steps.len();
        let action = match step {
            MoveStep::TurnLeft | MoveStep::TurnRight => {
                let turn = if step == MoveStep::TurnLeft { 5 } else { 1 };
                facing = rotate(facing, turn);
                if !path.jump {
                    mp += 1;
                }
                StepAction::Turn
            }
            MoveStep::GetUp => {
                if !prone {
                    return Err(invalid("unit is not prone"));
                }
                prone = false;
                mp += GET_UP_COST;
                StepAction::GetUp
            }
            MoveStep::Forward | MoveStep::Backward => {
                if prone {
                    return Err(invalid("unit must stand before moving"));
                }
                let direction = if step == MoveStep::Forward {
                    facing
                } else {
                    backward = true;
                    rotate(facing, 3)
                };
                let next = position.translated(direction);
                let (Some(from), Some(to)) = (board.hex(position), board.hex(next)) else {
                    return Err(invalid(format!("hex {next} is off the board")));
                };
                if enemy_at(entities, options, entity, next).is_some() {
                    return Err(invalid(format!("hex {next} is held by an enemy")));
                }
                if path.jump {
                    let rise = entity.standing_level(to) - start_level;
                    if rise > entity.current_jump_mp() as i32 {
                        return Err(invalid(format!("hex {next} is too high to jump to")));
                    }
                    mp += 1;
                } else {
                    if !entity.is_mech() && to.water > 0 {
                        return Err(invalid(format!("hex {next} is water")));
                    }
                    let change = entity.standing_level(to) - entity.standing_level(from);
                    let limit = if entity.is_mech() { 2 } else { 1 };
                    if change.abs() > limit {
                        return Err(invalid(format!("hex {next} is too steep")));
                    }
                    mp += 1 + terrain_cost(entity, to) + change.unsigned_abs();
                }
                position = next;
                hexes += 1;
                StepAction::Enter
            }
            MoveStep::Flee => {
                if !last {
                    return Err(invalid("fleeing must end the move"));
                }
                if !board.is_edge(position) {
                    return Err(invalid("can only flee from an edge hex"));
                }
                if prone {
                    return Err(invalid("can't flee while prone"));
                }
                StepAction::Flee
            }
            MoveStep::Charge | MoveStep::DeathFromAbove => {
                if !last {
                    return Err(invalid("an attack must end the move"));
                }
                let kind = if step == MoveStep::Charge {
                    if path.jump {
                        return Err(invalid("can't charge while jumping"));
                    }
                    DisplacementKind::Charge
                } else {
                    if !path.jump {
                        return Err(invalid("death from above requires a jump"));
                    }
                    DisplacementKind::DeathFromAbove
                };
                let ahead = position.translated(facing);
                let target = enemy_at(entities, options, entity, ahead)
                    .ok_or_else(|| invalid("no enemy in the hex ahead"))?;
                if let (false, Some(to)) = (path.jump, board.hex(ahead)) {
                    mp += 1 + terrain_cost(entity, to);
                } else {
                    mp += 1;
                }
                StepAction::Attack(kind, target)
            }
        };
        nodes.push(PathNode {
            action,
            position,
            facing,
            mp_used: mp,
        });
    }

    if position != start && entities.occupant(position, Some(entity.id)).is_some() {
        return Err(invalid(format!("hex {position} is already occupied")));
    }

    let walk = entity.current_walk_mp();
    let move_type = if path.jump {
        if mp > entity.current_jump_mp() {
            return Err(invalid("not enough jump MP"));
        }
        MoveType::Jump
    } else if mp == 0 {
        MoveType::None
    } else if mp <= walk {
        MoveType::Walk
    } else if backward {
        return Err(invalid("can't run backwards"));
    } else if mp <= entity.current_run_mp() {
        MoveType::Run
    } else if options.tactical_sprint && mp <= walk * 2 {
        MoveType::Sprint
    } else {
        return Err(invalid("not enough MP"));
    };
    if move_type == MoveType::Sprint
        && nodes
            .iter()
            .any(|n| matches!(n.action, StepAction::Attack(..)))
    {
        return Err(invalid("can't charge while sprinting"));
    }

    Ok(CompiledPath {
        entity: entity.id,
        nodes,
        move_type,
        mp_used: mp,
        hexes,
    })
}

/// Result of executing a movement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Charge or death from above to queue for the physical phase.
    pub attack: Option<Action>,
    /// The unit fell with movement points left and gets another turn.
    pub fell_with_mp_left: bool,
}

impl Battle<'_> {
    /// Compile and execute a movement path.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving every unit untouched, when the path is
    /// illegal.
    pub fn execute_move(&mut self, path: &MovementPath) -> Result<MoveOutcome> {
        let compiled = compile_path(self.board, self.options, self.entities, path)?;
        let id = compiled.entity;
        let mut outcome = MoveOutcome::default();
        let mut fell_at = None;
        let mut hexes = 0;

        for node in &compiled.nodes {
            let Some(entity) = self.entities.get_mut(id) else {
                return Err(GameError::EntityNotFound(id));
            };
            let name = entity.display_name();
            entity.facing = node.facing;
            entity.secondary_facing = node.facing;
            match node.action {
                StepAction::Turn => {}
                StepAction::GetUp => {
                    entity.heat_buildup += 1;
                    self.report.push(format!("\n{name} attempts to get up."));
                    let roll = base_piloting_roll(entity);
                    if self.skill_check_in_place(id, &roll) {
                        if let Some(entity) = self.entities.get_mut(id) {
                            entity.prone = false;
                        }
                    } else {
                        fell_at = Some(node.mp_used);
                        break;
                    }
                }
                StepAction::Enter => {
                    entity.position = Some(node.position);
                    hexes += 1;
                    if !compiled_jump(&compiled) && !self.entry_checks(id, node.position) {
                        fell_at = Some(node.mp_used);
                        break;
                    }
                }
                StepAction::Flee => {
                    entity.removal = Some(Removal::Fled);
                    entity.position = None;
                    self.report
                        .push(format!("\n{name} flees the battlefield.\n"));
                    tracing::info!(entity = id, "unit fled");
                }
                StepAction::Attack(kind, target) => {
                    let target_position = node.position.translated(node.facing);
                    entity.displacement_attack = Some(DisplacementAttack {
                        kind,
                        target,
                        target_position,
                    });
                    outcome.attack = Some(match kind {
                        DisplacementKind::Charge => Action::Charge {
                            entity: id,
                            target,
                            target_position,
                        },
                        DisplacementKind::DeathFromAbove => Action::DeathFromAbove {
                            entity: id,
                            target,
                            target_position,
                        },
                    });
                }
            }
        }

        let Some(entity) = self.entities.get_mut(id) else {
            return Err(GameError::EntityNotFound(id));
        };
        let move_type = match (fell_at, compiled.move_type) {
            (Some(_), MoveType::Run | MoveType::Sprint) => MoveType::Skid,
            (_, move_type) => move_type,
        };
        entity.moved = move_type;
        entity.hexes_moved += hexes;
        entity.mp_used = fell_at.unwrap_or(compiled.mp_used);
        entity.heat_buildup += movement_heat(compiled.move_type, compiled.hexes);
        if fell_at.is_some() {
            entity.displacement_attack = None;
            outcome.attack = None;
            outcome.fell_with_mp_left =
                entity.is_active() && entity.mp_used < entity.current_run_mp();
        }

        if fell_at.is_none() && entity.is_active() && entity.position.is_some() {
            let damaged_hip_or_gyro = entity.damaged_systems(SystemKind::Hip, None) > 0
                || entity.gyro_hits() > 0;
            if compiled.move_type == MoveType::Run && damaged_hip_or_gyro {
                self.piloting.push(PilotingRequest::new(
                    id,
                    0,
                    "running with damaged hip/gyro",
                ));
            }
            let damaged_legs = entity.gyro_hits() > 0
                || entity.destroyed_legs() > 0
                || [SystemKind::Hip, SystemKind::UpperLeg, SystemKind::LowerLeg, SystemKind::Foot]
                    .into_iter()
                    .any(|s| entity.damaged_systems(s, None) > 0);
            if compiled.move_type == MoveType::Jump && compiled.hexes > 0 && damaged_legs {
                self.piloting.push(PilotingRequest::new(
                    id,
                    0,
                    "landing with damaged leg actuator or gyro",
                ));
            }
        }
        tracing::debug!(entity = id, ?move_type, hexes, "movement executed");
        Ok(outcome)
    }

    /// Rubble and water checks on entering a hex. Returns false if the unit
    /// fell.
    fn entry_checks(&mut self, id: EntityId, position: HexCoord) -> bool {
        let Some(hex) = self.board.hex(position).copied() else {
            return true;
        };
        let Some(entity) = self.entities.get(id) else {
            return true;
        };
        if !entity.is_mech() {
            return true;
        }
        if hex.rubble > 0 {
            let mut roll = base_piloting_roll(entity);
            roll.add(0, "entering Rubble");
            if !self.skill_check_in_place(id, &roll) {
                return false;
            }
        }
        if hex.water > 0 {
            let Some(entity) = self.entities.get(id) else {
                return true;
            };
            let mut roll = base_piloting_roll(entity);
            roll.add(water_modifier(hex.water), format!("entering Depth {} Water", hex.water));
            if !self.skill_check_in_place(id, &roll) {
                return false;
            }
        }
        true
    }
}

fn compiled_jump(path: &CompiledPath) -> bool {
    path.move_type == MoveType::Jump
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::test_support::{centurion, Fixture};
    use crate::dice::ScriptedDice;

    const HERE: HexCoord = HexCoord::new(5, 8);

    fn walk(steps: usize) -> MovementPath {
        MovementPath::new(1).repeat(MoveStep::Forward, steps)
    }

    fn fixture(dice: ScriptedDice) -> Fixture {
        Fixture::new(dice).with(centurion(1, 1, HERE, 0))
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    #[test]
    fn test_walk_and_run_thresholds() {
        let f = fixture(ScriptedDice::new([]));
        let compile = |p: &MovementPath| compile_path(&f.board, &f.options, &f.entities, p);
        assert_eq!(compile(&walk(4)).unwrap().move_type, MoveType::Walk);
        assert_eq!(compile(&walk(6)).unwrap().move_type, MoveType::Run);
        assert!(compile(&walk(7)).is_err());
        assert_eq!(compile(&MovementPath::new(1)).unwrap().move_type, MoveType::None);
    }

    #[test]
    fn test_terrain_costs() {
        let mut f = fixture(ScriptedDice::new([]));
        f.board.set_hex(HERE.translated(0), Hex::clear(1).with_woods(2));
        let path = compile_path(&f.board, &f.options, &f.entities, &walk(1)).unwrap();
        // 1 to enter, 2 for heavy woods, 1 for the level change.
        assert_eq!(path.mp_used, 4);
    }

    #[test]
    fn test_backward_cannot_run() {
        let f = fixture(ScriptedDice::new([]));
        let path = MovementPath::new(1).repeat(MoveStep::Backward, 5);
        let err = compile_path(&f.board, &f.options, &f.entities, &path).unwrap_err();
        assert!(err.to_string().contains("can't run backwards"));
    }

    #[test]
    fn test_cannot_end_on_friendly_or_pass_enemy() {
        let f = fixture(ScriptedDice::new([]))
            .with(centurion(2, 1, HERE.translated(0), 0))
            .with(centurion(3, 2, HERE.translated(3), 0));
        assert!(compile_path(&f.board, &f.options, &f.entities, &walk(1)).is_err());
        assert!(compile_path(&f.board, &f.options, &f.entities, &walk(2)).is_ok());
        let back = MovementPath::new(1).step(MoveStep::Backward);
        assert!(compile_path(&f.board, &f.options, &f.entities, &back).is_err());
    }

    #[test]
    fn test_prone_must_get_up_first() {
        let mut f = fixture(ScriptedDice::new([]));
        f.entity_mut(1).prone = true;
        assert!(compile_path(&f.board, &f.options, &f.entities, &walk(1)).is_err());
        let path = MovementPath::new(1).step(MoveStep::GetUp).step(MoveStep::Forward);
        let compiled = compile_path(&f.board, &f.options, &f.entities, &path).unwrap();
        assert_eq!(compiled.mp_used, 3);
    }

    #[test]
    fn test_flee_only_from_edge() {
        let f = fixture(ScriptedDice::new([]));
        let flee = MovementPath::new(1).step(MoveStep::Flee);
        assert!(compile_path(&f.board, &f.options, &f.entities, &flee).is_err());

        let mut f = Fixture::new(ScriptedDice::new([])).with(centurion(1, 1, HexCoord::new(0, 5), 0));
        f.battle().execute_move(&flee).unwrap();
        assert_eq!(f.entity(1).removal, Some(Removal::Fled));
        assert_eq!(f.entity(1).position, None);
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[test]
    fn test_walk_updates_state_and_heat() {
        let mut f = fixture(ScriptedDice::new([]));
        f.battle().execute_move(&walk(3)).unwrap();
        let entity = f.entity(1);
        assert_eq!(entity.position, Some(HERE.translated_by(0, 3)));
        assert_eq!(entity.moved, MoveType::Walk);
        assert_eq!(entity.hexes_moved, 3);
        assert_eq!(entity.heat_buildup, 1);
    }

    #[test]
    fn test_illegal_path_changes_nothing() {
        let mut f = fixture(ScriptedDice::new([]));
        assert!(f.battle().execute_move(&walk(9)).is_err());
        assert_eq!(f.entity(1).position, Some(HERE));
        assert_eq!(f.entity(1).heat_buildup, 0);
    }

    #[test]
    fn test_failed_water_check_ends_move() {
        let mut f = fixture(ScriptedDice::new([2]).with_singles([1]));
        let water = HERE.translated(0);
        f.board.set_hex(water, Hex::clear(0).with_water(1));
        let outcome = f.battle().execute_move(&walk(2)).unwrap();
        let entity = f.entity(1);
        assert!(entity.prone);
        assert_eq!(entity.position, Some(water));
        assert!(outcome.fell_with_mp_left);
        assert!(f.report.as_str().contains("entering Depth 1 Water"));
    }

    #[test]
    fn test_move_after_fall_continues_from_spent_mp() {
        let mut f = fixture(ScriptedDice::new([2, 7]).with_singles([1]).with_fallback(12));
        let rubble = HERE.translated_by(0, 2);
        f.board.set_hex(rubble, Hex::clear(0).with_rubble(1));
        let outcome = f.battle().execute_move(&walk(3)).unwrap();
        assert!(outcome.fell_with_mp_left);
        let entity = f.entity(1);
        assert!(entity.prone);
        assert_eq!(entity.position, Some(rubble));
        assert_eq!(entity.mp_used, 3);
        assert_eq!(entity.hexes_moved, 2);

        // 3 spent + 2 to stand + 2 hexes is more than the 6 run MP.
        let too_far = MovementPath::new(1)
            .step(MoveStep::GetUp)
            .repeat(MoveStep::Forward, 2);
        assert!(f.battle().execute_move(&too_far).is_err());

        let rest = MovementPath::new(1).step(MoveStep::GetUp).step(MoveStep::Forward);
        let outcome = f.battle().execute_move(&rest).unwrap();
        assert!(!outcome.fell_with_mp_left);
        let entity = f.entity(1);
        assert!(!entity.prone);
        assert_eq!(entity.mp_used, 6);
        assert_eq!(entity.hexes_moved, 3);
        assert_eq!(entity.moved, MoveType::Run);
    }

    #[test]
    fn test_fall_at_run_mp_gives_no_extra_turn() {
        let mut f = fixture(ScriptedDice::new([2, 7]).with_singles([1]).with_fallback(12));
        f.board.set_hex(HERE.translated_by(0, 5), Hex::clear(0).with_rubble(1));
        let outcome = f.battle().execute_move(&walk(5)).unwrap();
        assert_eq!(f.entity(1).mp_used, 6);
        assert!(!outcome.fell_with_mp_left);
    }

    #[test]
    fn test_new_round_clears_spent_mp() {
        let mut f = fixture(ScriptedDice::new([]));
        f.battle().execute_move(&walk(3)).unwrap();
        assert_eq!(f.entity(1).mp_used, 3);
        f.entity_mut(1).new_round();
        assert_eq!(f.entity(1).mp_used, 0);
        assert_eq!(f.entity(1).hexes_moved, 0);
    }

    #[test]
    fn test_running_fall_skids() {
        let mut f = fixture(ScriptedDice::new([2]).with_singles([1]));
        f.board.set_hex(HERE.translated_by(0, 5), Hex::clear(0).with_rubble(1));
        f.battle().execute_move(&walk(5)).unwrap();
        assert_eq!(f.entity(1).moved, MoveType::Skid);
    }

    #[test]
    fn test_charge_registers_attack() {
        let mut f = fixture(ScriptedDice::new([])).with(centurion(2, 2, HERE.translated_by(0, 3), 3));
        let path = walk(2).step(MoveStep::Charge);
        let outcome = f.battle().execute_move(&path).unwrap();
        let target_position = HERE.translated_by(0, 3);
        assert_eq!(
            outcome.attack,
            Some(Action::Charge {
                entity: 1,
                target: 2,
                target_position,
            })
        );
        let entity = f.entity(1);
        assert_eq!(entity.hexes_moved, 2);
        assert_eq!(entity.displacement_attack.map(|d| d.target), Some(2));
    }

    #[test]
    fn test_running_on_damaged_gyro_queues_check() {
        let mut f = fixture(ScriptedDice::new([]));
        let slot = f
            .entity_mut(1)
            .locations
            .iter_mut()
            .flat_map(|l| l.slots.iter_mut().flatten())
            .find(|s| s.content == crate::entity::SlotContent::System(SystemKind::Gyro))
            .unwrap();
        slot.hit = true;
        f.battle().execute_move(&walk(6)).unwrap();
        assert_eq!(
            f.piloting.requests_for(1)[0].reason,
            "running with damaged hip/gyro"
        );
    }
}
