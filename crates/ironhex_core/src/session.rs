//! The authoritative game session.
//!
//! [`GameSession`] owns every piece of game truth: players, entities, the
//! board, the action and piloting queues, the turn scheduler and the dice.
//! It is driven by exactly one caller: inbound [`ClientPacket`]s go in
//! through [`GameSession::handle`], and every state change comes back out
//! as addressed [`Envelope`]s collected with [`GameSession::take_outbox`].
//!
//! # Phase cycle
//!
//! ```text
//! Lounge -> Exchange -> Initiative -> Movement -> [MovementReport]
//!        -> Firing -> [FiringReport] -> Physical -> End -> Initiative ...
//!                                                    \-> Victory -> Lounge
//! ```
//!
//! Entering a phase prepares it, skips it when it is an action phase with
//! no eligible units, announces it and then kicks it off. Action phases
//! advance one turn at a time; every other phase waits for all connected
//! players to be ready.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::action::{Action, ActionQueue};
use crate::board::Board;
use crate::combat::Battle;
use crate::data::UnitData;
use crate::dice::{Dice, SeededDice};
use crate::entity::{Entity, EntityId, EntityStorage};
use crate::error::{GameError, Result};
use crate::hex::HexCoord;
use crate::options::{BoardChoice, GameOptions, MapSettings, OptionChange};
use crate::phase::Phase;
use crate::piloting::PilotingQueue;
use crate::player::{Player, PlayerId, PlayerSettings, PLAYER_COLOURS, STARTING_POSITIONS};
use crate::protocol::{ClientPacket, Envelope, Recipient, ServerPacket};
use crate::report::Report;
use crate::to_hit::{estimate_physical, EntityState};
use crate::turns::{allocate_turns, initiative_order, roll_initiative, GameTurn, TurnScheduler};
use crate::visibility::{visible_entities, VisibilityTracker};

/// Largest accepted board side.
pub const MAX_BOARD_SIZE: i32 = 100;

/// Prefix of chat lines written by the server.
pub const SERVER_CHAT_PREFIX: &str = "***Server: ";

/// Order in which new players are handed starting positions, so that the
/// first two start in opposite corners.
const START_POSITION_ORDER: [u8; 8] = [0, 4, 2, 6, 1, 5, 3, 7];

/// Who won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Victor {
    /// Winning player, when a single player won.
    pub player: Option<PlayerId>,
    /// Winning team, when a team won.
    pub team: Option<u8>,
}

/// One running game.
pub struct GameSession {
    phase: Phase,
    round: u32,
    options: GameOptions,
    map_settings: MapSettings,
    password: Option<String>,
    boards: Vec<Board>,
    board: Board,
    players: BTreeMap<PlayerId, Player>,
    next_player: PlayerId,
    entities: EntityStorage,
    retired: EntityStorage,
    actions: ActionQueue,
    piloting: PilotingQueue,
    scheduler: TurnScheduler,
    report: Report,
    visibility: VisibilityTracker,
    forced_victory: Option<PlayerId>,
    victor: Option<Victor>,
    dice: Box<dyn Dice>,
    outbox: Vec<Envelope>,
}

impl GameSession {
    /// Create a session in the lounge with seeded dice.
    #[must_use]
    pub fn new(options: GameOptions, seed: u64) -> Self {
        Self::with_dice(options, Box::new(SeededDice::new(seed)))
    }

    /// Create a session in the lounge with the given dice.
    #[must_use]
    pub fn with_dice(options: GameOptions, dice: Box<dyn Dice>) -> Self {
        let map_settings = MapSettings::default();
        Self {
            phase: Phase::Lounge,
            round: 0,
            options,
            board: Board::blank(map_settings.width, map_settings.height),
            map_settings,
            password: None,
            boards: Vec::new(),
            players: BTreeMap::new(),
            next_player: 1,
            entities: EntityStorage::new(),
            retired: EntityStorage::new(),
            actions: ActionQueue::new(),
            piloting: PilotingQueue::new(),
            scheduler: TurnScheduler::default(),
            report: Report::new(),
            visibility: VisibilityTracker::new(),
            forced_victory: None,
            victor: None,
            dice,
            outbox: Vec::new(),
        }
    }

    /// Builder: require a password for option changes.
    #[must_use]
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    /// Builder: boards available to map settings.
    #[must_use]
    pub fn with_boards(mut self, boards: Vec<Board>) -> Self {
        self.boards = boards;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round, 0 before the first initiative.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Rule switches.
    #[must_use]
    pub const fn options(&self) -> &GameOptions {
        &self.options
    }

    /// Board selection.
    #[must_use]
    pub const fn map_settings(&self) -> &MapSettings {
        &self.map_settings
    }

    /// Board in play.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Names of the boards that can be selected.
    #[must_use]
    pub fn board_names(&self) -> Vec<&str> {
        self.boards.iter().map(Board::name).collect()
    }

    /// Whether option changes need a password.
    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Check a password against the configured one. Always passes when
    /// none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::PasswordRejected`] on a mismatch.
    pub fn check_password(&self, password: Option<&str>) -> Result<()> {
        match &self.password {
            Some(expected) if password != Some(expected.as_str()) => {
                Err(GameError::PasswordRejected)
            }
            _ => Ok(()),
        }
    }

    /// Every player, by id.
    #[must_use]
    pub const fn players(&self) -> &BTreeMap<PlayerId, Player> {
        &self.players
    }

    /// A player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Units in play.
    #[must_use]
    pub const fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// A unit in play.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Units that have left play this game.
    #[must_use]
    pub const fn retired(&self) -> &EntityStorage {
        &self.retired
    }

    /// The turn being played.
    #[must_use]
    pub const fn current_turn(&self) -> Option<GameTurn> {
        self.scheduler.current()
    }

    /// Report text not yet sent.
    #[must_use]
    pub const fn report(&self) -> &Report {
        &self.report
    }

    /// Outcome of the finished game.
    #[must_use]
    pub const fn victor(&self) -> Option<Victor> {
        self.victor
    }

    /// Take the packets produced since the last call.
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    fn battle(&mut self) -> Battle<'_> {
        Battle {
            board: &self.board,
            options: &self.options,
            entities: &mut self.entities,
            dice: &mut *self.dice,
            report: &mut self.report,
            piloting: &mut self.piloting,
        }
    }

    fn send(&mut self, recipient: Recipient, packet: ServerPacket) {
        self.outbox.push(Envelope { recipient, packet });
    }

    /// Send a server chat line.
    pub fn server_chat(&mut self, recipient: Recipient, text: &str) {
        self.send(
            recipient,
            ServerPacket::Chat(format!("{SERVER_CHAT_PREFIX}{text}")),
        );
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Register a new connection and send it the current game.
    pub fn connect(&mut self) -> PlayerId {
        let id = self.next_player;
        self.next_player += 1;

        let mut player = Player::new(id, format!("Player {id}"));
        player.settings.colour = (0..PLAYER_COLOURS)
            .find(|c| self.players.values().all(|p| p.settings.colour != *c))
            .unwrap_or(0);
        player.settings.start_position = START_POSITION_ORDER
            .into_iter()
            .find(|s| self.players.values().all(|p| p.settings.start_position != *s))
            .unwrap_or(0);
        self.players.insert(id, player.clone());
        tracing::info!(player = id, "player connected");

        self.send(Recipient::Player(id), ServerPacket::Greeting { player: id });
        self.send_current_info(id);
        self.send(Recipient::AllExcept(id), ServerPacket::PlayerUpdate(player));
        id
    }

    /// Everything a newly joined player needs.
    fn send_current_info(&mut self, id: PlayerId) {
        let to = Recipient::Player(id);
        let players = self.players.values().cloned().collect();
        self.send(to, ServerPacket::Players(players));
        self.send(to, ServerPacket::GameSettings(self.options));
        if self.phase == Phase::Lounge {
            self.send(to, ServerPacket::MapSettings(self.map_settings.clone()));
        } else {
            self.send(to, ServerPacket::Board(self.board.clone()));
        }
        let change = self.visibility.update(
            &self.board,
            &self.options,
            &self.players,
            &self.entities,
            id,
        );
        let entities = change
            .visible
            .iter()
            .filter_map(|e| self.entities.get(*e).cloned())
            .collect();
        self.send(to, ServerPacket::Entities(entities));
        self.send(to, ServerPacket::PhaseChange(self.phase));
        if let Some(turn) = self.scheduler.current() {
            self.send(to, ServerPacket::Turn(turn));
        }
    }

    /// A connection was lost. Players owning live units stay on as ghosts
    /// whose turns are skipped; anyone else is removed.
    pub fn disconnect(&mut self, id: PlayerId) {
        let owns_units = self
            .entities
            .owned_by(id)
            .into_iter()
            .any(|e| self.entities.get(e).is_some_and(Entity::is_active));
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        let name = player.name.clone();
        if owns_units {
            player.ghost = true;
            player.ready = false;
            let player = player.clone();
            self.send(Recipient::All, ServerPacket::PlayerUpdate(player));
            tracing::info!(player = id, "player became a ghost");
        } else {
            self.players.remove(&id);
            self.send(Recipient::All, ServerPacket::PlayerRemove(id));
            tracing::info!(player = id, "player removed");
        }
        self.visibility.forget(id);
        self.server_chat(Recipient::All, &format!("{name} disconnected."));

        if self.phase.is_action_phase() {
            if self.scheduler.current().is_some_and(|t| t.player == id) {
                self.next_turn();
            }
        } else {
            self.check_ready();
        }
    }

    // ========================================================================
    // Inbound packets
    // ========================================================================

    /// Apply one request from a player.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the game untouched, for requests that are
    /// out of turn, in the wrong phase, for units the player does not own
    /// or otherwise illegal.
    pub fn handle(&mut self, player: PlayerId, packet: ClientPacket) -> Result<()> {
        if !self.players.contains_key(&player) {
            return Err(GameError::PlayerNotFound(player));
        }
        tracing::debug!(player, packet = packet.name(), "handling packet");
        match packet {
            ClientPacket::Identify { name } => self.rename(player, name),
            ClientPacket::UpdateSettings(settings) => self.update_settings(player, settings),
            ClientPacket::PlayerReady(ready) => self.player_ready(player, ready),
            ClientPacket::EntityReady(entity) => {
                self.check_turn(player, entity, "entity ready")?;
                self.end_action(entity);
                Ok(())
            }
            ClientPacket::Chat(text) => self.chat(player, &text),
            ClientPacket::AddEntity(unit) => self.add_entity(player, &unit),
            ClientPacket::UpdateEntity { entity, unit } => self.update_entity(player, entity, &unit),
            ClientPacket::RemoveEntity(entity) => self.remove_entity(player, entity),
            ClientPacket::Move(path) => {
                if self.phase != Phase::Movement {
                    return Err(self.wrong_phase("move"));
                }
                self.check_turn(player, path.entity, "move")?;
                let outcome = self.battle().execute_move(&path)?;
                if let Some(attack) = outcome.attack {
                    self.actions.push(attack);
                }
                if outcome.fell_with_mp_left {
                    self.scheduler
                        .insert_next(GameTurn::for_entity(player, path.entity));
                    self.send_entity_update(path.entity);
                    self.next_turn();
                } else {
                    self.end_action(path.entity);
                }
                Ok(())
            }
            ClientPacket::Attack { entity, actions } => self.declare_attacks(player, entity, actions),
            ClientPacket::ChangeOptions { password, changes } => {
                self.change_options(player, password.as_deref(), &changes)
            }
            ClientPacket::ChangeMap(settings) => self.change_map(settings),
        }
    }

    fn wrong_phase(&self, request: &'static str) -> GameError {
        GameError::WrongPhase {
            request,
            phase: self.phase,
        }
    }

    fn player_name(&self, id: PlayerId) -> String {
        self.players
            .get(&id)
            .map_or_else(|| format!("Player {id}"), |p| p.name.clone())
    }

    fn rename(&mut self, id: PlayerId, name: String) -> Result<()> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(GameError::InvalidAction("empty player name".to_string()));
        }
        let player = self.players.get_mut(&id).ok_or(GameError::PlayerNotFound(id))?;
        player.name = name;
        let player = player.clone();
        self.send(Recipient::All, ServerPacket::PlayerUpdate(player));
        Ok(())
    }

    fn update_settings(&mut self, id: PlayerId, settings: PlayerSettings) -> Result<()> {
        if self.phase != Phase::Lounge {
            return Err(self.wrong_phase("update settings"));
        }
        if settings.colour >= PLAYER_COLOURS || settings.start_position >= STARTING_POSITIONS {
            return Err(GameError::InvalidAction(format!(
                "settings out of range: {settings:?}"
            )));
        }
        if self
            .players
            .values()
            .any(|p| p.id != id && p.settings.colour == settings.colour)
        {
            return Err(GameError::InvalidAction(format!(
                "colour {} already taken",
                settings.colour
            )));
        }
        let player = self.players.get_mut(&id).ok_or(GameError::PlayerNotFound(id))?;
        player.settings = settings;
        let player = player.clone();
        self.send(Recipient::All, ServerPacket::PlayerUpdate(player));
        Ok(())
    }

    fn chat(&mut self, id: PlayerId, text: &str) -> Result<()> {
        if text.starts_with('/') {
            return Err(GameError::InvalidAction(
                "chat commands are run by the server".to_string(),
            ));
        }
        let line = format!("{}: {text}", self.player_name(id));
        self.send(Recipient::All, ServerPacket::Chat(line));
        Ok(())
    }

    fn player_ready(&mut self, id: PlayerId, ready: bool) -> Result<()> {
        if self.phase.is_action_phase() {
            // Ready in an action phase passes the turn with one unit.
            if !ready {
                return Ok(());
            }
            let turn = self
                .scheduler
                .current()
                .filter(|t| t.player == id)
                .ok_or(GameError::OutOfTurn(id))?;
            let entity = turn
                .entity
                .or_else(|| self.ready_units(id).first().copied())
                .ok_or_else(|| GameError::InvalidState(format!("player {id} has no unit to act")))?;
            self.end_action(entity);
            return Ok(());
        }
        let player = self.players.get_mut(&id).ok_or(GameError::PlayerNotFound(id))?;
        player.ready = ready;
        self.send(Recipient::All, ServerPacket::PlayerReady { player: id, ready });
        self.check_ready();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lounge
    // ------------------------------------------------------------------------

    fn add_entity(&mut self, player: PlayerId, unit: &UnitData) -> Result<()> {
        if self.phase != Phase::Lounge {
            return Err(self.wrong_phase("add entity"));
        }
        let id = self.entities.allocate_id();
        let entity = Entity::from_unit_data(id, player, unit)?;
        tracing::debug!(player, entity = id, unit = %unit.display_name(), "unit added");
        self.entities.insert(entity);
        self.send_entity_update(id);
        Ok(())
    }

    fn owned(&self, player: PlayerId, entity: EntityId) -> Result<&Entity> {
        let e = self
            .entities
            .get(entity)
            .ok_or(GameError::EntityNotFound(entity))?;
        if e.owner != player {
            return Err(GameError::NotOwner { player, entity });
        }
        Ok(e)
    }

    fn update_entity(&mut self, player: PlayerId, entity: EntityId, unit: &UnitData) -> Result<()> {
        if self.phase != Phase::Lounge {
            return Err(self.wrong_phase("update entity"));
        }
        self.owned(player, entity)?;
        let replacement = Entity::from_unit_data(entity, player, unit)?;
        self.entities.insert(replacement);
        self.send_entity_update(entity);
        Ok(())
    }

    fn remove_entity(&mut self, player: PlayerId, entity: EntityId) -> Result<()> {
        if self.phase != Phase::Lounge {
            return Err(self.wrong_phase("remove entity"));
        }
        self.owned(player, entity)?;
        self.entities.remove(entity);
        self.send_entity_update(entity);
        Ok(())
    }

    fn change_options(
        &mut self,
        player: PlayerId,
        password: Option<&str>,
        changes: &[OptionChange],
    ) -> Result<()> {
        if self.phase != Phase::Lounge {
            return Err(self.wrong_phase("change options"));
        }
        self.check_password(password)?;
        let mut options = self.options;
        let mut changed = Vec::new();
        for change in changes {
            if options.set(&change.name, change.value)? {
                changed.push(change);
            }
        }
        self.options = options;
        let name = self.player_name(player);
        for change in changed {
            tracing::info!(player, option = %change.name, value = change.value, "option changed");
            self.server_chat(
                Recipient::All,
                &format!("{name} changed option \"{}\" to {}.", change.name, change.value),
            );
        }
        self.send(Recipient::All, ServerPacket::GameSettings(self.options));
        Ok(())
    }

    fn change_map(&mut self, settings: MapSettings) -> Result<()> {
        if self.phase != Phase::Lounge {
            return Err(self.wrong_phase("change map"));
        }
        let size = 1..=MAX_BOARD_SIZE;
        if !size.contains(&settings.width) || !size.contains(&settings.height) {
            return Err(GameError::InvalidAction(format!(
                "board size {}x{} out of range",
                settings.width, settings.height
            )));
        }
        if let BoardChoice::Named(name) = &settings.board {
            if self.boards.iter().all(|b| b.name() != name) {
                return Err(GameError::InvalidAction(format!("no board named '{name}'")));
            }
        }
        self.map_settings = settings;
        self.send(
            Recipient::All,
            ServerPacket::MapSettings(self.map_settings.clone()),
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Turns
    // ------------------------------------------------------------------------

    /// Whether a player may act with an entity right now.
    fn check_turn(&self, player: PlayerId, entity: EntityId, request: &'static str) -> Result<()> {
        if !self.phase.is_action_phase() {
            return Err(self.wrong_phase(request));
        }
        let turn = self
            .scheduler
            .current()
            .filter(|t| t.player == player)
            .ok_or(GameError::OutOfTurn(player))?;
        if turn.entity.is_some_and(|e| e != entity) {
            return Err(GameError::OutOfTurn(player));
        }
        if !self.owned(player, entity)?.ready {
            return Err(GameError::InvalidAction(format!(
                "entity {entity} has already acted this phase"
            )));
        }
        Ok(())
    }

    fn declare_attacks(&mut self, player: PlayerId, entity: EntityId, actions: Vec<Action>) -> Result<()> {
        let allowed: fn(&Action) -> bool = match self.phase {
            Phase::Firing => |a| {
                matches!(
                    a,
                    Action::WeaponAttack { .. }
                        | Action::TorsoTwist { .. }
                        | Action::FlipArms { .. }
                        | Action::FireModeChange { .. }
                )
            },
            Phase::Physical => |a| {
                matches!(
                    a,
                    Action::Punch { .. }
                        | Action::Kick { .. }
                        | Action::Club { .. }
                        | Action::Push { .. }
                        | Action::FindClub { .. }
                )
            },
            _ => return Err(self.wrong_phase("attack")),
        };
        self.check_turn(player, entity, "attack")?;

        let attacker = self.owned(player, entity)?;
        for action in &actions {
            if action.entity() != entity {
                return Err(GameError::InvalidAction(format!(
                    "declaration for entity {} in the turn of {entity}",
                    action.entity()
                )));
            }
            if !allowed(action) {
                return Err(GameError::InvalidAction(format!(
                    "{action:?} not allowed during {}",
                    self.phase
                )));
            }
            if let Some(target) = action.target() {
                if !self.entities.contains(target) {
                    return Err(GameError::EntityNotFound(target));
                }
            }
            if let Action::WeaponAttack { weapon, .. } = action {
                if attacker.equipment.get(*weapon).and_then(|m| m.weapon()).is_none() {
                    return Err(GameError::InvalidAction(format!(
                        "equipment {weapon} is not a weapon"
                    )));
                }
            }
        }
        let physical = actions.iter().filter(|a| a.is_physical()).count();
        if physical > 1 || (physical == 1 && self.actions.has_physical(entity)) {
            return Err(GameError::InvalidAction(
                "only one physical attack per unit".to_string(),
            ));
        }

        for action in actions {
            self.actions.push(action);
        }
        self.end_action(entity);
        Ok(())
    }

    /// Units of a player that may still act this phase.
    fn ready_units(&self, player: PlayerId) -> Vec<EntityId> {
        self.entities
            .sorted()
            .into_iter()
            .filter(|e| e.owner == player && e.ready)
            .map(|e| e.id)
            .collect()
    }

    fn end_action(&mut self, entity: EntityId) {
        if let Some(e) = self.entities.get_mut(entity) {
            e.ready = false;
        }
        self.send_entity_update(entity);
        self.next_turn();
    }

    /// Serve the next playable turn, ending the phase once none remain.
    /// Turns of ghosts, or of players with nothing left to move, are skipped.
    fn next_turn(&mut self) {
        while let Some(turn) = self.scheduler.advance() {
            let ghost = self.players.get(&turn.player).map_or(true, |p| p.ghost);
            if ghost {
                tracing::debug!(player = turn.player, "skipping ghost turn");
                continue;
            }
            let can_act = match turn.entity {
                Some(id) => self.entities.get(id).is_some_and(|e| e.ready && e.owner == turn.player),
                None => !self.ready_units(turn.player).is_empty(),
            };
            if !can_act {
                continue;
            }
            self.send(Recipient::All, ServerPacket::Turn(turn));
            return;
        }
        self.end_phase();
    }

    fn eligible(&self, phase: Phase, entity: &Entity) -> bool {
        if !entity.is_targetable() || entity.is_immobile() {
            return false;
        }
        match phase {
            Phase::Movement => true,
            Phase::Firing => entity.displacement_attack.is_none(),
            Phase::Physical => {
                entity.displacement_attack.is_none()
                    && (!self.options.skip_ineligible_physical || self.has_physical_target(entity))
            }
            _ => false,
        }
    }

    fn has_physical_target(&self, attacker: &Entity) -> bool {
        let Some(state) = EntityState::of(attacker) else {
            return false;
        };
        self.entities
            .sorted()
            .into_iter()
            .filter(|t| t.id != attacker.id && t.is_targetable())
            .any(|target| {
                EntityState::of(target).is_some_and(|target_state| {
                    !estimate_physical(
                        &self.board,
                        &self.options,
                        attacker,
                        state,
                        target,
                        target_state,
                    )
                    .is_impossible()
                })
            })
    }

    /// Turn order for an action phase from the current initiative.
    fn turn_order(&self, phase: Phase) -> Vec<GameTurn> {
        let mut counts: BTreeMap<PlayerId, u32> = BTreeMap::new();
        for entity in self.entities.sorted() {
            if self.eligible(phase, entity) {
                *counts.entry(entity.owner).or_insert(0) += 1;
            }
        }
        allocate_turns(&initiative_order(&self.players), &counts)
    }

    fn determine_turn_order(&mut self, phase: Phase) {
        for id in self.entities.sorted_ids() {
            let eligible = self
                .entities
                .get(id)
                .is_some_and(|e| self.eligible(phase, e));
            if let Some(e) = self.entities.get_mut(id) {
                e.ready = eligible;
            }
        }
        let turns = self.turn_order(phase);
        tracing::debug!(%phase, turns = turns.len(), "turn order determined");
        self.scheduler.reset(turns);
    }

    // ========================================================================
    // Phase machine
    // ========================================================================

    /// Advance once every connected player is ready. Stalls when nobody is
    /// connected.
    fn check_ready(&mut self) {
        if !self.phase.advances_when_all_ready() {
            return;
        }
        let mut connected = self.players.values().filter(|p| !p.ghost).peekable();
        if connected.peek().is_none() {
            tracing::debug!(phase = %self.phase, "no connected players, waiting");
            return;
        }
        if connected.all(|p| p.ready) {
            self.end_phase();
        }
    }

    fn end_phase(&mut self) {
        let next = self.finish(self.phase);
        self.change_phase(next);
    }

    fn change_phase(&mut self, mut phase: Phase) {
        loop {
            self.phase = phase;
            self.prepare(phase);
            if !phase.is_action_phase() || self.scheduler.has_more() {
                break;
            }
            tracing::debug!(%phase, "no eligible units, skipping phase");
            phase = self.finish(phase);
        }
        tracing::info!(%phase, round = self.round, "phase change");
        #[cfg(debug_assertions)]
        tracing::debug!(state_hash = self.state_hash(), "session state hash");
        self.send(Recipient::All, ServerPacket::PhaseChange(phase));
        self.execute(phase);
    }

    /// Phase-specific setup.
    fn prepare(&mut self, phase: Phase) {
        for player in self.players.values_mut() {
            player.ready = false;
        }
        self.scheduler.clear();
        match phase {
            Phase::Lounge | Phase::MovementReport | Phase::FiringReport => {}
            Phase::Exchange => {
                self.build_board();
                self.deploy();
            }
            Phase::Initiative => {
                self.round += 1;
                self.actions.clear();
                self.piloting.clear();
                self.reset_entity_phase();
                for id in self.entities.sorted_ids() {
                    if let Some(e) = self.entities.get_mut(id) {
                        e.new_round();
                    }
                }
                roll_initiative(&mut self.players, &mut *self.dice);
                self.write_initiative_report();
            }
            Phase::Movement | Phase::Firing | Phase::Physical => {
                self.reset_entity_phase();
                self.determine_turn_order(phase);
            }
            Phase::End => {
                self.reset_entity_phase();
                let mut battle = self.battle();
                battle.resolve_heat();
                battle.check_suffocation();
                battle.resolve_piloting_rolls();
                battle.resolve_crew_damage();
                battle.resolve_wake_up();
                self.reset_entity_phase();
            }
            Phase::Victory => self.write_victory_report(),
        }
    }

    /// Phase kickoff after the phase has been announced.
    fn execute(&mut self, phase: Phase) {
        match phase {
            Phase::Lounge => {
                let players = self.players.values().cloned().collect();
                self.send(Recipient::All, ServerPacket::Players(players));
                self.send(
                    Recipient::All,
                    ServerPacket::MapSettings(self.map_settings.clone()),
                );
                self.send_entities();
            }
            Phase::Exchange => {
                self.send(Recipient::All, ServerPacket::Board(self.board.clone()));
                self.send_entities();
            }
            Phase::Initiative | Phase::MovementReport | Phase::FiringReport | Phase::End => {
                self.send_entities();
                self.send_report();
            }
            Phase::Movement | Phase::Firing | Phase::Physical => {
                self.send_entities();
                self.next_turn();
            }
            Phase::Victory => {
                self.send_entities();
                let report = self.report.take();
                let victor = self.victor.unwrap_or(Victor {
                    player: None,
                    team: None,
                });
                self.send(Recipient::All, ServerPacket::Report(report.clone()));
                self.send(
                    Recipient::All,
                    ServerPacket::EndOfGame {
                        report,
                        winner: victor.player,
                        team: victor.team,
                    },
                );
            }
        }
    }

    /// Resolve the end of a phase and pick the next one.
    fn finish(&mut self, phase: Phase) -> Phase {
        match phase {
            Phase::Lounge => Phase::Exchange,
            Phase::Exchange => Phase::Initiative,
            Phase::Initiative => Phase::Movement,
            Phase::Movement => {
                let mut battle = self.battle();
                battle.resolve_piloting_rolls();
                battle.resolve_crew_damage();
                if self.report.is_empty() {
                    Phase::Firing
                } else {
                    Phase::MovementReport
                }
            }
            Phase::MovementReport => Phase::Firing,
            Phase::Firing => {
                // Charges declared while moving wait for the physical phase.
                let (displacements, attacks): (Vec<Action>, Vec<Action>) = self
                    .actions
                    .drain(&self.entities)
                    .into_iter()
                    .partition(Action::is_displacement);
                for action in displacements {
                    self.actions.push(action);
                }
                let mut battle = self.battle();
                if !attacks.is_empty() {
                    battle.resolve_weapon_attacks(&attacks);
                }
                battle.check_for_20_damage();
                battle.resolve_piloting_rolls();
                battle.resolve_crew_damage();
                if self.report.is_empty() {
                    Phase::Physical
                } else {
                    Phase::FiringReport
                }
            }
            Phase::FiringReport => Phase::Physical,
            Phase::Physical => {
                let actions = self.actions.drain(&self.entities);
                let mut battle = self.battle();
                if !actions.is_empty() {
                    battle.resolve_physical_attacks(&actions);
                }
                battle.check_for_20_damage();
                battle.resolve_piloting_rolls();
                battle.resolve_crew_damage();
                Phase::End
            }
            Phase::End => {
                self.victor = self.check_victory();
                if self.victor.is_some() {
                    Phase::Victory
                } else {
                    Phase::Initiative
                }
            }
            Phase::Victory => {
                self.clear_game();
                Phase::Lounge
            }
        }
    }

    /// Settle the phase's damage and move departed units to the inactive
    /// roster.
    fn reset_entity_phase(&mut self) {
        let mut departed = Vec::new();
        for id in self.entities.sorted_ids() {
            if !self.entities.get_mut(id).is_some_and(|e| e.new_phase()) {
                continue;
            }
            if let Some(entity) = self.entities.remove(id) {
                tracing::debug!(entity = id, removal = ?entity.removal, "unit left play");
                self.retired.insert(entity);
                departed.push(id);
            }
        }
        if !departed.is_empty() {
            self.sync_entities(&departed);
        }
    }

    fn send_report(&mut self) {
        if !self.report.is_empty() {
            let text = self.report.take();
            self.send(Recipient::All, ServerPacket::Report(text));
        }
    }

    // ------------------------------------------------------------------------
    // Exchange
    // ------------------------------------------------------------------------

    fn build_board(&mut self) {
        let settings = &self.map_settings;
        let chosen = match &settings.board {
            BoardChoice::Blank => None,
            BoardChoice::Named(name) => self.boards.iter().find(|b| b.name() == name).cloned(),
            BoardChoice::Random if self.boards.is_empty() => None,
            BoardChoice::Random => {
                let index = self.dice.pick(self.boards.len());
                self.boards.get(index).cloned()
            }
        };
        if chosen.is_none() && settings.board != BoardChoice::Blank {
            tracing::warn!(choice = ?settings.board, "board not available, using a blank board");
        }
        self.board = chosen.unwrap_or_else(|| Board::blank(settings.width, settings.height));
    }

    /// Corner or edge midpoint for a starting position.
    fn start_anchor(&self, position: u8) -> HexCoord {
        let (w, h) = (self.board.width() - 1, self.board.height() - 1);
        let (x, y) = match position % STARTING_POSITIONS {
            0 => (0, 0),
            1 => (w / 2, 0),
            2 => (w, 0),
            3 => (w, h / 2),
            4 => (w, h),
            5 => (w / 2, h),
            6 => (0, h),
            _ => (0, h / 2),
        };
        HexCoord::new(x, y)
    }

    /// Place every unit near its owner's starting position, spiralling out
    /// from the anchor to the first free dry hex, facing the centre.
    fn deploy(&mut self) {
        let center = self.board.center();
        let max_radius = self.board.width().max(self.board.height());
        for id in self.entities.sorted_ids() {
            let Some(owner) = self.entities.get(id).map(|e| e.owner) else {
                continue;
            };
            let start = self
                .players
                .get(&owner)
                .map_or(0, |p| p.settings.start_position);
            let anchor = self.start_anchor(start);
            let spot = (0..=max_radius)
                .flat_map(|radius| anchor.ring(radius))
                .find(|c| {
                    self.board.hex(*c).is_some_and(|hex| hex.water == 0)
                        && self.entities.occupant(*c, None).is_none()
                });
            let Some(e) = self.entities.get_mut(id) else {
                continue;
            };
            match spot {
                Some(position) => {
                    e.position = Some(position);
                    e.facing = position.direction_to(center).unwrap_or(0);
                    e.secondary_facing = e.facing;
                }
                None => {
                    tracing::warn!(entity = id, "no room to deploy, unit withdrawn");
                    e.removal = Some(crate::entity::Removal::Fled);
                }
            }
        }
        self.reset_entity_phase();
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    fn write_initiative_report(&mut self) {
        self.report.clear();
        self.report
            .header(&format!("Initiative Phase for Round #{}", self.round));
        for id in initiative_order(&self.players) {
            if let Some(player) = self.players.get(&id) {
                let text = format!("\n{} rolls {}.", player.name, player.initiative_text());
                self.report.push(text);
            }
        }
        let order: Vec<String> = self
            .turn_order(Phase::Movement)
            .iter()
            .map(|t| self.player_name(t.player))
            .collect();
        self.report.push("\n\nThe turn order is:\n  ");
        self.report.push(order.join(", "));
        self.report.push("\n");
    }

    fn write_victory_report(&mut self) {
        self.report.clear();
        self.report.header("Victory!");
        let text = match self.victor {
            Some(Victor {
                player: Some(id), ..
            }) => format!("\n{} is victorious!\n", self.player_name(id)),
            Some(Victor {
                team: Some(team), ..
            }) => format!("\nTeam {team} is victorious!\n"),
            _ => "\nDraw!\n".to_string(),
        };
        self.report.push(text);
        let detail = self.end_of_game_report();
        self.report.push(detail);
    }

    /// Per-unit status of every unit that took part.
    #[must_use]
    pub fn end_of_game_report(&self) -> String {
        let mut text = String::new();
        for player in self.players.values() {
            text.push_str(&format!("\n{}'s units:\n", player.name));
            let mut units: Vec<&Entity> = self
                .entities
                .sorted()
                .into_iter()
                .chain(self.retired.sorted())
                .filter(|e| e.owner == player.id)
                .collect();
            units.sort_by_key(|e| e.id);
            for unit in units {
                text.push_str(&format!("  {}\n", unit.status_line()));
            }
        }
        text
    }

    // ------------------------------------------------------------------------
    // Victory and reset
    // ------------------------------------------------------------------------

    /// Declare victory for a player's side at the end of the round.
    pub fn force_victory(&mut self, player: PlayerId) {
        tracing::info!(player, "victory forced");
        self.forced_victory = Some(player);
    }

    fn check_victory(&self) -> Option<Victor> {
        if let Some(id) = self.forced_victory {
            let team = self.players.get(&id).and_then(|p| p.settings.team);
            return Some(Victor {
                player: team.is_none().then_some(id),
                team,
            });
        }
        if !self.options.check_victory {
            return None;
        }
        let alive: Vec<&Player> = self
            .players
            .values()
            .filter(|p| {
                self.entities
                    .sorted()
                    .into_iter()
                    .any(|e| e.owner == p.id && e.is_active())
            })
            .collect();
        match alive.as_slice() {
            [] => Some(Victor {
                player: None,
                team: None,
            }),
            [only] => Some(Victor {
                player: Some(only.id),
                team: only.settings.team,
            }),
            [first, rest @ ..] => {
                let team = first.settings.team?;
                rest.iter()
                    .all(|p| p.settings.team == Some(team))
                    .then_some(Victor {
                        player: None,
                        team: Some(team),
                    })
            }
        }
    }

    /// Drop the game in progress and return to the lounge.
    pub fn reset(&mut self) {
        self.clear_game();
        self.change_phase(Phase::Lounge);
    }

    fn clear_game(&mut self) {
        tracing::info!("resetting game");
        self.entities.clear();
        self.retired.clear();
        self.actions.clear();
        self.piloting.clear();
        self.scheduler.clear();
        self.report.clear();
        self.visibility.clear();
        self.forced_victory = None;
        self.round = 0;
        let ghosts: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.ghost)
            .map(|p| p.id)
            .collect();
        for id in ghosts {
            self.players.remove(&id);
            self.send(Recipient::All, ServerPacket::PlayerRemove(id));
        }
        for player in self.players.values_mut() {
            player.initiative.clear();
        }
        self.board = Board::blank(self.map_settings.width, self.map_settings.height);
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Full visibility-filtered snapshot for every connected player.
    fn send_entities(&mut self) {
        let observers: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| !p.ghost)
            .map(|p| p.id)
            .collect();
        for observer in observers {
            let change = self.visibility.update(
                &self.board,
                &self.options,
                &self.players,
                &self.entities,
                observer,
            );
            let entities = change
                .visible
                .iter()
                .filter_map(|id| self.entities.get(*id).cloned())
                .collect();
            self.send(Recipient::Player(observer), ServerPacket::Entities(entities));
        }
    }

    /// Tell each connected player about a changed unit.
    fn send_entity_update(&mut self, changed: EntityId) {
        self.sync_entities(&[changed]);
    }

    /// Tell each connected player about changed or departed units they can
    /// see, and about any unit that came into or dropped out of their view
    /// as a result. A departed unit is only announced to players who were
    /// shown it.
    fn sync_entities(&mut self, changed: &[EntityId]) {
        let observers: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| !p.ghost)
            .map(|p| p.id)
            .collect();
        for observer in observers {
            let departed: Vec<EntityId> = changed
                .iter()
                .copied()
                .filter(|id| !self.entities.contains(*id))
                .filter(|id| self.visibility.was_visible(observer, *id))
                .collect();
            let change = self.visibility.update(
                &self.board,
                &self.options,
                &self.players,
                &self.entities,
                observer,
            );
            let to = Recipient::Player(observer);
            for id in &change.gained {
                if let Some(e) = self.entities.get(*id) {
                    let packet = ServerPacket::EntityAdd(e.clone());
                    self.send(to, packet);
                }
            }
            for id in changed {
                if !change.visible.contains(id) || change.gained.contains(id) {
                    continue;
                }
                if let Some(e) = self.entities.get(*id) {
                    let packet = ServerPacket::EntityUpdate(e.clone());
                    self.send(to, packet);
                }
            }
            for id in change.lost.into_iter().chain(departed) {
                self.send(to, ServerPacket::EntityRemove(id));
            }
        }
    }

    /// Entities a player may currently see.
    #[must_use]
    pub fn visible_to(&self, observer: PlayerId) -> Vec<EntityId> {
        visible_entities(
            &self.board,
            &self.options,
            &self.players,
            &self.entities,
            observer,
        )
        .into_iter()
        .collect()
    }

    /// Hash of the game state, identical for identical games.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.phase.hash(&mut hasher);
        self.round.hash(&mut hasher);
        self.options.hash(&mut hasher);
        self.board.hash(&mut hasher);
        for player in self.players.values() {
            player.hash(&mut hasher);
        }
        for storage in [&self.entities, &self.retired] {
            storage.len().hash(&mut hasher);
            for entity in storage.sorted() {
                entity.hash(&mut hasher);
            }
        }
        self.actions.hash(&mut hasher);
        self.piloting.hash(&mut hasher);
        self.scheduler.hash(&mut hasher);
        hasher.finish()
    }
}
