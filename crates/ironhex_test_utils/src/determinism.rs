//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a game session produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays, spectators and bug reports all assume that the same seed and
//! the same packets resolve the same way. Sources of non-determinism
//! include:
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The engine always iterates entities in sorted id order.
//!
//! - **System randomness**: Every roll goes through the session's
//!   [`ironhex_core::dice::Dice`], seeded or scripted.
//!
//! - **Floating-point geometry**: Line-of-sight and facing use
//!   [`ironhex_core::math::Fixed`].
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual rules with scripted dice
//! 2. **Property tests**: Random packet streams must still replay identically
//! 3. **Integration tests**: Full games are reproducible
//! 4. **Parallel tests**: Running N games on separate threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use ironhex_core::options::GameOptions;
use ironhex_core::player::PlayerId;
use ironhex_core::protocol::ClientPacket;
use ironhex_core::session::GameSession;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps applied per run.
    pub steps: usize,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic game).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the game was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Session is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a scenario multiple times and verify determinism.
///
/// # Example
///
/// ```ignore
/// use ironhex_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,  // Run 5 times
///     40, // 40 steps each
///     || setup_duel(),
///     |session, step| drive(session, step),
///     GameSession::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: usize,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, usize),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);
    for _ in 0..runs {
        let mut state = setup();
        for i in 0..steps {
            step(&mut state, i);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// A recorded stream of packets that can be replayed into fresh sessions.
#[derive(Debug, Clone, Default)]
pub struct PacketScript {
    /// Number of players to connect before replaying.
    pub players: u32,
    /// Packets in arrival order.
    pub packets: Vec<(PlayerId, ClientPacket)>,
}

impl PacketScript {
    /// Create a script for `players` connections.
    #[must_use]
    pub const fn new(players: u32) -> Self {
        Self {
            players,
            packets: Vec::new(),
        }
    }

    /// Builder: append a packet.
    #[must_use]
    pub fn then(mut self, player: PlayerId, packet: ClientPacket) -> Self {
        self.packets.push((player, packet));
        self
    }

    /// Replay into a new seeded session. Rejected packets are skipped, the
    /// same way the server drops them.
    #[must_use]
    pub fn replay(&self, options: GameOptions, seed: u64) -> GameSession {
        let mut session = GameSession::new(options, seed);
        for _ in 0..self.players {
            session.connect();
        }
        for (player, packet) in &self.packets {
            if let Err(e) = session.handle(*player, packet.clone()) {
                tracing::debug!(player, error = %e, "scripted packet rejected");
            }
        }
        session
    }
}

/// Result of parallel game runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each game.
    pub hashes: Vec<u64>,
    /// Number of games run.
    pub num_games: usize,
}

impl ParallelRunResult {
    /// Check if all games produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all games matched.
    ///
    /// # Panics
    ///
    /// Panics if games produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel games diverged!\n\
                 Games: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_games,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Replay a script on `num_games` threads at once and collect the hashes.
///
/// # Panics
///
/// Panics if a replay thread panics.
#[must_use]
pub fn replay_parallel(
    script: &PacketScript,
    options: GameOptions,
    seed: u64,
    num_games: usize,
) -> ParallelRunResult {
    let hashes: Vec<u64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..num_games)
            .map(|_| scope.spawn(|| script.replay(options, seed).state_hash()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("replay thread panicked"))
            .collect()
    });
    ParallelRunResult { hashes, num_games }
}

/// Hash any hashable value with the standard hasher.
#[must_use]
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for generating game inputs.
pub mod strategies {
    use proptest::prelude::*;

    use ironhex_core::action::{MoveStep, MovementPath};
    use ironhex_core::entity::EntityId;
    use ironhex_core::hex::HexCoord;
    use ironhex_core::player::PlayerId;
    use ironhex_core::protocol::ClientPacket;

    /// Generate a coordinate on a standard 16x17 board.
    pub fn arb_hex_coord() -> impl Strategy<Value = HexCoord> {
        (0i32..16, 0i32..17).prop_map(|(x, y)| HexCoord::new(x, y))
    }

    /// Generate a facing.
    pub fn arb_facing() -> impl Strategy<Value = u8> {
        0u8..6
    }

    /// Generate a single ground movement step.
    pub fn arb_move_step() -> impl Strategy<Value = MoveStep> {
        prop_oneof![
            4 => Just(MoveStep::Forward),
            1 => Just(MoveStep::Backward),
            2 => Just(MoveStep::TurnLeft),
            2 => Just(MoveStep::TurnRight),
        ]
    }

    /// Generate a movement path of up to `max_len` steps.
    pub fn arb_movement_path(
        entity: EntityId,
        max_len: usize,
    ) -> impl Strategy<Value = MovementPath> {
        proptest::collection::vec(arb_move_step(), 0..max_len).prop_map(move |steps| {
            steps
                .into_iter()
                .fold(MovementPath::new(entity), MovementPath::step)
        })
    }

    /// Generate damage values (1-30).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..30u32
    }

    /// Generate a turn-phase packet from one of two players, each owning
    /// the entity with their own id.
    pub fn arb_turn_packet() -> impl Strategy<Value = (PlayerId, ClientPacket)> {
        (1u32..=2, arb_movement_path(1, 6), any::<bool>()).prop_map(|(player, path, ready)| {
            let packet = if ready {
                ClientPacket::PlayerReady(true)
            } else {
                ClientPacket::Move(MovementPath { entity: player, ..path })
            };
            (player, packet)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{centurion, locust};
    use proptest::prelude::*;

    fn skirmish() -> PacketScript {
        let mut script = PacketScript::new(2)
            .then(1, ClientPacket::AddEntity(locust()))
            .then(2, ClientPacket::AddEntity(centurion()));
        // Lounge, exchange and initiative.
        for _ in 0..3 {
            script = script
                .then(1, ClientPacket::PlayerReady(true))
                .then(2, ClientPacket::PlayerReady(true));
        }
        // Both sides pass every turn, whoever goes first.
        for _ in 0..6 {
            script = script
                .then(1, ClientPacket::PlayerReady(true))
                .then(2, ClientPacket::PlayerReady(true));
        }
        script
    }

    #[test]
    fn test_verify_determinism_with_same_seed() {
        let script = skirmish();
        let result = verify_determinism(
            3,
            1,
            || GameSession::new(GameOptions::default(), 99),
            |session, _| {
                for _ in 0..2 {
                    session.connect();
                }
                for (player, packet) in &script.packets {
                    session.handle(*player, packet.clone()).ok();
                }
            },
            GameSession::state_hash,
        );
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_replay_parallel_matches() {
        replay_parallel(&skirmish(), GameOptions::default(), 5, 4).assert_deterministic();
    }

    #[test]
    fn test_detects_divergence() {
        let result = verify_determinism(
            2,
            1,
            || 0_u64,
            |_, _| {},
            |_| rand_hash(),
        );
        assert!(!result.is_deterministic);
    }

    fn rand_hash() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        compute_hash(&COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_random_turns_replay_identically(
            packets in proptest::collection::vec(strategies::arb_turn_packet(), 0..40),
            seed in any::<u64>(),
        ) {
            let mut script = skirmish();
            script.packets.truncate(8);
            script.packets.extend(packets);
            let first = script.replay(GameOptions::default(), seed).state_hash();
            let second = script.replay(GameOptions::default(), seed).state_hash();
            prop_assert_eq!(first, second);
        }
    }
}
