//! Determinism tests.
//!
//! The same seed and the same packets must always produce the same game.

use ironhex_core::prelude::*;
use ironhex_test_utils::determinism::{replay_parallel, verify_determinism, PacketScript};
use ironhex_test_utils::fixtures::{atlas, centurion};

/// Two units closing on each other and trading fire for a few rounds.
fn brawl() -> PacketScript {
    let mut script = PacketScript::new(2)
        .then(1, ClientPacket::AddEntity(atlas()))
        .then(2, ClientPacket::AddEntity(centurion()));
    for _ in 0..3 {
        script = script
            .then(1, ClientPacket::PlayerReady(true))
            .then(2, ClientPacket::PlayerReady(true));
    }
    for _ in 0..4 {
        // Each side tries its move and its shots; whichever is out of turn
        // or out of phase is rejected, exactly as the server would.
        for player in [1, 2] {
            let path = MovementPath::new(player).repeat(MoveStep::Forward, 3);
            script = script.then(player, ClientPacket::Move(path));
        }
        for player in [1, 2] {
            let path = MovementPath::new(player).repeat(MoveStep::Forward, 3);
            script = script.then(player, ClientPacket::Move(path));
        }
        for player in [1, 2, 1, 2] {
            let shot = Action::WeaponAttack {
                entity: player,
                target: 3 - player,
                weapon: 0,
            };
            script = script.then(
                player,
                ClientPacket::Attack {
                    entity: player,
                    actions: vec![shot],
                },
            );
        }
        for player in [1, 2, 1, 2, 1, 2] {
            script = script.then(player, ClientPacket::PlayerReady(true));
        }
    }
    script
}

#[test]
fn seeded_games_replay_identically() {
    let script = brawl();
    let result = verify_determinism(
        4,
        1,
        || None,
        |session: &mut Option<GameSession>, _| {
            *session = Some(script.replay(GameOptions::default(), 1234));
        },
        |session| session.as_ref().map_or(0, GameSession::state_hash),
    );
    result.assert_deterministic();
}

#[test]
fn replays_on_threads_agree() {
    replay_parallel(&brawl(), GameOptions::default(), 77, 4).assert_deterministic();
}

#[test]
fn replays_reach_the_same_round() {
    let script = brawl();
    let a = script.replay(GameOptions::default(), 9);
    let b = script.replay(GameOptions::default(), 9);
    assert!(a.round() >= 1);
    assert_eq!(a.round(), b.round());
    assert_eq!(a.phase(), b.phase());
    assert_eq!(a.report().as_str(), b.report().as_str());
}
