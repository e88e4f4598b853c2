//! Session flow tests.
//!
//! Drive whole games through the packet interface and check what each
//! player is told.

use ironhex_core::prelude::*;
use ironhex_test_utils::fixtures::{atlas, centurion, duel, locust, ready_until, ridge_board, scripted_session};

fn packets_for(outbox: &[Envelope], player: PlayerId) -> Vec<&ServerPacket> {
    outbox
        .iter()
        .filter(|e| e.recipient.includes(player))
        .map(|e| &e.packet)
        .collect()
}

#[test]
fn lounge_departure_without_units_removes_player() {
    let mut session = scripted_session(vec![]);
    let a = session.connect();
    let b = session.connect();
    session.take_outbox();

    session.disconnect(b);

    assert!(session.player(b).is_none());
    let outbox = session.take_outbox();
    let seen = packets_for(&outbox, a);
    assert!(seen.contains(&&ServerPacket::PlayerRemove(b)));
    assert!(seen
        .iter()
        .any(|p| matches!(p, ServerPacket::Chat(text) if text == "***Server: Player 2 disconnected.")));
}

#[test]
fn illegal_move_leaves_state_untouched() {
    let (mut session, a, _) = duel(atlas(), locust());
    let before = session.state_hash();

    let sprint = MovementPath::new(1).repeat(MoveStep::Forward, 12);
    assert!(session.handle(a, ClientPacket::Move(sprint)).is_err());

    assert_eq!(session.state_hash(), before);
    assert_eq!(session.current_turn(), Some(GameTurn::new(a)));
}

#[test]
fn rounds_repeat_until_someone_wins() {
    let (mut session, _, _) = duel(centurion(), centurion());
    for _ in 0..2 {
        // Everyone passes through movement and firing.
        while let Some(turn) = session.current_turn() {
            session
                .handle(turn.player, ClientPacket::PlayerReady(true))
                .unwrap();
        }
        assert_eq!(session.phase(), Phase::End);
        ready_until(&mut session, Phase::Movement);
    }
    assert_eq!(session.round(), 3);
    let outbox = session.take_outbox();
    assert!(outbox.iter().any(|e| matches!(
        &e.packet,
        ServerPacket::Report(text) if text.contains("Initiative Phase for Round #3")
    )));
}

#[test]
fn double_blind_hides_lounge_units_from_opponents() {
    let mut session = scripted_session(vec![]);
    let a = session.connect();
    let b = session.connect();
    session
        .handle(
            a,
            ClientPacket::ChangeOptions {
                password: None,
                changes: vec![OptionChange::new("double_blind", true)],
            },
        )
        .unwrap();
    session.take_outbox();

    session.handle(a, ClientPacket::AddEntity(locust())).unwrap();

    let outbox = session.take_outbox();
    assert!(packets_for(&outbox, a)
        .iter()
        .any(|p| matches!(p, ServerPacket::EntityAdd(e) if e.owner == a)));
    assert!(!packets_for(&outbox, b)
        .iter()
        .any(|p| matches!(p, ServerPacket::EntityAdd(_))));
}

#[test]
fn named_board_is_used_at_exchange() {
    let mut session = scripted_session(vec![]).with_boards(vec![ridge_board()]);
    let a = session.connect();

    let missing = MapSettings {
        board: BoardChoice::Named("glacier".to_string()),
        ..MapSettings::default()
    };
    assert!(session.handle(a, ClientPacket::ChangeMap(missing)).is_err());

    let ridge = MapSettings {
        board: BoardChoice::Named("ridge".to_string()),
        ..MapSettings::default()
    };
    session.handle(a, ClientPacket::ChangeMap(ridge)).unwrap();
    session.handle(a, ClientPacket::AddEntity(centurion())).unwrap();
    ready_until(&mut session, Phase::Exchange);

    assert_eq!(session.board().name(), "ridge");
    let outbox = session.take_outbox();
    assert!(outbox
        .iter()
        .any(|e| matches!(&e.packet, ServerPacket::Board(board) if board.name() == "ridge")));
}

#[test]
fn settings_and_map_are_fixed_once_the_game_starts() {
    let (mut session, a, _) = duel(locust(), locust());
    let settings = session.player(a).unwrap().settings;
    assert!(matches!(
        session.handle(a, ClientPacket::UpdateSettings(settings)),
        Err(GameError::WrongPhase { .. })
    ));
    assert!(matches!(
        session.handle(a, ClientPacket::AddEntity(atlas())),
        Err(GameError::WrongPhase { .. })
    ));
}

#[test]
fn late_joiner_receives_current_turn() {
    let (mut session, a, _) = duel(locust(), locust());
    let late = session.connect();
    let outbox = session.take_outbox();
    let seen = packets_for(&outbox, late);
    assert!(seen.contains(&&ServerPacket::PhaseChange(Phase::Movement)));
    assert!(seen.contains(&&ServerPacket::Turn(GameTurn::new(a))));
    assert!(seen
        .iter()
        .any(|p| matches!(p, ServerPacket::Entities(list) if list.len() == 2)));
}
