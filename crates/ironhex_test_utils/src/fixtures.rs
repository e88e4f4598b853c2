//! Test fixtures and helpers.
//!
//! Standard units, boards and sessions for consistent testing.

use ironhex_core::board::{Board, BoardData, Hex};
use ironhex_core::data::UnitData;
use ironhex_core::dice::ScriptedDice;
use ironhex_core::entity::Location;
use ironhex_core::hex::HexCoord;
use ironhex_core::options::GameOptions;
use ironhex_core::phase::Phase;
use ironhex_core::player::PlayerId;
use ironhex_core::protocol::ClientPacket;
use ironhex_core::session::GameSession;

/// 20 ton scout: fast, lightly armed.
#[must_use]
pub fn locust() -> UnitData {
    UnitData::mech("Locust", "LCT-1V", 20, 8)
        .with_crew("Scout", 4, 5)
        .with_armor(Location::Head, 6, 0)
        .with_armor(Location::CenterTorso, 10, 2)
        .with_armor(Location::LeftTorso, 8, 2)
        .with_armor(Location::RightTorso, 8, 2)
        .with_armor(Location::LeftLeg, 8, 0)
        .with_armor(Location::RightLeg, 8, 0)
        .with_item("medium_laser", Location::CenterTorso)
}

/// 50 ton line mech: medium laser RA (0), AC/10 RT (1), AC/10 ammo RT (2).
#[must_use]
pub fn centurion() -> UnitData {
    UnitData::mech("Centurion", "CN9-A", 50, 4)
        .with_crew("Pilot", 4, 5)
        .with_armor(Location::Head, 9, 0)
        .with_armor(Location::CenterTorso, 16, 5)
        .with_armor(Location::LeftTorso, 12, 4)
        .with_armor(Location::RightTorso, 12, 4)
        .with_armor(Location::LeftArm, 10, 0)
        .with_armor(Location::RightArm, 10, 0)
        .with_armor(Location::LeftLeg, 12, 0)
        .with_armor(Location::RightLeg, 12, 0)
        .with_item("medium_laser", Location::RightArm)
        .with_item("ac_10", Location::RightTorso)
        .with_item("ammo:ac_10", Location::RightTorso)
}

/// 100 ton assault mech: medium lasers in both arms (0, 1), LRM 10 LT (2).
#[must_use]
pub fn atlas() -> UnitData {
    UnitData::mech("Atlas", "AS7-D", 100, 3)
        .with_crew("Veteran", 3, 4)
        .with_armor(Location::Head, 9, 0)
        .with_armor(Location::CenterTorso, 47, 14)
        .with_armor(Location::LeftTorso, 32, 10)
        .with_armor(Location::RightTorso, 32, 10)
        .with_armor(Location::LeftArm, 34, 0)
        .with_armor(Location::RightArm, 34, 0)
        .with_armor(Location::LeftLeg, 41, 0)
        .with_armor(Location::RightLeg, 41, 0)
        .with_item("medium_laser", Location::LeftArm)
        .with_item("medium_laser", Location::RightArm)
        .with_item("lrm_10", Location::LeftTorso)
}

/// Board with a wooded ridge across the middle and a river to the south.
#[must_use]
pub fn ridge_board() -> Board {
    let mut hexes = Vec::new();
    for x in 0..16 {
        hexes.push((HexCoord::new(x, 8), Hex::clear(2).with_woods(1)));
        hexes.push((HexCoord::new(x, 12), Hex::clear(0).with_water(1)));
    }
    let data = BoardData {
        name: "ridge".to_string(),
        width: 16,
        height: 17,
        base: Hex::default(),
        hexes,
    };
    Board::from_data(&data).expect("ridge board is valid")
}

/// Session with scripted dice that roll `totals` first and 7 afterwards.
#[must_use]
pub fn scripted_session(totals: Vec<i32>) -> GameSession {
    GameSession::with_dice(
        GameOptions::default(),
        Box::new(ScriptedDice::new(totals).with_fallback(7)),
    )
}

/// Ready every connected player until the session reaches `phase`.
///
/// # Panics
///
/// Panics if the session stops advancing or a ready request is refused.
pub fn ready_until(session: &mut GameSession, phase: Phase) {
    for _ in 0..16 {
        if session.phase() == phase {
            return;
        }
        assert!(
            session.phase().advances_when_all_ready(),
            "stuck in {} waiting for {phase}",
            session.phase()
        );
        let ids: Vec<PlayerId> = session
            .players()
            .values()
            .filter(|p| !p.ghost)
            .map(|p| p.id)
            .collect();
        for id in ids {
            if session.phase().advances_when_all_ready() {
                session
                    .handle(id, ClientPacket::PlayerReady(true))
                    .expect("ready accepted");
            }
        }
    }
    panic!("never reached {phase}");
}

/// Two players with the given units, readied into the movement phase of
/// round one. Player 1 rolls 5 for initiative and player 2 rolls 9, so
/// player 1 moves first.
///
/// # Panics
///
/// Panics if a unit is rejected.
#[must_use]
pub fn duel(first: UnitData, second: UnitData) -> (GameSession, PlayerId, PlayerId) {
    let mut session = scripted_session(vec![5, 9]);
    let a = session.connect();
    let b = session.connect();
    session
        .handle(a, ClientPacket::AddEntity(first))
        .expect("first unit accepted");
    session
        .handle(b, ClientPacket::AddEntity(second))
        .expect("second unit accepted");
    ready_until(&mut session, Phase::Movement);
    session.take_outbox();
    (session, a, b)
}
