//! The authoritative worker's view of the game.
//!
//! [`Lobby`] pairs the [`GameSession`] with the outbound queue of every
//! live connection. The network layer feeds it connections, frames and
//! disconnects one at a time; after each one the session's outbox is
//! routed to the matching queues.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::UnboundedSender;

use ironhex_core::player::PlayerId;
use ironhex_core::protocol::{decode, ClientPacket, Recipient, ServerPacket};
use ironhex_core::session::GameSession;

use crate::commands;

/// Session plus connection routing.
pub struct Lobby {
    pub(crate) session: GameSession,
    pub(crate) connections: BTreeMap<PlayerId, UnboundedSender<ServerPacket>>,
    pub(crate) motd: String,
    /// Dice for `/roll`, kept apart from the game's own.
    pub(crate) chat_rng: ChaCha8Rng,
}

impl Lobby {
    /// Wrap a session.
    #[must_use]
    pub fn new(session: GameSession, motd: impl Into<String>, seed: u64) -> Self {
        Self {
            session,
            connections: BTreeMap::new(),
            motd: motd.into(),
            chat_rng: ChaCha8Rng::seed_from_u64(seed.rotate_left(17)),
        }
    }

    /// The game.
    #[must_use]
    pub const fn session(&self) -> &GameSession {
        &self.session
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Register a connection and greet it.
    pub fn connect(&mut self, outbound: UnboundedSender<ServerPacket>) -> PlayerId {
        let id = self.session.connect();
        self.connections.insert(id, outbound);
        if !self.motd.is_empty() {
            let motd = self.motd.clone();
            self.session.server_chat(Recipient::Player(id), &motd);
        }
        self.flush();
        id
    }

    /// Handle one inbound frame. Malformed frames and rejected requests are
    /// logged and dropped.
    pub fn receive(&mut self, player: PlayerId, frame: &[u8]) {
        match decode::<ClientPacket>(frame) {
            Ok(packet) => self.handle(player, packet),
            Err(e) => tracing::warn!(player, error = %e, "dropping malformed frame"),
        }
    }

    /// Handle one decoded packet.
    pub fn handle(&mut self, player: PlayerId, packet: ClientPacket) {
        match packet {
            ClientPacket::Chat(text) if text.starts_with('/') => {
                commands::run(self, player, &text);
            }
            packet => {
                let name = packet.name();
                if let Err(e) = self.session.handle(player, packet) {
                    tracing::warn!(player, packet = name, error = %e, "dropping request");
                }
            }
        }
        self.flush();
    }

    /// A connection closed.
    pub fn disconnect(&mut self, player: PlayerId) {
        if self.connections.remove(&player).is_none() {
            return;
        }
        self.session.disconnect(player);
        self.flush();
    }

    /// Route the session's outbox to the connections.
    pub(crate) fn flush(&mut self) {
        for envelope in self.session.take_outbox() {
            for (id, outbound) in &self.connections {
                if envelope.recipient.includes(*id) && outbound.send(envelope.packet.clone()).is_err() {
                    tracing::debug!(player = id, "outbound queue closed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironhex_core::options::GameOptions;
    use ironhex_core::protocol::encode;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn lobby() -> Lobby {
        Lobby::new(GameSession::new(GameOptions::default(), 1), "Hello!", 1)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerPacket>) -> Vec<ServerPacket> {
        let mut packets = Vec::new();
        while let Ok(packet) = rx.try_recv() {
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn test_connect_greets_with_motd() {
        let mut lobby = lobby();
        let (tx, mut rx) = unbounded_channel();
        let id = lobby.connect(tx);
        let packets = drain(&mut rx);
        assert_eq!(packets[0], ServerPacket::Greeting { player: id });
        assert!(packets.contains(&ServerPacket::Chat("***Server: Hello!".into())));
    }

    #[test]
    fn test_packets_are_routed_to_recipients() {
        let mut lobby = lobby();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let a = lobby.connect(tx_a);
        lobby.connect(tx_b);
        drain(&mut rx_a);
        drain(&mut rx_b);

        let frame = encode(&ClientPacket::Chat("hi all".into())).unwrap();
        lobby.receive(a, &frame);
        let expected = ServerPacket::Chat(format!("Player {a}: hi all"));
        assert_eq!(drain(&mut rx_a), vec![expected.clone()]);
        assert_eq!(drain(&mut rx_b), vec![expected]);
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut lobby = lobby();
        let (tx, mut rx) = unbounded_channel();
        let id = lobby.connect(tx);
        drain(&mut rx);
        let before = lobby.session().state_hash();
        lobby.receive(id, &[0xde, 0xad, 0xbe, 0xef]);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(lobby.session().state_hash(), before);
    }

    #[test]
    fn test_disconnect_notifies_others() {
        let mut lobby = lobby();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, _rx_b) = unbounded_channel();
        lobby.connect(tx_a);
        let b = lobby.connect(tx_b);
        drain(&mut rx_a);
        lobby.disconnect(b);
        assert_eq!(lobby.connection_count(), 1);
        assert!(drain(&mut rx_a).contains(&ServerPacket::PlayerRemove(b)));
    }
}
