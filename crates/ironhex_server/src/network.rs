//! TCP front end.
//!
//! ```text
//! accept loop ──spawn──> connection task (one per socket)
//!                           │  frames in        ▲ packets out
//!                           ▼                   │
//!                      ┌─────────── worker task ───────────┐
//!                      │ Lobby: GameSession + routing      │
//!                      └───────────────────────────────────┘
//! ```
//!
//! Connection tasks only move bytes. Every game mutation happens on the
//! worker, one event at a time, in arrival order.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, unbounded_channel, UnboundedSender};
use tokio::sync::oneshot;

use ironhex_core::player::PlayerId;
use ironhex_core::protocol::ServerPacket;
use ironhex_core::session::GameSession;

use crate::boards::load_boards;
use crate::codec::{read_frame, send_packet};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::lobby::Lobby;

/// Queue depth between connections and the worker.
const EVENT_QUEUE: usize = 256;

/// Something for the worker to process.
#[derive(Debug)]
pub enum Event {
    /// A socket was accepted.
    Connected {
        /// Queue for packets to this connection.
        outbound: UnboundedSender<ServerPacket>,
        /// Where to report the assigned player id.
        assigned: oneshot::Sender<PlayerId>,
    },
    /// A frame arrived.
    Frame {
        /// Sender.
        player: PlayerId,
        /// Raw frame payload.
        bytes: Vec<u8>,
    },
    /// A socket closed.
    Disconnected(PlayerId),
}

/// Build the game from config.
#[must_use]
pub fn build_lobby(config: &ServerConfig) -> Lobby {
    let boards = config
        .board_dir
        .as_deref()
        .map(load_boards)
        .unwrap_or_default();
    let seed = config.seed_or_random();
    tracing::info!(seed, "dice seeded");
    let session = GameSession::new(config.options, seed)
        .with_password(config.password.clone())
        .with_boards(boards);
    Lobby::new(session, config.motd.clone(), seed)
}

/// Process events until every sender is gone.
pub async fn run_worker(mut lobby: Lobby, mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        match event {
            Event::Connected { outbound, assigned } => {
                let id = lobby.connect(outbound);
                if assigned.send(id).is_err() {
                    lobby.disconnect(id);
                }
            }
            Event::Frame { player, bytes } => lobby.receive(player, &bytes),
            Event::Disconnected(player) => lobby.disconnect(player),
        }
    }
    tracing::info!("worker stopped");
}

/// Bind the listener and serve forever.
///
/// # Errors
///
/// Returns an error if the port cannot be bound.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(address).await?;
    tracing::info!(%address, "listening");
    serve_on(listener, config).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if accepting fails.
pub async fn serve_on(listener: TcpListener, config: ServerConfig) -> Result<()> {
    let (events, receiver) = mpsc::channel(EVENT_QUEUE);
    tokio::spawn(run_worker(build_lobby(&config), receiver));

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "connection accepted");
        let events = events.clone();
        let max_frame_len = config.max_frame_len;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, events, max_frame_len).await {
                tracing::warn!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

/// Shuttle frames between one socket and the worker.
async fn handle_connection(
    stream: TcpStream,
    events: mpsc::Sender<Event>,
    max_frame_len: usize,
) -> Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
    }
    let (mut reader, mut writer) = stream.into_split();
    let (outbound, mut packets) = unbounded_channel();
    let (assigned, id) = oneshot::channel();
    events
        .send(Event::Connected { outbound, assigned })
        .await
        .map_err(|_| ServerError::WorkerGone)?;
    let player = id.await.map_err(|_| ServerError::WorkerGone)?;

    // Reads are not cancel-safe, so each direction runs as one whole future
    // and whichever finishes first closes the connection.
    let inbound = async {
        while let Some(bytes) = read_frame(&mut reader, max_frame_len).await? {
            events
                .send(Event::Frame { player, bytes })
                .await
                .map_err(|_| ServerError::WorkerGone)?;
        }
        Ok::<(), ServerError>(())
    };
    let outbound = async {
        // Ends when the worker drops the queue, as it does on a kick.
        while let Some(packet) = packets.recv().await {
            send_packet(&mut writer, &packet).await?;
        }
        Ok::<(), ServerError>(())
    };
    let result: Result<()> = tokio::select! {
        r = inbound => r,
        r = outbound => r,
    };

    tracing::info!(player, "connection closed");
    // The worker may already be gone at shutdown.
    let _ = events.send(Event::Disconnected(player)).await;
    result
}
