//! # Ironhex Dedicated Server
//!
//! Hosts one [`ironhex_core::session::GameSession`] over TCP.
//!
//! - [`config`] - RON config file and command-line overrides
//! - [`codec`] - length-prefixed bincode frames
//! - [`network`] - accept loop, connection tasks and the single worker
//! - [`lobby`] - routes the session's outbox to connections
//! - [`commands`] - `/` chat commands
//! - [`boards`] - board files

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod boards;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod lobby;
pub mod network;

pub use config::{Cli, ServerConfig};
pub use error::{Result, ServerError};
