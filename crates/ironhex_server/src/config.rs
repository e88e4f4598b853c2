//! Server configuration.
//!
//! Settings come from an optional RON file; command-line flags override
//! whatever the file says.
//!
//! # Example RON
//!
//! ```ron
//! ServerConfig(
//!     port: 2346,
//!     password: Some("letmein"),
//!     motd: "Welcome to the arena.",
//!     board_dir: Some("data/boards"),
//!     options: (double_blind: true),
//! )
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use ironhex_core::options::GameOptions;

use crate::error::{Result, ServerError};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 2346;

/// Default upper bound on a single inbound frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Password for option changes and privileged chat commands.
    pub password: Option<String>,
    /// Message of the day, sent to each player on connect.
    pub motd: String,
    /// Directory of RON board files.
    pub board_dir: Option<PathBuf>,
    /// Dice seed. Random when unset.
    pub seed: Option<u64>,
    /// Largest accepted inbound frame in bytes.
    pub max_frame_len: usize,
    /// Initial game options.
    pub options: GameOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            password: None,
            motd: "Welcome to ironhex.".to_string(),
            board_dir: None,
            seed: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            options: GameOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Load a config from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or not valid RON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ServerError::ConfigNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse a config from a RON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid RON.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        Ok(ron::from_str(ron)?)
    }

    /// Builder: apply command-line overrides.
    #[must_use]
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if cli.password.is_some() {
            self.password.clone_from(&cli.password);
        }
        if cli.seed.is_some() {
            self.seed = cli.seed;
        }
        if cli.boards.is_some() {
            self.board_dir.clone_from(&cli.boards);
        }
        self
    }

    /// Seed to use, drawing one from the clock when none is configured.
    #[must_use]
    pub fn seed_or_random(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos() as u64)
        })
    }
}

/// Command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "ironhex_server")]
#[command(about = "Dedicated server for turn-based armored hex combat")]
#[command(version)]
pub struct Cli {
    /// RON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Password for option changes and privileged commands
    #[arg(long)]
    pub password: Option<String>,

    /// Dice seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory of RON board files
    #[arg(long)]
    pub boards: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective config: file (or defaults), then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded.
    pub fn resolve(&self) -> Result<ServerConfig> {
        let base = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        Ok(base.with_cli(self))
    }
}
