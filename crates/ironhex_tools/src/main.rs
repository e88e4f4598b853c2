//! Ironhex data checker.
//!
//! ```text
//! ironhex-tools validate data/
//! ironhex-tools check unit data/units/atlas.ron
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ironhex_tools::validate::{self, DataKind};

#[derive(Parser)]
#[command(name = "ironhex-tools", version)]
#[command(about = "Check Ironhex unit and board files")]
struct Cli {
    /// Log every file checked
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check `units/*.ron` and `boards/*.ron` under a data directory
    Validate {
        #[arg(default_value = "data")]
        dir: PathBuf,
    },
    /// Check a single file
    Check {
        #[arg(value_enum)]
        kind: Kind,
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Unit,
    Board,
}

impl From<Kind> for DataKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Unit => DataKind::Unit,
            Kind::Board => DataKind::Board,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let result = match cli.command {
        Command::Validate { dir } => validate::validate_data_directory(&dir),
        Command::Check { kind, file } => validate::conclude(&validate::check_file(&file, kind.into())),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
