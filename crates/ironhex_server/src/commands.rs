//! Chat commands.
//!
//! A chat line starting with `/` is a command. The first word names it and
//! the rest are its arguments. `/kick` and `/reset` take the server
//! password as their first argument when one is configured.

use rand::Rng;

use ironhex_core::phase::Phase;
use ironhex_core::player::PlayerId;
use ironhex_core::protocol::Recipient;

use crate::lobby::Lobby;

/// Reply to an unknown command.
pub const UNKNOWN_COMMAND: &str = "Command not recognized. Type /help for a list of commands.";

/// Most dice a single `/roll` may throw.
pub const MAX_ROLL_DICE: u32 = 20;

/// Every command with its usage line.
pub const COMMANDS: [(&str, &str); 6] = [
    ("help", "/help [command] - list commands or describe one."),
    ("kick", "/kick [password] <player id> - disconnect a player."),
    ("reset", "/reset [password] - abandon the game and return to the lounge."),
    ("roll", "/roll [NdS] - roll dice for everyone to see, 2d6 by default."),
    ("victory", "/victory - declare victory for your side at the end of the round."),
    ("who", "/who - list connected players."),
];

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// List commands or describe one.
    Help(Option<String>),
    /// Disconnect a player.
    Kick {
        /// Password, when one is configured.
        password: Option<String>,
        /// Target id as typed.
        target: String,
    },
    /// Return to the lounge.
    Reset {
        /// Password, when one is configured.
        password: Option<String>,
    },
    /// Roll dice.
    Roll {
        /// Number of dice.
        count: u32,
        /// Sides per die.
        sides: u32,
    },
    /// Force victory.
    Victory,
    /// List players.
    Who,
}

/// Why a command line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No such command.
    Unknown,
    /// Known command, bad arguments. Holds the usage line.
    Usage(&'static str),
}

fn usage(name: &str) -> &'static str {
    COMMANDS
        .iter()
        .find(|(n, _)| *n == name)
        .map_or(UNKNOWN_COMMAND, |(_, u)| u)
}

/// Parse `NdS`, `N` or nothing into a dice count and size.
fn parse_dice(arg: Option<&str>) -> Option<(u32, u32)> {
    let Some(arg) = arg else {
        return Some((2, 6));
    };
    let (count, sides) = match arg.split_once(['d', 'D']) {
        Some((count, sides)) => {
            let count = if count.is_empty() { 1 } else { count.parse().ok()? };
            (count, sides.parse().ok()?)
        }
        None => (arg.parse().ok()?, 6),
    };
    ((1..=MAX_ROLL_DICE).contains(&count) && (2..=100).contains(&sides)).then_some((count, sides))
}

/// Parse a command line. `with_password` says whether privileged commands
/// carry a password argument.
///
/// # Errors
///
/// Returns [`ParseError`] for unknown commands or bad arguments.
pub fn parse(line: &str, with_password: bool) -> Result<ServerCommand, ParseError> {
    let mut words = line.trim().trim_start_matches('/').split_whitespace();
    let name = words.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = words.collect();
    let bad = || ParseError::Usage(usage(&name));
    let mut rest = args.iter().copied();
    let mut password = || {
        if with_password {
            rest.next().map(str::to_string)
        } else {
            None
        }
    };
    match name.as_str() {
        "help" => Ok(ServerCommand::Help(args.first().map(|a| a.to_lowercase()))),
        "who" => Ok(ServerCommand::Who),
        "victory" => Ok(ServerCommand::Victory),
        "roll" => {
            let (count, sides) = parse_dice(args.first().copied()).ok_or_else(bad)?;
            Ok(ServerCommand::Roll { count, sides })
        }
        "reset" => Ok(ServerCommand::Reset { password: password() }),
        "kick" => {
            let password = password();
            let target = rest.next().ok_or_else(bad)?.to_string();
            Ok(ServerCommand::Kick { password, target })
        }
        _ => Err(ParseError::Unknown),
    }
}

/// Parse and run a command line from a player.
pub fn run(lobby: &mut Lobby, player: PlayerId, line: &str) {
    let reply_to = Recipient::Player(player);
    let command = match parse(line, lobby.session.has_password()) {
        Ok(command) => command,
        Err(ParseError::Unknown) => {
            lobby.session.server_chat(reply_to, UNKNOWN_COMMAND);
            return;
        }
        Err(ParseError::Usage(text)) => {
            lobby.session.server_chat(reply_to, &format!("Usage: {text}"));
            return;
        }
    };
    tracing::info!(player, ?command, "chat command");
    let name = lobby
        .session
        .player(player)
        .map_or_else(|| format!("Player {player}"), |p| p.name.clone());

    match command {
        ServerCommand::Help(None) => {
            let names: Vec<&str> = COMMANDS.iter().map(|(n, _)| *n).collect();
            let text = format!(
                "Available commands: {}. Type /help [command] for details.",
                names.join(", ")
            );
            lobby.session.server_chat(reply_to, &text);
        }
        ServerCommand::Help(Some(topic)) => {
            lobby.session.server_chat(reply_to, usage(&topic));
        }
        ServerCommand::Who => {
            let mut text = String::from("Connected players:");
            for (id, p) in lobby.session.players() {
                if lobby.connections.contains_key(id) {
                    text.push_str(&format!("\n  {id}: {}", p.name));
                }
            }
            lobby.session.server_chat(reply_to, &text);
        }
        ServerCommand::Roll { count, sides } => {
            let rolls: Vec<u32> = (0..count)
                .map(|_| lobby.chat_rng.gen_range(1..=sides))
                .collect();
            let total: u32 = rolls.iter().sum();
            let detail: Vec<String> = rolls.iter().map(u32::to_string).collect();
            let text = format!("{name} rolls {count}d{sides}: {} = {total}", detail.join(" + "));
            lobby.session.server_chat(Recipient::All, &text);
        }
        ServerCommand::Victory => {
            if lobby.session.phase() == Phase::Lounge {
                lobby.session.server_chat(reply_to, "No game in progress.");
                return;
            }
            lobby.session.force_victory(player);
            lobby.session.server_chat(
                Recipient::All,
                &format!("{name} declared victory. The game ends with this round."),
            );
        }
        ServerCommand::Reset { password } => {
            if lobby.session.check_password(password.as_deref()).is_err() {
                lobby.session.server_chat(reply_to, "Wrong password.");
                return;
            }
            lobby
                .session
                .server_chat(Recipient::All, &format!("{name} reset the game."));
            lobby.session.reset();
        }
        ServerCommand::Kick { password, target } => {
            if lobby.session.check_password(password.as_deref()).is_err() {
                lobby.session.server_chat(reply_to, "Wrong password.");
                return;
            }
            let Some(target) = target
                .parse::<PlayerId>()
                .ok()
                .filter(|id| lobby.connections.contains_key(id))
            else {
                lobby
                    .session
                    .server_chat(reply_to, &format!("No connected player '{target}'."));
                return;
            };
            let kicked = lobby
                .session
                .player(target)
                .map_or_else(|| format!("Player {target}"), |p| p.name.clone());
            lobby
                .session
                .server_chat(Recipient::All, &format!("{name} kicked {kicked}."));
            lobby.flush();
            // Dropping the queue closes the connection.
            lobby.connections.remove(&target);
            lobby.session.disconnect(target);
        }
    }
}
