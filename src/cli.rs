use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;

use crate::settings::SoundboardConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "soundboard", about = "Record, replay and fire sound effects")]
pub struct CliArgs {
    /// Where the database, recordings and logs live
    #[arg(long, default_value = "./soundboard-data")]
    pub data_dir: PathBuf,

    /// Directory holding the bundled clips (applause.wav, ...)
    #[arg(long, default_value = "./resources")]
    pub resources_dir: PathBuf,

    /// Enable debug mode with verbose logging
    #[arg(long)]
    pub debug: bool,
}

impl CliArgs {
    pub fn to_config(&self) -> SoundboardConfig {
        SoundboardConfig::new(self.data_dir.clone(), self.resources_dir.clone())
    }
}

/// One line typed into the console driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Fire a fixed sound.
    Sound(String),
    /// Primary action of a slot.
    Slot(usize),
    /// Secondary action of a slot.
    Hold(usize),
    /// Ask for microphone access again.
    Permission,
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid slot index '{0}'")]
    InvalidSlot(String),
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err(CommandParseError::Empty);
        };
        let argument = words.next();

        match command.to_ascii_lowercase().as_str() {
            "sound" | "play" => argument
                .map(|name| ConsoleCommand::Sound(name.to_string()))
                .ok_or(CommandParseError::MissingArgument("sound")),
            "slot" => parse_slot(argument, "slot").map(ConsoleCommand::Slot),
            "hold" => parse_slot(argument, "hold").map(ConsoleCommand::Hold),
            "permission" => Ok(ConsoleCommand::Permission),
            "status" => Ok(ConsoleCommand::Status),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

fn parse_slot(argument: Option<&str>, command: &'static str) -> Result<usize, CommandParseError> {
    let argument = argument.ok_or(CommandParseError::MissingArgument(command))?;
    argument
        .parse()
        .map_err(|_| CommandParseError::InvalidSlot(argument.to_string()))
}
