pub mod audio_toolkit;
pub mod cli;
pub mod managers;
pub mod permissions;
pub mod settings;
pub mod soundboard;
pub mod tracing_config;
mod utils;

#[cfg(test)]
mod test_support;

pub use cli::{CliArgs, ConsoleCommand};
pub use settings::SoundboardConfig;
pub use soundboard::Soundboard;
