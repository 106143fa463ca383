use std::fs;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use soundboard_lib::audio_toolkit::SystemAudioBackend;
use soundboard_lib::{tracing_config, CliArgs, ConsoleCommand, Soundboard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = args.to_config();

    let log_dir = config.log_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    tracing_config::init_tracing(&log_dir, args.debug)?;

    let audio = Arc::new(SystemAudioBackend::new(config.recordings_dir()));
    let board = Soundboard::start(config, audio).await?;

    let mut events = board.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(sound = %event.name, state = ?event.state, "Indicator changed");
        }
    });

    print_json(&json!({
        "slots": board.slot_views(),
        "sounds": board.sound_names(),
        "microphone": board.microphone_granted(),
    }))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                print_json(&json!({ "error": e.to_string() }))?;
                continue;
            }
        };

        match command {
            ConsoleCommand::Sound(name) => {
                let state = board.play_sound(&name).await;
                print_json(&json!({ "sound": name, "state": state }))?;
            }
            ConsoleCommand::Slot(index) => {
                print_json(&json!({ "slot": board.primary_action(index).await }))?;
            }
            ConsoleCommand::Hold(index) => {
                print_json(&json!({ "slot": board.secondary_action(index).await }))?;
            }
            ConsoleCommand::Permission => {
                let granted = board.request_microphone_access().await;
                print_json(&json!({ "microphone": granted }))?;
            }
            ConsoleCommand::Status => {
                let sounds: serde_json::Map<String, serde_json::Value> = board
                    .sound_names()
                    .into_iter()
                    .map(|name| {
                        let state = json!(board.sound_view(&name));
                        (name, state)
                    })
                    .collect();
                let storage = match board.storage_usage().await {
                    Ok(stats) => Some(stats),
                    Err(e) => {
                        warn!("{:#}", e);
                        None
                    }
                };
                print_json(&json!({
                    "slots": board.slot_views(),
                    "sounds": sounds,
                    "storage": storage,
                }))?;
            }
            ConsoleCommand::Quit => break,
        }
    }

    info!("Soundboard shutting down");
    tracing_config::shutdown_tracing();
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
