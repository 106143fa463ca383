use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio_toolkit::RecordingPreset;

/// Number of recordable slots.
pub const DEFAULT_SLOT_COUNT: usize = 3;

/// Blink period of a fixed sound's indicator while it plays.
pub const DEFAULT_FLASH_INTERVAL: Duration = Duration::from_millis(75);

const RECORDINGS_DIR_NAME: &str = "recordings";
const DATABASE_FILE_NAME: &str = "soundboard.db";
const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, Clone)]
pub struct SoundboardConfig {
    pub slot_count: usize,
    pub flash_interval: Duration,
    pub recording_preset: RecordingPreset,
    /// Holds the database, recordings and logs.
    pub data_dir: PathBuf,
    /// Holds the bundled clips.
    pub resources_dir: PathBuf,
}

impl SoundboardConfig {
    pub fn new(data_dir: impl Into<PathBuf>, resources_dir: impl Into<PathBuf>) -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            flash_interval: DEFAULT_FLASH_INTERVAL,
            recording_preset: RecordingPreset::HIGH_QUALITY,
            data_dir: data_dir.into(),
            resources_dir: resources_dir.into(),
        }
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.data_dir.join(RECORDINGS_DIR_NAME)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIR_NAME)
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }
}
