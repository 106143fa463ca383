//! Audio collaborator boundary.
//!
//! Everything the slot engine needs from the audio subsystem goes through
//! [`AudioBackend`]: the microphone permission query, audio-mode switching,
//! capture into a [`LiveCapture`], and playback into a [`PlaybackHandle`].
//! [`SystemAudioBackend`] is the device-backed implementation (cpal capture,
//! rodio playback, hound WAV output).

pub mod audio;
mod system;
mod utils;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

pub use crate::permissions::MicrophonePermission;
pub use system::SystemAudioBackend;
pub use utils::save_wav_file;

/// Errors raised by capture, playback and permission queries.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no input device found")]
    NoInputDevice,

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("failed to write recording: {0}")]
    Wav(#[from] hound::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The worker thread owning the device went away without reporting back.
    #[error("audio worker stopped unexpectedly")]
    WorkerGone,
}

/// Session-wide audio routing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Input enabled; set before a capture starts.
    Recording,
    /// Output only; restored once a capture ends.
    Playback,
}

/// What a playback session plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// A clip installed alongside the application.
    Bundled(PathBuf),
    /// A user recording, addressed by its stored locator.
    Recording(String),
}

impl AudioSource {
    pub fn path(&self) -> &Path {
        match self {
            AudioSource::Bundled(path) => path,
            AudioSource::Recording(locator) => Path::new(locator),
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Bundled(path) => write!(f, "bundled:{}", path.display()),
            AudioSource::Recording(locator) => write!(f, "recording:{}", locator),
        }
    }
}

/// Fixed capture quality. Sample rate and channel count follow the input
/// device; the preset decides the stored sample width and container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingPreset {
    pub name: &'static str,
    pub bits_per_sample: u16,
    pub extension: &'static str,
}

impl RecordingPreset {
    pub const HIGH_QUALITY: RecordingPreset = RecordingPreset {
        name: "high_quality",
        bits_per_sample: 16,
        extension: "wav",
    };
}

/// Shared stop flag for one playback. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct PlaybackStopper(Arc<AtomicBool>);

impl PlaybackStopper {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns one audio output resource from start to completion.
///
/// Dropping the handle raises its stop flag, so an abandoned handle never
/// keeps a device stream alive.
#[derive(Debug)]
pub struct PlaybackHandle {
    completion: oneshot::Receiver<Result<(), AudioError>>,
    stopper: PlaybackStopper,
}

impl PlaybackHandle {
    pub fn new(
        completion: oneshot::Receiver<Result<(), AudioError>>,
        stopper: PlaybackStopper,
    ) -> Self {
        Self {
            completion,
            stopper,
        }
    }

    pub fn stopper(&self) -> PlaybackStopper {
        self.stopper.clone()
    }

    /// Resolves when playback reaches its end, is stopped, or fails.
    pub async fn completion(&mut self) -> Result<(), AudioError> {
        match (&mut self.completion).await {
            Ok(result) => result,
            Err(_) => Err(AudioError::WorkerGone),
        }
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stopper.stop();
    }
}

/// A capture in progress. Exactly one of `finalize` or `discard` is expected
/// to be called; either one releases the input device.
#[async_trait]
pub trait LiveCapture: Send {
    /// Stops capturing, stores the audio and returns its locator.
    async fn finalize(&mut self) -> Result<String, AudioError>;

    /// Stops capturing and throws the audio away.
    async fn discard(&mut self);
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn request_permission(&self) -> Result<MicrophonePermission, AudioError>;

    async fn configure_mode(&self, mode: AudioMode) -> Result<(), AudioError>;

    async fn begin_capture(
        &self,
        slot: usize,
        preset: &RecordingPreset,
    ) -> Result<Box<dyn LiveCapture>, AudioError>;

    /// Starts playing `source` immediately. Every call allocates a fresh
    /// output resource, so the same source may play several times at once.
    async fn play(&self, source: &AudioSource) -> Result<PlaybackHandle, AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_handle_raises_stop_flag() {
        let (_tx, rx) = oneshot::channel();
        let stopper = PlaybackStopper::default();
        let handle = PlaybackHandle::new(rx, stopper.clone());
        assert!(!stopper.is_stopped());
        handle.release();
        assert!(stopper.is_stopped());
    }

    #[tokio::test]
    async fn completion_reports_worker_gone_when_sender_dropped() {
        let (tx, rx) = oneshot::channel();
        let mut handle = PlaybackHandle::new(rx, PlaybackStopper::default());
        drop(tx);
        assert!(matches!(
            handle.completion().await,
            Err(AudioError::WorkerGone)
        ));
    }

    #[test]
    fn recording_source_path_is_its_locator() {
        let source = AudioSource::Recording("/tmp/slot-0.wav".to_string());
        assert_eq!(source.path(), Path::new("/tmp/slot-0.wav"));
        assert_eq!(source.to_string(), "recording:/tmp/slot-0.wav");
    }
}
