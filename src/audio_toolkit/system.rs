use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::audio_toolkit::audio::{start_playback, AudioRecorder};
use crate::audio_toolkit::{
    save_wav_file, AudioBackend, AudioError, AudioMode, AudioSource, LiveCapture,
    MicrophonePermission, PlaybackHandle, RecordingPreset,
};
use crate::permissions::check_microphone_permission;
use crate::utils::lock_or_recover;

/// Device-backed audio: cpal for capture, rodio for playback.
pub struct SystemAudioBackend {
    recordings_dir: PathBuf,
    mode: Mutex<AudioMode>,
}

impl SystemAudioBackend {
    pub fn new(recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            recordings_dir: recordings_dir.into(),
            mode: Mutex::new(AudioMode::Playback),
        }
    }
}

#[async_trait]
impl AudioBackend for SystemAudioBackend {
    async fn request_permission(&self) -> Result<MicrophonePermission, AudioError> {
        Ok(tokio::task::spawn_blocking(check_microphone_permission).await?)
    }

    async fn configure_mode(&self, mode: AudioMode) -> Result<(), AudioError> {
        let mut current = lock_or_recover(&self.mode);
        if *current != mode {
            debug!("Audio mode {:?} -> {:?}", *current, mode);
            *current = mode;
        }
        Ok(())
    }

    async fn begin_capture(
        &self,
        slot: usize,
        preset: &RecordingPreset,
    ) -> Result<Box<dyn LiveCapture>, AudioError> {
        let recorder = tokio::task::spawn_blocking(|| AudioRecorder::open(None)).await??;

        let file_name = format!(
            "slot-{}-{}.{}",
            slot,
            Utc::now().timestamp_millis(),
            preset.extension
        );
        let file_path = self.recordings_dir.join(file_name);
        info!(slot, "Capture started into {:?}", file_path);

        Ok(Box::new(CpalCapture {
            recorder: Some(recorder),
            file_path,
            preset: *preset,
        }))
    }

    async fn play(&self, source: &AudioSource) -> Result<PlaybackHandle, AudioError> {
        start_playback(source.path().to_path_buf()).await
    }
}

struct CpalCapture {
    recorder: Option<AudioRecorder>,
    file_path: PathBuf,
    preset: RecordingPreset,
}

#[async_trait]
impl LiveCapture for CpalCapture {
    async fn finalize(&mut self) -> Result<String, AudioError> {
        let mut recorder = self.recorder.take().ok_or(AudioError::WorkerGone)?;
        let (samples, format) = tokio::task::spawn_blocking(move || {
            let format = recorder.format();
            recorder.stop().map(|samples| (samples, format))
        })
        .await??;

        debug!(
            "Captured {} samples ({} Hz, {} channels)",
            samples.len(),
            format.sample_rate,
            format.channels
        );
        if let Err(e) = save_wav_file(&self.file_path, samples, format, self.preset).await {
            if self.file_path.exists() {
                if let Err(remove_err) = std::fs::remove_file(&self.file_path) {
                    tracing::error!(
                        "Failed to remove partial recording {:?}: {}",
                        self.file_path,
                        remove_err
                    );
                }
            }
            return Err(e);
        }
        Ok(self.file_path.to_string_lossy().into_owned())
    }

    async fn discard(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            let closed = tokio::task::spawn_blocking(move || recorder.close()).await;
            if let Err(e) = closed {
                tracing::error!("Failed to close discarded capture: {}", e);
            }
            debug!("Discarded capture for {:?}", self.file_path);
        }
    }
}
