//! Scripted audio backend for tests: permission, capture and playback
//! completion are all driven by the test.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::audio_toolkit::{
    AudioBackend, AudioError, AudioMode, AudioSource, LiveCapture, MicrophonePermission,
    PlaybackHandle, PlaybackStopper, RecordingPreset,
};

pub struct MockPlayback {
    pub source: AudioSource,
    pub stopper: PlaybackStopper,
    done: Option<oneshot::Sender<Result<(), AudioError>>>,
}

#[derive(Default)]
pub struct MockAudioBackend {
    denied: AtomicBool,
    fail_permission: AtomicBool,
    fail_capture: AtomicBool,
    fail_finalize: AtomicBool,
    fail_playback: AtomicBool,
    next_capture: AtomicUsize,
    released_captures: Arc<AtomicUsize>,
    discarded_captures: Arc<AtomicUsize>,
    modes: Mutex<Vec<AudioMode>>,
    playbacks: Mutex<Vec<MockPlayback>>,
    capture_dir: Mutex<Option<PathBuf>>,
    finalize_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockAudioBackend {
    /// Permission is granted unless the test says otherwise.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_permission(&self, granted: bool) {
        self.denied.store(!granted, Ordering::SeqCst);
    }

    pub fn fail_permission_query(&self, fail: bool) {
        self.fail_permission.store(fail, Ordering::SeqCst);
    }

    pub fn fail_capture(&self, fail: bool) {
        self.fail_capture.store(fail, Ordering::SeqCst);
    }

    pub fn fail_finalize(&self, fail: bool) {
        self.fail_finalize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_playback(&self, fail: bool) {
        self.fail_playback.store(fail, Ordering::SeqCst);
    }

    /// Finalized captures are written as real files into `dir`.
    pub fn write_captures_into(&self, dir: &Path) {
        *self.capture_dir.lock().expect("capture dir lock") = Some(dir.to_path_buf());
    }

    /// The next capture's `finalize` waits until the returned sender fires
    /// (or is dropped).
    pub fn hold_next_finalize(&self) -> oneshot::Sender<()> {
        let (release_tx, release_rx) = oneshot::channel();
        *self.finalize_gate.lock().expect("finalize gate lock") = Some(release_rx);
        release_tx
    }

    pub fn captures_started(&self) -> usize {
        self.next_capture.load(Ordering::SeqCst)
    }

    /// Captures that were finalized or discarded.
    pub fn captures_released(&self) -> usize {
        self.released_captures.load(Ordering::SeqCst)
    }

    pub fn captures_discarded(&self) -> usize {
        self.discarded_captures.load(Ordering::SeqCst)
    }

    pub fn modes(&self) -> Vec<AudioMode> {
        self.modes.lock().expect("modes lock").clone()
    }

    pub fn playback_count(&self) -> usize {
        self.playbacks.lock().expect("playbacks lock").len()
    }

    pub fn playback_source(&self, index: usize) -> AudioSource {
        self.playbacks.lock().expect("playbacks lock")[index]
            .source
            .clone()
    }

    pub fn playback_stopper(&self, index: usize) -> PlaybackStopper {
        self.playbacks.lock().expect("playbacks lock")[index]
            .stopper
            .clone()
    }

    /// Let playback `index` reach its natural end.
    pub fn complete_playback(&self, index: usize) {
        self.resolve_playback(index, Ok(()));
    }

    /// Make playback `index` fail after it started.
    pub fn break_playback(&self, index: usize) {
        self.resolve_playback(index, Err(AudioError::Playback("device lost".to_string())));
    }

    fn resolve_playback(&self, index: usize, result: Result<(), AudioError>) {
        let done = self.playbacks.lock().expect("playbacks lock")[index]
            .done
            .take()
            .expect("playback already resolved");
        let _ = done.send(result);
    }
}

#[async_trait]
impl AudioBackend for MockAudioBackend {
    async fn request_permission(&self) -> Result<MicrophonePermission, AudioError> {
        if self.fail_permission.load(Ordering::SeqCst) {
            return Err(AudioError::Capture("permission service unavailable".to_string()));
        }
        if self.denied.load(Ordering::SeqCst) {
            Ok(MicrophonePermission::Denied)
        } else {
            Ok(MicrophonePermission::Authorized)
        }
    }

    async fn configure_mode(&self, mode: AudioMode) -> Result<(), AudioError> {
        self.modes.lock().expect("modes lock").push(mode);
        Ok(())
    }

    async fn begin_capture(
        &self,
        slot: usize,
        preset: &RecordingPreset,
    ) -> Result<Box<dyn LiveCapture>, AudioError> {
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(AudioError::NoInputDevice);
        }
        let n = self.next_capture.fetch_add(1, Ordering::SeqCst);
        let file_name = format!("slot-{}-{}.{}", slot, n, preset.extension);
        let file = self
            .capture_dir
            .lock()
            .expect("capture dir lock")
            .as_ref()
            .map(|dir| dir.join(&file_name));
        let locator = match &file {
            Some(path) => path.to_string_lossy().into_owned(),
            None => format!("mock://{}", file_name),
        };
        Ok(Box::new(MockCapture {
            locator,
            file,
            gate: self.finalize_gate.lock().expect("finalize gate lock").take(),
            fail: self.fail_finalize.load(Ordering::SeqCst),
            released: Arc::clone(&self.released_captures),
            discarded: Arc::clone(&self.discarded_captures),
        }))
    }

    async fn play(&self, source: &AudioSource) -> Result<PlaybackHandle, AudioError> {
        if self.fail_playback.load(Ordering::SeqCst) {
            return Err(AudioError::Playback("no output device".to_string()));
        }
        let (done_tx, done_rx) = oneshot::channel();
        let stopper = PlaybackStopper::default();
        self.playbacks.lock().expect("playbacks lock").push(MockPlayback {
            source: source.clone(),
            stopper: stopper.clone(),
            done: Some(done_tx),
        });
        Ok(PlaybackHandle::new(done_rx, stopper))
    }
}

struct MockCapture {
    locator: String,
    file: Option<PathBuf>,
    gate: Option<oneshot::Receiver<()>>,
    fail: bool,
    released: Arc<AtomicUsize>,
    discarded: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveCapture for MockCapture {
    async fn finalize(&mut self) -> Result<String, AudioError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.take() {
            let _ = gate.await;
        }
        if self.fail {
            return Err(AudioError::Capture("encoder failed".to_string()));
        }
        if let Some(path) = &self.file {
            std::fs::write(path, b"RIFF")?;
        }
        Ok(self.locator.clone())
    }

    async fn discard(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
