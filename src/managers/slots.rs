use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio_toolkit::{
    AudioBackend, AudioError, AudioMode, AudioSource, LiveCapture, PlaybackStopper,
    RecordingPreset,
};
use crate::managers::playback::{PlaybackSession, PlaybackState, SessionId};
use crate::managers::recordings::{RecordingStore, StoreError};
use crate::permissions::PermissionGate;
use crate::utils::lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Idle,
    Recording,
    Playable,
    PlayingBack,
}

impl SlotState {
    pub fn label(self) -> &'static str {
        action_label(
            self == SlotState::Recording,
            matches!(self, SlotState::Playable | SlotState::PlayingBack),
        )
    }
}

/// Button label for a slot.
pub fn action_label(is_recording: bool, has_recording: bool) -> &'static str {
    if is_recording {
        "Stop"
    } else if has_recording {
        "Play"
    } else {
        "Record"
    }
}

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("slot {0} is busy with another action")]
    Busy(usize),

    #[error("microphone access not granted")]
    PermissionDenied,

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Snapshot of one slot for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub index: usize,
    pub state: SlotState,
    pub label: &'static str,
    pub is_recording: bool,
    pub has_recording: bool,
    pub locator: Option<String>,
}

#[derive(Default)]
struct SlotInner {
    locator: Option<String>,
    capture: Option<Box<dyn LiveCapture>>,
    /// Capture taken out for finalizing; the slot still reads as recording.
    finalizing: bool,
    busy: bool,
}

/// Clears the busy flag when the transition ends, however it ends.
struct TransitionGuard<'a> {
    inner: &'a Mutex<SlotInner>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        lock_or_recover(self.inner).busy = false;
    }
}

/// One record/play slot.
///
/// ```text
/// Idle --primary--> Recording --primary--> Playable --primary--> PlayingBack
///  ^                    |                     |                      |
///  +------ secondary ---+---------------------+----------------------+
/// ```
///
/// A slot runs one transition at a time. Playbacks started from
/// `Playable`/`PlayingBack` run on their own; the slot reads `PlayingBack`
/// until the last of them completes.
pub struct SlotController {
    index: usize,
    gate: Arc<PermissionGate>,
    store: Arc<RecordingStore>,
    audio: Arc<dyn AudioBackend>,
    preset: RecordingPreset,
    inner: Mutex<SlotInner>,
    playbacks: Arc<Mutex<HashMap<SessionId, PlaybackStopper>>>,
}

impl SlotController {
    pub fn new(
        index: usize,
        gate: Arc<PermissionGate>,
        store: Arc<RecordingStore>,
        audio: Arc<dyn AudioBackend>,
        preset: RecordingPreset,
    ) -> Self {
        Self {
            index,
            gate,
            store,
            audio,
            preset,
            inner: Mutex::new(SlotInner::default()),
            playbacks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        let inner = lock_or_recover(&self.inner);
        if inner.capture.is_some() || inner.finalizing {
            SlotState::Recording
        } else if inner.locator.is_some() {
            if lock_or_recover(&self.playbacks).is_empty() {
                SlotState::Playable
            } else {
                SlotState::PlayingBack
            }
        } else {
            SlotState::Idle
        }
    }

    pub fn view(&self) -> SlotView {
        let state = self.state();
        let locator = lock_or_recover(&self.inner).locator.clone();
        SlotView {
            index: self.index,
            state,
            label: state.label(),
            is_recording: state == SlotState::Recording,
            has_recording: locator.is_some(),
            locator,
        }
    }

    /// Load the stored locator at startup. Ignored while a capture is live.
    pub fn rehydrate(&self, locator: Option<String>) {
        let mut inner = lock_or_recover(&self.inner);
        if inner.capture.is_some() || inner.finalizing {
            warn!(slot = self.index, "Not rehydrating a slot that is recording");
            return;
        }
        inner.locator = locator;
    }

    /// Record, stop, or play, depending on the current state.
    pub async fn primary_action(&self) -> Result<SlotState, SlotError> {
        let _transition = self.begin_transition()?;

        match self.state() {
            SlotState::Idle => self.start_recording().await?,
            SlotState::Recording => self.stop_recording().await?,
            SlotState::Playable | SlotState::PlayingBack => self.play_recording().await,
        }

        Ok(self.state())
    }

    /// Reset the slot to `Idle` from any state: a live capture is discarded,
    /// playbacks are stopped and the stored recording is removed.
    pub async fn secondary_action(&self) -> Result<SlotState, SlotError> {
        let _transition = self.begin_transition()?;

        let capture = lock_or_recover(&self.inner).capture.take();
        if let Some(mut capture) = capture {
            capture.discard().await;
            drop(capture);
            self.restore_playback_mode().await;
            info!(slot = self.index, "Recording discarded");
        }

        self.stop_playbacks();

        self.store.remove(self.index).await?;
        lock_or_recover(&self.inner).locator = None;
        info!(slot = self.index, "Slot cleared");

        Ok(self.state())
    }

    fn begin_transition(&self) -> Result<TransitionGuard<'_>, SlotError> {
        let mut inner = lock_or_recover(&self.inner);
        if inner.busy {
            return Err(SlotError::Busy(self.index));
        }
        inner.busy = true;
        Ok(TransitionGuard { inner: &self.inner })
    }

    async fn start_recording(&self) -> Result<(), SlotError> {
        if !self.gate.is_granted() {
            return Err(SlotError::PermissionDenied);
        }

        self.audio.configure_mode(AudioMode::Recording).await?;

        let capture = match self.audio.begin_capture(self.index, &self.preset).await {
            Ok(capture) => capture,
            Err(e) => {
                self.restore_playback_mode().await;
                return Err(e.into());
            }
        };

        lock_or_recover(&self.inner).capture = Some(capture);
        info!(slot = self.index, preset = self.preset.name, "Recording started");
        Ok(())
    }

    async fn stop_recording(&self) -> Result<(), SlotError> {
        let capture = {
            let mut inner = lock_or_recover(&self.inner);
            let capture = inner.capture.take();
            inner.finalizing = capture.is_some();
            capture
        };
        let Some(mut capture) = capture else {
            return Ok(());
        };

        let finalized = capture.finalize().await;
        drop(capture);
        self.restore_playback_mode().await;

        let saved: Result<_, SlotError> = match finalized {
            Ok(locator) => {
                debug!(slot = self.index, "Recording finalized at {}", locator);
                match self.store.upsert(self.index, &locator).await {
                    Ok(recordings) => Ok(recordings),
                    Err(e) => {
                        // no row points at the new file
                        self.store.discard_file(&locator);
                        Err(e.into())
                    }
                }
            }
            Err(e) => Err(e.into()),
        };

        let mut inner = lock_or_recover(&self.inner);
        inner.finalizing = false;
        let recordings = saved?;
        inner.locator = recordings.get(&self.index).cloned();
        info!(slot = self.index, "Recording saved");
        Ok(())
    }

    async fn play_recording(&self) {
        let Some(locator) = lock_or_recover(&self.inner).locator.clone() else {
            return;
        };

        let session = PlaybackSession::start(&*self.audio, AudioSource::Recording(locator)).await;
        if session.state() == PlaybackState::Errored {
            return;
        }

        let id = session.id();
        lock_or_recover(&self.playbacks).insert(id, session.stopper());

        let playbacks = Arc::clone(&self.playbacks);
        let slot = self.index;
        tokio::spawn(async move {
            let outcome = session.finished().await;
            lock_or_recover(&playbacks).remove(&id);
            debug!(slot, session = %id, ?outcome, "Slot playback ended");
        });
    }

    fn stop_playbacks(&self) {
        let stopped: Vec<(SessionId, PlaybackStopper)> =
            lock_or_recover(&self.playbacks).drain().collect();
        for (id, stopper) in stopped {
            stopper.stop();
            debug!(slot = self.index, session = %id, "Stopped slot playback");
        }
    }

    async fn restore_playback_mode(&self) {
        if let Err(e) = self.audio.configure_mode(AudioMode::Playback).await {
            warn!(slot = self.index, "Failed to restore playback mode: {}", e);
        }
    }
}
