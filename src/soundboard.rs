use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::audio_toolkit::AudioBackend;
use crate::managers::fixed_sounds::{FixedSoundRegistry, SoundError};
use crate::managers::recordings::{RecordingStats, RecordingStore};
use crate::managers::slots::{SlotController, SlotError, SlotView};
use crate::managers::visual_signal::{SignalEvent, SoundVisualState, VisualSignalBroker};
use crate::permissions::PermissionGate;
use crate::settings::SoundboardConfig;

/// The whole board: recordable slots plus the fixed sounds, wired to one
/// audio backend and one recording store.
pub struct Soundboard {
    gate: Arc<PermissionGate>,
    store: Arc<RecordingStore>,
    broker: Arc<VisualSignalBroker>,
    sounds: FixedSoundRegistry,
    slots: Vec<SlotController>,
}

impl Soundboard {
    /// Open storage, ask for microphone access and restore saved recordings.
    /// Must be called from within a tokio runtime.
    pub async fn start(
        config: SoundboardConfig,
        audio: Arc<dyn AudioBackend>,
    ) -> anyhow::Result<Self> {
        let store = RecordingStore::new(config.recordings_dir(), config.db_path())
            .context("Failed to initialize recording store")?;
        if let Err(e) = store.ensure_schema().await {
            error!("Failed to prepare recordings table: {}", e);
        }
        let store = Arc::new(store);

        let gate = Arc::new(PermissionGate::new(Arc::clone(&audio)));
        gate.request_access().await;

        let broker = Arc::new(VisualSignalBroker::new(config.flash_interval));
        let sounds = FixedSoundRegistry::with_defaults(
            config.resources_dir(),
            Arc::clone(&audio),
            Arc::clone(&broker),
        );

        let slots = (0..config.slot_count)
            .map(|index| {
                SlotController::new(
                    index,
                    Arc::clone(&gate),
                    Arc::clone(&store),
                    Arc::clone(&audio),
                    config.recording_preset,
                )
            })
            .collect();

        let board = Self {
            gate,
            store,
            broker,
            sounds,
            slots,
        };
        board.reload_slots().await;

        info!(
            slots = board.slots.len(),
            data_dir = %config.data_dir.display(),
            "Soundboard ready"
        );
        Ok(board)
    }

    async fn reload_slots(&self) {
        let recordings = self.store.list_all().await;
        for slot in &self.slots {
            slot.rehydrate(recordings.get(&slot.index()).cloned());
        }
        for index in recordings.keys().filter(|i| **i >= self.slots.len()) {
            warn!("Ignoring stored recording for slot {} beyond the board", index);
        }
    }

    /// Primary button of `slot`. Returns the slot afterwards, or `None` when
    /// there is no such slot.
    pub async fn primary_action(&self, slot: usize) -> Option<SlotView> {
        let controller = self.slot(slot)?;
        if let Err(e) = controller.primary_action().await {
            log_slot_error(slot, &e);
        }
        Some(controller.view())
    }

    /// Secondary (long press) button of `slot`.
    pub async fn secondary_action(&self, slot: usize) -> Option<SlotView> {
        let controller = self.slot(slot)?;
        if let Err(e) = controller.secondary_action().await {
            log_slot_error(slot, &e);
        }
        Some(controller.view())
    }

    /// Play a fixed sound. Unknown names are logged and leave every
    /// indicator alone.
    pub async fn play_sound(&self, name: &str) -> SoundVisualState {
        match self.sounds.play(name).await {
            Ok(_) => {}
            Err(SoundError::UnknownSound(unknown)) => {
                warn!("No fixed sound named '{}'", unknown)
            }
        }
        self.broker.state(name)
    }

    pub fn slot_view(&self, slot: usize) -> Option<SlotView> {
        self.slot(slot).map(SlotController::view)
    }

    pub fn slot_views(&self) -> Vec<SlotView> {
        self.slots.iter().map(SlotController::view).collect()
    }

    pub fn sound_view(&self, name: &str) -> SoundVisualState {
        self.broker.state(name)
    }

    pub fn sound_names(&self) -> Vec<String> {
        self.sounds.names().map(str::to_string).collect()
    }

    /// Indicator changes of the fixed sounds.
    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.broker.subscribe()
    }

    /// Ask again, e.g. after the user changed the OS setting.
    pub async fn request_microphone_access(&self) -> bool {
        self.gate.request_access().await
    }

    pub fn microphone_granted(&self) -> bool {
        self.gate.is_granted()
    }

    pub async fn storage_usage(&self) -> anyhow::Result<RecordingStats> {
        self.store
            .storage_usage()
            .await
            .context("Failed to read recording storage usage")
    }

    fn slot(&self, slot: usize) -> Option<&SlotController> {
        let controller = self.slots.get(slot);
        if controller.is_none() {
            warn!("No slot {} (board has {})", slot, self.slots.len());
        }
        controller
    }
}

fn log_slot_error(slot: usize, e: &SlotError) {
    match e {
        SlotError::PermissionDenied => info!(slot, "Not recording: microphone access not granted"),
        SlotError::Busy(_) => warn!(slot, "Ignoring trigger: {}", e),
        SlotError::Audio(_) | SlotError::Storage(_) => error!(slot, "Slot action failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::slots::SlotState;
    use crate::test_support::{wait_until, MockAudioBackend};
    use tempfile::TempDir;

    async fn start_board(dir: &TempDir, audio: &Arc<MockAudioBackend>) -> Soundboard {
        let config = SoundboardConfig::new(dir.path().join("data"), dir.path().join("res"));
        Soundboard::start(config, audio.clone())
            .await
            .expect("start soundboard")
    }

    #[tokio::test]
    async fn fresh_board_has_idle_slots_and_default_sounds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = MockAudioBackend::new();
        let board = start_board(&dir, &audio).await;

        let views = board.slot_views();
        assert_eq!(views.len(), 3);
        assert!(views.iter().all(|v| v.state == SlotState::Idle && v.label == "Record"));
        assert_eq!(board.sound_names(), vec!["applause", "drumroll", "rimshot"]);
        assert!(board.microphone_granted());
    }

    #[tokio::test]
    async fn recording_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = MockAudioBackend::new();

        {
            let board = start_board(&dir, &audio).await;
            board.primary_action(1).await.expect("slot 1");
            let view = board.primary_action(1).await.expect("slot 1");
            assert_eq!(view.state, SlotState::Playable);
        }

        let board = start_board(&dir, &audio).await;
        let view = board.slot_view(1).expect("slot 1");
        assert_eq!(view.state, SlotState::Playable);
        assert_eq!(view.label, "Play");
        assert_eq!(view.locator.as_deref(), Some("mock://slot-1-0.wav"));
        assert_eq!(board.slot_view(0).map(|v| v.state), Some(SlotState::Idle));
    }

    #[tokio::test]
    async fn denied_microphone_keeps_slots_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = MockAudioBackend::new();
        audio.set_permission(false);
        let board = start_board(&dir, &audio).await;

        let view = board.primary_action(0).await.expect("slot 0");
        assert_eq!(view.state, SlotState::Idle);
        assert_eq!(audio.captures_started(), 0);

        audio.set_permission(true);
        assert!(board.request_microphone_access().await);
        let view = board.primary_action(0).await.expect("slot 0");
        assert_eq!(view.state, SlotState::Recording);
    }

    #[tokio::test]
    async fn fixed_sound_and_slots_are_independent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = MockAudioBackend::new();
        let board = start_board(&dir, &audio).await;

        let state = board.play_sound("applause").await;
        assert!(state.is_playing);

        board.primary_action(0).await.expect("slot 0");
        assert_eq!(board.slot_view(0).map(|v| v.state), Some(SlotState::Recording));
        assert!(board.sound_view("applause").is_playing);

        audio.complete_playback(0);
        wait_until(|| !board.sound_view("applause").is_playing).await;
        assert_eq!(board.slot_view(0).map(|v| v.state), Some(SlotState::Recording));
    }

    #[tokio::test]
    async fn unknown_slot_and_sound_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = MockAudioBackend::new();
        let board = start_board(&dir, &audio).await;

        assert!(board.primary_action(7).await.is_none());
        assert!(board.secondary_action(7).await.is_none());
        assert_eq!(board.play_sound("kazoo").await, SoundVisualState::default());
        assert_eq!(audio.playback_count(), 0);
    }

    #[tokio::test]
    async fn storage_usage_reports_saved_recordings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = MockAudioBackend::new();
        let board = start_board(&dir, &audio).await;

        board.primary_action(2).await;
        board.primary_action(2).await;
        let stats = board.storage_usage().await.expect("stats");
        assert_eq!(stats.total_entries, 1);
    }
}
