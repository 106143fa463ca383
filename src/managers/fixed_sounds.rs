use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::audio_toolkit::{AudioBackend, AudioSource};
use crate::managers::playback::{PlaybackSession, PlaybackState, SessionId};
use crate::managers::visual_signal::VisualSignalBroker;

/// Clips installed with the application, in display order.
pub const DEFAULT_SOUNDS: [&str; 3] = ["applause", "drumroll", "rimshot"];

const BUNDLED_CLIP_EXTENSION: &str = "wav";

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("unknown sound: {0}")]
    UnknownSound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSound {
    pub name: String,
    pub resource: PathBuf,
}

impl FixedSound {
    pub fn new(name: impl Into<String>, resource: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
        }
    }
}

/// The immutable set of fixed sounds. Any sound can play any number of times
/// at once; each play is its own session.
pub struct FixedSoundRegistry {
    sounds: Vec<FixedSound>,
    audio: Arc<dyn AudioBackend>,
    broker: Arc<VisualSignalBroker>,
}

impl FixedSoundRegistry {
    /// Later entries with an already registered name are ignored.
    pub fn new(
        entries: impl IntoIterator<Item = FixedSound>,
        audio: Arc<dyn AudioBackend>,
        broker: Arc<VisualSignalBroker>,
    ) -> Self {
        let mut sounds: Vec<FixedSound> = Vec::new();
        for sound in entries {
            if sounds.iter().any(|s| s.name == sound.name) {
                warn!("Ignoring duplicate fixed sound '{}'", sound.name);
                continue;
            }
            sounds.push(sound);
        }

        Self {
            sounds,
            audio,
            broker,
        }
    }

    /// Registry of [`DEFAULT_SOUNDS`], each resolved to
    /// `<resources_dir>/<name>.wav`.
    pub fn with_defaults(
        resources_dir: &Path,
        audio: Arc<dyn AudioBackend>,
        broker: Arc<VisualSignalBroker>,
    ) -> Self {
        let entries = DEFAULT_SOUNDS.iter().map(|name| {
            FixedSound::new(
                *name,
                resources_dir.join(format!("{}.{}", name, BUNDLED_CLIP_EXTENSION)),
            )
        });
        Self::new(entries, audio, broker)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sounds.iter().map(|s| s.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&FixedSound> {
        self.sounds.iter().find(|s| s.name == name)
    }

    /// Start a new playback of `name`. The indicator lights as soon as the
    /// playback has started and clears when this session's audio ends.
    pub async fn play(&self, name: &str) -> Result<SessionId, SoundError> {
        let sound = self
            .get(name)
            .ok_or_else(|| SoundError::UnknownSound(name.to_string()))?;

        let session =
            PlaybackSession::start(&*self.audio, AudioSource::Bundled(sound.resource.clone()))
                .await;
        let id = session.id();

        if session.state() == PlaybackState::Errored {
            // nothing is playing, so the indicator never lights
            return Ok(id);
        }

        self.broker.session_started(&sound.name, id);

        let broker = Arc::clone(&self.broker);
        let name = sound.name.clone();
        tokio::spawn(async move {
            let outcome = session.finished().await;
            debug!(sound = %name, session = %id, ?outcome, "Fixed sound ended");
            broker.session_ended(&name, id);
        });

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::visual_signal::SoundVisualState;
    use crate::test_support::{wait_until, MockAudioBackend};
    use std::time::Duration;

    fn setup() -> (Arc<MockAudioBackend>, Arc<VisualSignalBroker>, FixedSoundRegistry) {
        let audio = MockAudioBackend::new();
        let broker = Arc::new(VisualSignalBroker::new(Duration::from_millis(75)));
        let registry =
            FixedSoundRegistry::with_defaults(Path::new("/res"), audio.clone(), broker.clone());
        (audio, broker, registry)
    }

    #[test]
    fn defaults_resolve_to_bundled_wavs() {
        let (_audio, _broker, registry) = setup();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["applause", "drumroll", "rimshot"]
        );
        assert_eq!(
            registry.get("rimshot").map(|s| s.resource.clone()),
            Some(PathBuf::from("/res/rimshot.wav"))
        );
    }

    #[test]
    fn duplicate_names_keep_first_entry() {
        let audio = MockAudioBackend::new();
        let broker = Arc::new(VisualSignalBroker::new(Duration::from_millis(75)));
        let registry = FixedSoundRegistry::new(
            vec![
                FixedSound::new("applause", "/a.wav"),
                FixedSound::new("applause", "/b.wav"),
            ],
            audio,
            broker,
        );
        assert_eq!(registry.names().count(), 1);
        assert_eq!(
            registry.get("applause").map(|s| s.resource.clone()),
            Some(PathBuf::from("/a.wav"))
        );
    }

    #[tokio::test]
    async fn applause_lights_until_playback_completes() {
        let (audio, broker, registry) = setup();

        registry.play("applause").await.expect("play applause");
        assert_eq!(
            broker.state("applause"),
            SoundVisualState {
                is_playing: true,
                is_flashing: true,
            }
        );
        assert_eq!(
            audio.playback_source(0),
            AudioSource::Bundled(PathBuf::from("/res/applause.wav"))
        );

        audio.complete_playback(0);
        wait_until(|| !broker.state("applause").is_playing).await;
        assert_eq!(broker.state("applause"), SoundVisualState::default());
    }

    #[tokio::test]
    async fn same_sound_twice_settles_after_its_own_completion() {
        let (audio, broker, registry) = setup();

        let first = registry.play("applause").await.expect("first play");
        let second = registry.play("applause").await.expect("second play");
        assert_ne!(first, second);
        assert_eq!(audio.playback_count(), 2);

        audio.complete_playback(0);
        // give the first completion time to land
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(broker.state("applause").is_playing);

        audio.complete_playback(1);
        wait_until(|| broker.state("applause") == SoundVisualState::default()).await;
    }

    #[tokio::test]
    async fn different_sounds_play_at_once() {
        let (audio, broker, registry) = setup();

        registry.play("applause").await.expect("applause");
        registry.play("rimshot").await.expect("rimshot");
        assert!(broker.state("applause").is_playing);
        assert!(broker.state("rimshot").is_playing);
        assert!(!broker.state("drumroll").is_playing);

        audio.complete_playback(1);
        wait_until(|| !broker.state("rimshot").is_playing).await;
        assert!(broker.state("applause").is_playing);
    }

    #[tokio::test]
    async fn playback_error_clears_indicator() {
        let (audio, broker, registry) = setup();

        registry.play("drumroll").await.expect("play");
        audio.break_playback(0);
        wait_until(|| !broker.state("drumroll").is_playing).await;
        assert!(!broker.state("drumroll").is_flashing);
    }

    #[tokio::test]
    async fn failed_start_never_lights() {
        let (audio, broker, registry) = setup();
        audio.fail_playback(true);

        registry.play("applause").await.expect("play is still accepted");
        assert_eq!(broker.state("applause"), SoundVisualState::default());
    }

    #[tokio::test]
    async fn unknown_sound_is_rejected() {
        let (audio, _broker, registry) = setup();
        let err = registry.play("kazoo").await.expect_err("unknown sound");
        assert!(matches!(err, SoundError::UnknownSound(name) if name == "kazoo"));
        assert_eq!(audio.playback_count(), 0);
    }
}
