use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use crate::audio_toolkit::{AudioBackend, AudioSource, PlaybackHandle, PlaybackStopper};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pb-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Loaded,
    Playing,
    Finished,
    Errored,
}

/// One play cycle of one source.
///
/// A session that fails to start is `Errored` from the outset and holds no
/// resource; [`PlaybackSession::finished`] returns at once for it.
#[derive(Debug)]
pub struct PlaybackSession {
    id: SessionId,
    source: AudioSource,
    state: PlaybackState,
    handle: Option<PlaybackHandle>,
    stopper: PlaybackStopper,
}

impl PlaybackSession {
    pub async fn start(audio: &dyn AudioBackend, source: AudioSource) -> Self {
        let mut session = Self {
            id: SessionId::next(),
            source,
            state: PlaybackState::Loaded,
            handle: None,
            stopper: PlaybackStopper::default(),
        };

        match audio.play(&session.source).await {
            Ok(handle) => {
                session.stopper = handle.stopper();
                session.handle = Some(handle);
                session.state = PlaybackState::Playing;
                debug!(session = %session.id, "Playing {}", session.source);
            }
            Err(e) => {
                error!(session = %session.id, "Failed to play {}: {}", session.source, e);
                session.state = PlaybackState::Errored;
            }
        }

        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    pub fn stopper(&self) -> PlaybackStopper {
        self.stopper.clone()
    }

    pub fn stop(&self) {
        self.stopper.stop();
    }

    /// Wait for the end of playback and release the output resource.
    pub async fn finished(mut self) -> PlaybackState {
        let Some(mut handle) = self.handle.take() else {
            return self.state;
        };

        self.state = match handle.completion().await {
            Ok(()) => PlaybackState::Finished,
            Err(e) => {
                warn!(session = %self.id, "Playback of {} ended with error: {}", self.source, e);
                PlaybackState::Errored
            }
        };
        handle.release();

        debug!(session = %self.id, state = ?self.state, "Playback released");
        self.state
    }
}
