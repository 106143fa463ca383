//! Playing/flashing indicators for fixed sounds.
//!
//! Every playback session gets its own flash timer. The indicator of a sound
//! name is the aggregate over that name's live sessions: it is playing while
//! any session is live, and lit while any live session is in its lit phase.
//! Finishing one session therefore never clears an indicator another session
//! of the same name still drives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::managers::playback::SessionId;
use crate::utils::lock_or_recover;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SoundVisualState {
    pub is_playing: bool,
    pub is_flashing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalEvent {
    pub name: String,
    pub state: SoundVisualState,
}

/// Aborts the blink task when the owning session entry goes away.
struct FlashTimer(JoinHandle<()>);

impl Drop for FlashTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct ActiveFlash {
    lit: bool,
    _timer: FlashTimer,
}

#[derive(Default)]
struct BrokerInner {
    sounds: HashMap<String, HashMap<SessionId, ActiveFlash>>,
}

impl BrokerInner {
    fn visual_state(&self, name: &str) -> SoundVisualState {
        match self.sounds.get(name) {
            Some(sessions) if !sessions.is_empty() => SoundVisualState {
                is_playing: true,
                is_flashing: sessions.values().any(|flash| flash.lit),
            },
            _ => SoundVisualState::default(),
        }
    }
}

pub struct VisualSignalBroker {
    flash_interval: Duration,
    inner: Arc<Mutex<BrokerInner>>,
    events: broadcast::Sender<SignalEvent>,
}

impl VisualSignalBroker {
    pub fn new(flash_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            flash_interval,
            inner: Arc::new(Mutex::new(BrokerInner::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, name: &str) -> SoundVisualState {
        lock_or_recover(&self.inner).visual_state(name)
    }

    /// A session of `name` started: light the indicator and start its blink.
    /// Must be called from within a tokio runtime.
    pub fn session_started(&self, name: &str, id: SessionId) {
        let timer = self.spawn_flash_timer(name.to_string(), id);

        let (before, after) = {
            let mut inner = lock_or_recover(&self.inner);
            let before = inner.visual_state(name);
            inner.sounds.entry(name.to_string()).or_default().insert(
                id,
                ActiveFlash {
                    lit: true,
                    _timer: timer,
                },
            );
            (before, inner.visual_state(name))
        };

        debug!(sound = name, session = %id, "Indicator on");
        publish(&self.events, name, before, after);
    }

    /// A session of `name` finished or failed: stop its blink and drop it
    /// from the aggregate.
    pub fn session_ended(&self, name: &str, id: SessionId) {
        let (before, after) = {
            let mut inner = lock_or_recover(&self.inner);
            let before = inner.visual_state(name);
            if let Some(sessions) = inner.sounds.get_mut(name) {
                sessions.remove(&id);
                if sessions.is_empty() {
                    inner.sounds.remove(name);
                }
            }
            (before, inner.visual_state(name))
        };

        debug!(sound = name, session = %id, "Indicator session ended");
        publish(&self.events, name, before, after);
    }

    fn spawn_flash_timer(&self, name: String, id: SessionId) -> FlashTimer {
        let inner = Arc::downgrade(&self.inner);
        let events = self.events.clone();
        let period = self.flash_interval;

        FlashTimer(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !toggle(&inner, &events, &name, id) {
                    break;
                }
            }
        }))
    }
}

/// Flip the lit phase of one session. Returns false once the session (or the
/// broker) is gone.
fn toggle(
    inner: &Weak<Mutex<BrokerInner>>,
    events: &broadcast::Sender<SignalEvent>,
    name: &str,
    id: SessionId,
) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };

    let (before, after) = {
        let mut inner = lock_or_recover(&inner);
        let before = inner.visual_state(name);
        let Some(flash) = inner.sounds.get_mut(name).and_then(|s| s.get_mut(&id)) else {
            return false;
        };
        flash.lit = !flash.lit;
        (before, inner.visual_state(name))
    };

    publish(events, name, before, after);
    true
}

fn publish(
    events: &broadcast::Sender<SignalEvent>,
    name: &str,
    before: SoundVisualState,
    after: SoundVisualState,
) {
    if before != after {
        // no subscribers is fine
        let _ = events.send(SignalEvent {
            name: name.to_string(),
            state: after,
        });
    }
}
