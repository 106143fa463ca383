//! Microphone permission checking and the gate consulted before recording.
//!
//! The gate resolves access once at startup through the audio backend and
//! caches the answer, so every record attempt can check it synchronously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::HostTrait;
use tracing::{debug, error, info, warn};

use crate::audio_toolkit::AudioBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophonePermission {
    /// User has granted permission (device is accessible)
    Authorized,
    /// User has denied permission or access is otherwise blocked
    Denied,
}

/// Check the current microphone permission status.
///
/// A portable audio host cannot query the OS consent state, so an accessible
/// default input device counts as authorized.
pub fn check_microphone_permission() -> MicrophonePermission {
    if cpal::default_host().default_input_device().is_some() {
        debug!("Microphone permission: Authorized");
        MicrophonePermission::Authorized
    } else {
        warn!("Microphone permission: Denied (no input device)");
        MicrophonePermission::Denied
    }
}

pub struct PermissionGate {
    audio: Arc<dyn AudioBackend>,
    granted: AtomicBool,
}

impl PermissionGate {
    pub fn new(audio: Arc<dyn AudioBackend>) -> Self {
        Self {
            audio,
            granted: AtomicBool::new(false),
        }
    }

    /// Ask the backend for microphone access and remember the answer.
    /// A failed query counts as denied.
    pub async fn request_access(&self) -> bool {
        let granted = match self.audio.request_permission().await {
            Ok(MicrophonePermission::Authorized) => true,
            Ok(MicrophonePermission::Denied) => false,
            Err(e) => {
                error!("Microphone permission request failed: {}", e);
                false
            }
        };

        self.granted.store(granted, Ordering::SeqCst);
        info!(granted, "Microphone access resolved");
        granted
    }

    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}
