mod player;
mod recorder;

pub use player::start_playback;
pub use recorder::{AudioRecorder, CaptureFormat};
