pub mod fixed_sounds;
pub mod playback;
pub mod recordings;
pub mod slots;
pub mod visual_signal;
