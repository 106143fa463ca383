use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use crate::audio_toolkit::audio::CaptureFormat;
use crate::audio_toolkit::{AudioError, RecordingPreset};

/// Save interleaved f32 samples as an integer PCM WAV file.
pub async fn save_wav_file<P: AsRef<Path>>(
    file_path: P,
    samples: Vec<f32>,
    format: CaptureFormat,
    preset: RecordingPreset,
) -> Result<(), AudioError> {
    let file_path = file_path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || write_wav(&file_path, &samples, format, preset)).await?
}

fn write_wav(
    file_path: &Path,
    samples: &[f32],
    format: CaptureFormat,
    preset: RecordingPreset,
) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: preset.bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(file_path, spec)?;
    let scale = ((1_i64 << (preset.bits_per_sample - 1)) - 1) as f32;
    for sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * scale) as i32)?;
    }
    writer.finalize()?;

    debug!("Saved WAV file: {:?}", file_path);
    Ok(())
}
