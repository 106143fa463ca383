use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use rodio::{Decoder, OutputStreamBuilder, Sink};
use tokio::sync::oneshot;
use tracing::debug;

use crate::audio_toolkit::{AudioError, PlaybackHandle, PlaybackStopper};

/// How often the playback worker checks for the end of the clip or a stop
/// request.
const PLAYBACK_POLL: Duration = Duration::from_millis(20);

/// Plays `path` on a dedicated worker thread with its own output stream.
///
/// Returns once the clip is decoded and queued, or with the error that kept
/// it from starting. The returned handle resolves when the clip ends or is
/// stopped.
pub async fn start_playback(path: PathBuf) -> Result<PlaybackHandle, AudioError> {
    let (started_tx, started_rx) = oneshot::channel::<Result<(), AudioError>>();
    let (done_tx, done_rx) = oneshot::channel::<Result<(), AudioError>>();
    let stopper = PlaybackStopper::default();
    let worker_stopper = stopper.clone();

    std::thread::Builder::new()
        .name("soundboard-playback".to_string())
        .spawn(move || {
            let mut stream = match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = started_tx.send(Err(AudioError::Playback(e.to_string())));
                    return;
                }
            };
            stream.log_on_drop(false);
            let sink = Sink::connect_new(stream.mixer());

            let decoded = File::open(&path)
                .map_err(AudioError::from)
                .and_then(|file| {
                    Decoder::new(BufReader::new(file))
                        .map_err(|e| AudioError::Playback(e.to_string()))
                });
            let source = match decoded {
                Ok(source) => source,
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                    return;
                }
            };

            sink.append(source);
            let _ = started_tx.send(Ok(()));

            while !sink.empty() {
                if worker_stopper.is_stopped() {
                    debug!("Stopping playback of {}", path.display());
                    sink.stop();
                    break;
                }
                std::thread::sleep(PLAYBACK_POLL);
            }

            let _ = done_tx.send(Ok(()));
            // output stream is dropped here, releasing the device
        })?;

    match started_rx.await {
        Ok(Ok(())) => Ok(PlaybackHandle::new(done_rx, stopper)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(AudioError::WorkerGone),
    }
}
