use std::{
    sync::mpsc,
    thread::JoinHandle,
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, Sample, SizedSample,
};

use crate::audio_toolkit::AudioError;

/// How often the consumer loop checks for commands while no samples arrive.
const COMMAND_POLL: Duration = Duration::from_millis(10);

enum Cmd {
    Stop(mpsc::Sender<Vec<f32>>),
    Shutdown,
}

/// Interleaved sample layout of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Captures from an input device on a dedicated worker thread.
///
/// The cpal stream lives and dies on the worker; this side only holds the
/// command channel, so the recorder can move between threads freely.
pub struct AudioRecorder {
    cmd_tx: Option<mpsc::Sender<Cmd>>,
    worker_handle: Option<JoinHandle<()>>,
    format: CaptureFormat,
}

impl AudioRecorder {
    /// Opens `device` (or the default input) and starts capturing at once.
    pub fn open(device: Option<Device>) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = match device {
            Some(dev) => dev,
            None => host.default_input_device().ok_or(AudioError::NoInputDevice)?,
        };

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::Capture(e.to_string()))?;
        let format = CaptureFormat {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        let (sample_tx, sample_rx) = mpsc::channel::<Vec<f32>>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
        let (startup_tx, startup_rx) = mpsc::channel::<Result<(), AudioError>>();

        let worker = std::thread::Builder::new()
            .name("soundboard-capture".to_string())
            .spawn(move || {
                tracing::info!(
                    "Using device: {:?}, sample rate: {}, channels: {}, format: {:?}",
                    device.name(),
                    format.sample_rate,
                    format.channels,
                    config.sample_format()
                );

                let stream_result = match config.sample_format() {
                    cpal::SampleFormat::U8 => build_stream::<u8>(&device, &config, sample_tx),
                    cpal::SampleFormat::I8 => build_stream::<i8>(&device, &config, sample_tx),
                    cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, sample_tx),
                    cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, sample_tx),
                    cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, sample_tx),
                    other => Err(AudioError::Capture(format!(
                        "unsupported sample format {:?}",
                        other
                    ))),
                };

                let stream = match stream_result {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = startup_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = startup_tx.send(Err(AudioError::Capture(e.to_string())));
                    return;
                }

                let _ = startup_tx.send(Ok(()));

                // keep the stream alive while we collect samples
                run_consumer(sample_rx, cmd_rx);
            })?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                cmd_tx: Some(cmd_tx),
                worker_handle: Some(worker),
                format,
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(AudioError::WorkerGone),
        }
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Stops capturing, returns everything captured so far and closes the
    /// device.
    pub fn stop(&mut self) -> Result<Vec<f32>, AudioError> {
        let (resp_tx, resp_rx) = mpsc::channel();
        let tx = self.cmd_tx.take().ok_or(AudioError::WorkerGone)?;
        tx.send(Cmd::Stop(resp_tx))
            .map_err(|_| AudioError::WorkerGone)?;
        let samples = resp_rx.recv().map_err(|_| AudioError::WorkerGone)?;
        self.join_worker();
        Ok(samples)
    }

    pub fn close(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Cmd::Shutdown);
        }
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(h) = self.worker_handle.take() {
            if h.join().is_err() {
                tracing::error!("Capture worker panicked");
            }
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    sample_tx: mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream, AudioError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let stream_cb = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let buffer: Vec<f32> = data.iter().map(|&sample| sample.to_sample::<f32>()).collect();
        // the consumer hangs up once capture stops; late buffers are dropped
        let _ = sample_tx.send(buffer);
    };

    device
        .build_input_stream(
            &config.config(),
            stream_cb,
            |err| tracing::error!("Stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::Capture(e.to_string()))
}

fn run_consumer(sample_rx: mpsc::Receiver<Vec<f32>>, cmd_rx: mpsc::Receiver<Cmd>) {
    let mut captured = Vec::<f32>::new();

    loop {
        while let Ok(buf) = sample_rx.try_recv() {
            captured.extend_from_slice(&buf);
        }

        match cmd_rx.recv_timeout(COMMAND_POLL) {
            Ok(Cmd::Stop(reply_tx)) => {
                while let Ok(buf) = sample_rx.try_recv() {
                    captured.extend_from_slice(&buf);
                }
                let _ = reply_tx.send(captured);
                return;
            }
            Ok(Cmd::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }
}
