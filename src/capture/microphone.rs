//! Microphone capture adapter
//!
//! Dedicated low-latency audio-input tap, independent of the screen
//! capture session. Hardware buffers are converted to canonical mono f32
//! chunks and forwarded to the active sink; the sink decides whether a
//! chunk is accepted, so this adapter never queues.

use crate::capture::convert;
use crate::capture::stream::SampleSink;
use crate::error::{RecordingError, Result};
use crate::sample::{AudioChunk, AudioSource, Sample};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Microphone input tap feeding the encoding sink
pub struct MicrophoneCaptureAdapter {
    device_name: Option<String>,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneCaptureAdapter {
    /// `device_name` selects a specific input device; `None` uses the
    /// system default.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Start the input tap and begin forwarding chunks to `sink`.
    ///
    /// A missing device or an invalid reported hardware format is treated
    /// as a microphone-authorization failure: several platforms report
    /// exactly that shape when access is denied.
    pub fn start(&mut self, sink: Arc<dyn SampleSink>) -> Result<()> {
        let device = self.find_device()?;
        let device_label = device.name().unwrap_or_else(|_| "unknown".to_string());

        let config = device
            .default_input_config()
            .map_err(|_| RecordingError::MicrophoneNotAuthorized)?;

        validate_hardware_format(config.sample_rate().0, config.channels())?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let sample_format = config.sample_format();
        let stream_config = config.config();

        tracing::info!(
            "starting microphone tap: {device_label} ({sample_rate}Hz, {channels}ch, {sample_format:?})"
        );

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let started = Instant::now();

        // cpal streams are not Send; a dedicated thread owns the stream
        // for the lifetime of the session.
        let thread = std::thread::spawn(move || {
            let forward = move |samples: Vec<f32>| {
                let mono = convert::remix(&samples, channels, 1);
                let chunk = AudioChunk::new(
                    mono,
                    sample_rate,
                    1,
                    started.elapsed(),
                    AudioSource::Microphone,
                );
                sink.append(Sample::Audio(chunk));
            };

            let stream = match sample_format {
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| forward(data.to_vec()),
                    |err| tracing::error!("microphone stream error: {err}"),
                    None,
                ),
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        forward(convert::i16_to_f32(data))
                    },
                    |err| tracing::error!("microphone stream error: {err}"),
                    None,
                ),
                cpal::SampleFormat::U16 => device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        forward(convert::u16_to_f32(data))
                    },
                    |err| tracing::error!("microphone stream error: {err}"),
                    None,
                ),
                other => {
                    tracing::error!("unsupported microphone sample format: {other:?}");
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!("failed to build microphone stream: {e}");
                    return;
                }
            };

            if let Err(e) = stream.play() {
                tracing::error!("failed to start microphone stream: {e}");
                return;
            }

            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }

            tracing::info!("microphone tap stopped");
        });

        self.thread = Some(thread);
        Ok(())
    }

    /// Stop the tap and wait for the stream thread to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();

        if let Some(wanted) = &self.device_name {
            let mut devices = host
                .input_devices()
                .map_err(|_| RecordingError::MicrophoneNotAuthorized)?;
            return devices
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or(RecordingError::MicrophoneNotAuthorized);
        }

        host.default_input_device()
            .ok_or(RecordingError::MicrophoneNotAuthorized)
    }
}

impl Drop for MicrophoneCaptureAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reject hardware formats that cannot carry audio. A zero sample rate or
/// channel count is what some platforms report when access was denied.
pub(crate) fn validate_hardware_format(sample_rate: u32, channels: u16) -> Result<()> {
    if sample_rate == 0 || channels == 0 {
        return Err(RecordingError::MicrophoneNotAuthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sample_rate_is_an_authorization_failure() {
        assert!(matches!(
            validate_hardware_format(0, 2),
            Err(RecordingError::MicrophoneNotAuthorized)
        ));
    }

    #[test]
    fn zero_channels_is_an_authorization_failure() {
        assert!(matches!(
            validate_hardware_format(44_100, 0),
            Err(RecordingError::MicrophoneNotAuthorized)
        ));
    }

    #[test]
    fn sane_format_is_accepted() {
        assert!(validate_hardware_format(48_000, 1).is_ok());
    }
}
