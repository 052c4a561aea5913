//! Capture stream backend
//!
//! Wraps one live capture session producing independent video and audio
//! sample streams. Producers forward each sample to the active sink with
//! a non-blocking append; when the sink is not ready the sample is
//! dropped, never queued. Mid-session irrecoverable stream termination is
//! reported as a `CaptureEvent`, not an error return.

use crate::capture::convert;
use crate::config::RecordingRegion;
use crate::error::{RecordingError, Result};
use crate::sample::{AudioChunk, AudioSource, Sample, VideoFrame};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex as ParkingMutex;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Events a capture backend reports outside the sample path
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The capture stream ended and cannot be recovered mid-session
    Terminated { reason: String },
}

/// Destination for captured samples.
///
/// `append` must return quickly: implementations perform no blocking work
/// and report `false` when the sample was dropped.
pub trait SampleSink: Send + Sync {
    fn append(&self, sample: Sample) -> bool;
}

/// Parameters a backend needs to start capturing
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub region: RecordingRegion,
    pub fps: u32,
    pub capture_system_audio: bool,
    pub show_cursor: bool,
}

/// Pluggable capture backend, selected at construction.
///
/// The crate ships a real ffmpeg-based implementation and a scripted one
/// for tests and demos.
#[async_trait]
pub trait CaptureBackend: Send {
    async fn start(
        &mut self,
        config: CaptureConfig,
        sink: Arc<dyn SampleSink>,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<()>;

    async fn stop(&mut self);
}

/// Screen capture via an ffmpeg grab input decoded to raw RGBA frames.
///
/// ffmpeg writes `rawvideo` to stdout; a reader thread slices it into
/// frames, timestamps them on a monotonic capture clock and forwards them
/// to the sink. System audio, when requested, comes from a loopback tap
/// on the default output device.
pub struct FfmpegGrabBackend {
    running: Arc<AtomicBool>,
    child: Arc<ParkingMutex<Option<Child>>>,
    video_thread: Option<std::thread::JoinHandle<()>>,
    audio_thread: Option<std::thread::JoinHandle<()>>,
    frame_size_override: Option<(u32, u32)>,
}

impl FfmpegGrabBackend {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            child: Arc::new(ParkingMutex::new(None)),
            video_thread: None,
            audio_thread: None,
            frame_size_override: None,
        }
    }

    /// Force the capture dimensions instead of the region default
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size_override = Some((width, height));
        self
    }

    fn dimensions(&self, region: &RecordingRegion) -> (u32, u32) {
        if let Some(size) = self.frame_size_override {
            return size;
        }
        match region {
            RecordingRegion::Area { rect, .. } => (rect.width, rect.height),
            // Display geometry lookup is the host's concern; fall back to
            // the most common desktop size when it is not provided.
            RecordingRegion::Display { .. } | RecordingRegion::Window { .. } => (1920, 1080),
        }
    }
}

impl Default for FfmpegGrabBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for FfmpegGrabBackend {
    async fn start(
        &mut self,
        config: CaptureConfig,
        sink: Arc<dyn SampleSink>,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<()> {
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return Err(RecordingError::EncoderSetupFailed(
                "ffmpeg not found. Please install ffmpeg and add it to PATH.".to_string(),
            ));
        }

        let (width, height) = self.dimensions(&config.region);
        let args = grab_args(&config, width, height)?;

        tracing::info!("starting ffmpeg screen grab: {:?}", args);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                RecordingError::EncoderSetupFailed(format!("failed to start ffmpeg grab: {e}"))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            RecordingError::EncoderSetupFailed("failed to capture ffmpeg stdout".to_string())
        })?;

        self.running.store(true, Ordering::SeqCst);
        *self.child.lock() = Some(child);

        let running = self.running.clone();
        let started = Instant::now();
        let frame_size = (width * height * 4) as usize;
        let video_sink = sink.clone();
        let video_events = events.clone();

        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_for_thread = dropped.clone();

        self.video_thread = Some(std::thread::spawn(move || {
            let mut reader = std::io::BufReader::with_capacity(frame_size * 2, stdout);
            let mut buffer = vec![0u8; frame_size];

            loop {
                match reader.read_exact(&mut buffer) {
                    Ok(()) => {
                        let frame = VideoFrame::new(buffer.clone(), width, height, started.elapsed());
                        if !video_sink.append(Sample::Video(frame)) {
                            dropped_for_thread.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(_) => {
                        if running.load(Ordering::SeqCst) {
                            let _ = video_events.try_send(CaptureEvent::Terminated {
                                reason: "screen capture stream ended unexpectedly".to_string(),
                            });
                        }
                        break;
                    }
                }
            }

            let dropped = dropped_for_thread.load(Ordering::Relaxed);
            if dropped > 0 {
                tracing::debug!("capture reader exiting, {dropped} frames dropped on backpressure");
            }
        }));

        if config.capture_system_audio {
            self.audio_thread = Some(spawn_system_audio_tap(
                self.running.clone(),
                sink,
                started,
            ));
        }

        Ok(())
    }

    async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }

        if let Some(handle) = self.video_thread.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
        if let Some(handle) = self.audio_thread.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        tracing::info!("ffmpeg screen grab stopped");
    }
}

/// Build the platform grab input plus rawvideo output arguments
fn grab_args(config: &CaptureConfig, width: u32, height: u32) -> Result<Vec<String>> {
    let fps = config.fps.to_string();
    let size = format!("{width}x{height}");
    #[allow(unused_variables)]
    let cursor_flag = if config.show_cursor { "1" } else { "0" };

    #[allow(unused_mut)]
    let mut input: Option<Vec<String>> = None;

    #[cfg(target_os = "linux")]
    {
        let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
        let offset = match &config.region {
            RecordingRegion::Area { rect, .. } => format!("+{},{}", rect.x.max(0), rect.y.max(0)),
            _ => "+0,0".to_string(),
        };
        input = Some(vec![
            "-f".into(),
            "x11grab".into(),
            "-framerate".into(),
            fps.clone(),
            "-video_size".into(),
            size.clone(),
            "-draw_mouse".into(),
            cursor_flag.into(),
            "-i".into(),
            format!("{display}.0{offset}"),
        ]);
    }

    #[cfg(target_os = "macos")]
    {
        let display_index = match &config.region {
            RecordingRegion::Display { id } => *id,
            RecordingRegion::Area { display, .. } => *display,
            RecordingRegion::Window { .. } => 0,
        };
        input = Some(vec![
            "-f".into(),
            "avfoundation".into(),
            "-capture_cursor".into(),
            cursor_flag.into(),
            "-framerate".into(),
            fps.clone(),
            "-i".into(),
            format!("{display_index}:none"),
        ]);
    }

    #[cfg(target_os = "windows")]
    {
        let mut args = vec![
            "-f".to_string(),
            "gdigrab".into(),
            "-framerate".into(),
            fps.clone(),
            "-draw_mouse".into(),
            cursor_flag.into(),
        ];
        if let RecordingRegion::Area { rect, .. } = &config.region {
            args.extend([
                "-offset_x".into(),
                rect.x.to_string(),
                "-offset_y".into(),
                rect.y.to_string(),
                "-video_size".into(),
                size.clone(),
            ]);
        }
        args.extend(["-i".into(), "desktop".into()]);
        input = Some(args);
    }

    let mut args = input.ok_or_else(|| {
        RecordingError::EncoderSetupFailed("screen capture is not supported on this platform".into())
    })?;

    args.extend([
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        size,
        "-".into(),
    ]);

    Ok(args)
}

/// Loopback tap on the default output device, forwarded as stereo chunks.
///
/// Best-effort: loopback capture is not available on every platform, so
/// failures log a warning and the recording carries on without a system
/// audio track.
fn spawn_system_audio_tap(
    running: Arc<AtomicBool>,
    sink: Arc<dyn SampleSink>,
    started: Instant,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let host = cpal::default_host();
        let Some(device) = host.default_output_device() else {
            tracing::warn!("no default output device, skipping system audio capture");
            return;
        };

        let config = match device.default_output_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to query output device config: {e}");
                return;
            }
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let stream_config = config.config();

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let stereo = convert::remix(data, channels, 2);
                let chunk = AudioChunk::new(
                    stereo,
                    sample_rate,
                    2,
                    started.elapsed(),
                    AudioSource::System,
                );
                sink.append(Sample::Audio(chunk));
            },
            |err| tracing::error!("system audio stream error: {err}"),
            None,
        );

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("loopback capture unavailable: {e}");
                return;
            }
        };

        if let Err(e) = stream.play() {
            tracing::warn!("failed to start system audio stream: {e}");
            return;
        }

        tracing::info!("system audio loopback tap started ({sample_rate}Hz, {channels}ch)");

        while running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }

        tracing::info!("system audio loopback tap stopped");
    })
}
