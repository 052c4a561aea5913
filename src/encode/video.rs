//! Streaming video encoding sink
//!
//! Container writer built on ffmpeg child processes: one H.264 video
//! track plus optional AAC system-audio and microphone tracks, muxed
//! into the destination container on finish. The writer session begins
//! lazily on the first accepted video sample, anchored at that sample's
//! timestamp; audio arriving before then is discarded.
//!
//! Producers append through a bounded channel drained by a dedicated
//! writer thread. `try_send` keeps the append path non-blocking; a full
//! queue means the sink is not ready and the sample is dropped.

use crate::config::VideoConfig;
use crate::error::{RecordingError, Result};
use crate::sample::{AudioChunk, AudioSource, VideoFrame};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Bounded depth of the append queue, in messages
const QUEUE_DEPTH: usize = 16;

/// Largest gap, in seconds, filled by repeating a frame before the track
/// cursor simply jumps forward
const MAX_FILL_SECS: u64 = 2;

enum WriterMsg {
    Video {
        data: std::sync::Arc<Vec<u8>>,
        width: u32,
        height: u32,
        repeat: u32,
    },
    Audio(AudioChunk),
    Finish,
}

/// Lazily-started container writer for video-mode recording
pub struct VideoEncodingSink {
    config: VideoConfig,
    destination: PathBuf,
    tx: Mutex<Option<Sender<WriterMsg>>>,
    writer: Mutex<Option<std::thread::JoinHandle<Result<()>>>>,
    begun: AtomicBool,
    epoch_adjusted_ns: AtomicU64,
    next_index: AtomicU64,
    frames_accepted: AtomicU64,
    frames_dropped: AtomicU64,
    audio_dropped: AtomicU64,
}

impl VideoEncodingSink {
    /// Prepare the sink. Verifies the encoder is available and the
    /// destination is writable; no encoder process starts until the
    /// first video sample is accepted.
    pub fn new(destination: PathBuf, config: VideoConfig) -> Result<Self> {
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return Err(RecordingError::EncoderSetupFailed(
                "ffmpeg not found. Please install ffmpeg and add it to PATH.".to_string(),
            ));
        }

        // Fail fast on an unwritable destination instead of at finalize
        std::fs::File::create(&destination).map_err(|e| RecordingError::CannotCreateFile {
            path: destination.display().to_string(),
            source: e,
        })?;

        let scratch = TempDir::new().map_err(|e| RecordingError::CannotCreateFile {
            path: "temporary encoder directory".to_string(),
            source: e,
        })?;

        let (tx, rx) = bounded(QUEUE_DEPTH);
        let writer = spawn_writer(rx, scratch, destination.clone(), config.clone());

        Ok(Self {
            config,
            destination,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            begun: AtomicBool::new(false),
            epoch_adjusted_ns: AtomicU64::new(0),
            next_index: AtomicU64::new(0),
            frames_accepted: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            audio_dropped: AtomicU64::new(0),
        })
    }

    /// Append a video frame at its adjusted presentation timestamp.
    /// Non-blocking; returns `false` when the frame was dropped.
    pub fn append_video(&self, frame: &VideoFrame, adjusted: Duration) -> bool {
        if !self.begun.load(Ordering::SeqCst) {
            // First accepted sample anchors the writer's own epoch
            self.epoch_adjusted_ns
                .store(adjusted.as_nanos() as u64, Ordering::SeqCst);
            self.begun.store(true, Ordering::SeqCst);
        }

        let epoch = Duration::from_nanos(self.epoch_adjusted_ns.load(Ordering::SeqCst));
        let fps = self.config.frame_rate.as_u32() as u64;
        let position = adjusted.saturating_sub(epoch);
        let target_index = (position.as_secs_f64() * fps as f64).round() as u64;

        let next = self.next_index.load(Ordering::SeqCst);
        if target_index < next && next > 0 {
            // Behind the track cursor; writing would move timestamps
            // backwards
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // Repeat the frame across dropped-frame gaps so presentation
        // timestamps stay aligned with the capture clock
        let repeat = (target_index.saturating_sub(next) + 1).min(fps * MAX_FILL_SECS);

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        match tx.try_send(WriterMsg::Video {
            data: frame.data.clone(),
            width: frame.width,
            height: frame.height,
            repeat: repeat as u32,
        }) {
            Ok(()) => {
                self.next_index.store(next + repeat, Ordering::SeqCst);
                self.frames_accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Append an audio chunk. Chunks arriving before the writer session
    /// has begun are discarded, not queued.
    pub fn append_audio(&self, chunk: &AudioChunk) -> bool {
        if !self.begun.load(Ordering::SeqCst) {
            self.audio_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let wanted = match chunk.source {
            AudioSource::System => self.config.include_system_audio,
            AudioSource::Microphone => self.config.include_microphone,
        };
        if !wanted {
            return false;
        }

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        match tx.try_send(WriterMsg::Audio(chunk.clone())) {
            Ok(()) => true,
            Err(_) => {
                self.audio_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Mark all tracks finished and await asynchronous finalization.
    /// Succeeds only when every encoder process completed cleanly.
    pub async fn finish(&self) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .take()
            .ok_or_else(|| RecordingError::EncodingFailed("writer already finalized".into()))?;
        let _ = tx.send(WriterMsg::Finish);
        drop(tx);

        let handle = self
            .writer
            .lock()
            .take()
            .ok_or_else(|| RecordingError::EncodingFailed("writer already finalized".into()))?;

        tracing::info!(
            "finalizing video sink: {} frames accepted, {} video / {} audio samples dropped",
            self.frames_accepted.load(Ordering::Relaxed),
            self.frames_dropped.load(Ordering::Relaxed),
            self.audio_dropped.load(Ordering::Relaxed),
        );

        let joined = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| RecordingError::EncodingFailed(e.to_string()))?;

        match joined {
            Ok(result) => result,
            Err(_) => Err(RecordingError::EncodingFailed(
                "encoder writer thread panicked".into(),
            )),
        }
    }

    /// Discard the writer without finalizing: encoder processes are
    /// killed and any partial output file is deleted. Never blocks on
    /// encoding work and never fails.
    pub fn discard(&self) {
        // Dropping the sender without a Finish message puts the writer
        // thread on its cancel path
        if let Some(tx) = self.tx.lock().take() {
            drop(tx);
        }
        if let Some(handle) = self.writer.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Video frames dropped on backpressure or timestamp regression
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

/// One encoder child process and the scratch file it writes
struct EncoderProc {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    label: &'static str,
}

impl EncoderProc {
    fn spawn(args: Vec<String>, path: PathBuf, label: &'static str) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RecordingError::EncoderSetupFailed(format!("failed to start {label} encoder: {e}"))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            RecordingError::EncoderSetupFailed(format!("failed to open {label} encoder stdin"))
        })?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            path,
            label,
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(data).map_err(|e| {
                RecordingError::EncodingFailed(format!("{} encoder pipe closed: {e}", self.label))
            }),
            None => Err(RecordingError::EncodingFailed(format!(
                "{} encoder already closed",
                self.label
            ))),
        }
    }

    /// Close stdin and wait; error with the encoder's diagnostics unless
    /// the terminal status is success.
    fn finish(mut self) -> Result<PathBuf> {
        drop(self.stdin.take());
        let output = self.child.wait_with_output().map_err(|e| {
            RecordingError::EncodingFailed(format!("failed to wait for {} encoder: {e}", self.label))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecordingError::EncodingFailed(format!(
                "{} encoder exited with {}: {}",
                self.label,
                output.status,
                stderr.trim()
            )));
        }

        Ok(self.path)
    }

    fn kill(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_writer(
    rx: Receiver<WriterMsg>,
    scratch: TempDir,
    destination: PathBuf,
    config: VideoConfig,
) -> std::thread::JoinHandle<Result<()>> {
    std::thread::spawn(move || {
        let result = run_writer(&rx, &scratch, &destination, &config);
        if result.is_err() {
            let _ = std::fs::remove_file(&destination);
        }
        result
    })
}

fn run_writer(
    rx: &Receiver<WriterMsg>,
    scratch: &TempDir,
    destination: &Path,
    config: &VideoConfig,
) -> Result<()> {
    let has_audio_tracks = config.include_system_audio || config.include_microphone;

    let mut video: Option<EncoderProc> = None;
    let mut system: Option<EncoderProc> = None;
    let mut microphone: Option<EncoderProc> = None;
    let mut graceful = false;

    while let Ok(msg) = rx.recv() {
        match msg {
            WriterMsg::Video {
                data,
                width,
                height,
                repeat,
            } => {
                if video.is_none() {
                    // Writer session begins now, on the first sample.
                    // Without audio tracks the video encoder writes the
                    // destination container directly; otherwise it
                    // writes a scratch track muxed at finish.
                    let path = if has_audio_tracks {
                        scratch.path().join("video.mp4")
                    } else {
                        destination.to_path_buf()
                    };
                    let proc = EncoderProc::spawn(
                        video_args(config, width, height, &path),
                        path,
                        "video",
                    );
                    match proc {
                        Ok(proc) => video = Some(proc),
                        Err(e) => {
                            kill_all(video, system, microphone);
                            return Err(e);
                        }
                    }
                }

                let mut write_err = None;
                if let Some(proc) = video.as_mut() {
                    for _ in 0..repeat {
                        if let Err(e) = proc.write(&data) {
                            write_err = Some(e);
                            break;
                        }
                    }
                }
                if let Some(e) = write_err {
                    kill_all(video, system, microphone);
                    return Err(e);
                }
            }
            WriterMsg::Audio(chunk) => {
                let (slot, label, bitrate) = match chunk.source {
                    AudioSource::System => (&mut system, "system-audio", 128),
                    AudioSource::Microphone => (&mut microphone, "microphone", 64),
                };

                if slot.is_none() {
                    let path = scratch.path().join(format!("{label}.m4a"));
                    match EncoderProc::spawn(
                        audio_args(&chunk, bitrate, &path),
                        path,
                        label,
                    ) {
                        Ok(proc) => *slot = Some(proc),
                        Err(e) => {
                            tracing::warn!("dropping {label} track: {e}");
                            continue;
                        }
                    }
                }

                let bytes: Vec<u8> = chunk
                    .samples
                    .iter()
                    .flat_map(|sample| sample.to_le_bytes())
                    .collect();
                let write_result = match slot.as_mut() {
                    Some(proc) => proc.write(&bytes),
                    None => Ok(()),
                };
                if let Err(e) = write_result {
                    tracing::warn!("audio track write failed, dropping track: {e}");
                    if let Some(proc) = slot.take() {
                        proc.kill();
                    }
                }
            }
            WriterMsg::Finish => {
                graceful = true;
                break;
            }
        }
    }

    if !graceful {
        // Cancelled: discard everything, including the partial output
        kill_all(video, system, microphone);
        let _ = std::fs::remove_file(destination);
        tracing::info!("video sink discarded without finalizing");
        return Ok(());
    }

    let video = video.ok_or_else(|| {
        RecordingError::EncodingFailed("writer session never began, no video was accepted".into())
    })?;

    let video_path = video.finish()?;
    let audio_paths: Vec<PathBuf> = [system, microphone]
        .into_iter()
        .flatten()
        .map(EncoderProc::finish)
        .collect::<Result<_>>()?;

    if !audio_paths.is_empty() {
        mux(&video_path, &audio_paths, destination)?;
    }

    tracing::info!("video sink finalized: {:?}", destination);
    Ok(())
}

fn kill_all(video: Option<EncoderProc>, system: Option<EncoderProc>, mic: Option<EncoderProc>) {
    for proc in [video, system, mic].into_iter().flatten() {
        proc.kill();
    }
}

/// H.264 encoder arguments for the video track
fn video_args(config: &VideoConfig, width: u32, height: u32, output: &Path) -> Vec<String> {
    let fps = config.frame_rate.as_u32();
    let bitrate = config.bitrate_kbps();
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{width}x{height}"),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        "-".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-b:v".into(),
        format!("{bitrate}k"),
        "-maxrate".into(),
        format!("{bitrate}k"),
        "-bufsize".into(),
        format!("{}k", bitrate * 2),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-g".into(),
        (fps * 2).to_string(),
        "-movflags".into(),
        "+faststart".into(),
        output.display().to_string(),
    ]
}

/// AAC encoder arguments for one audio track (44.1 kHz output; system
/// audio stereo at 128 kbps, microphone mono at 64 kbps)
fn audio_args(chunk: &AudioChunk, bitrate_kbps: u32, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "f32le".into(),
        "-ar".into(),
        chunk.sample_rate.to_string(),
        "-ac".into(),
        chunk.channels.to_string(),
        "-i".into(),
        "-".into(),
        "-c:a".into(),
        "aac".into(),
        "-ar".into(),
        "44100".into(),
        "-ac".into(),
        chunk.channels.to_string(),
        "-b:a".into(),
        format!("{bitrate_kbps}k"),
        output.display().to_string(),
    ]
}

/// Combine the finished track files into the destination container
/// without re-encoding
fn mux(video: &Path, audio: &[PathBuf], destination: &Path) -> Result<()> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.display().to_string(),
    ];
    for path in audio {
        args.extend(["-i".into(), path.display().to_string()]);
    }
    args.extend(["-map".into(), "0:v".into()]);
    for index in 1..=audio.len() {
        args.extend(["-map".into(), format!("{index}:a")]);
    }
    args.extend([
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        destination.display().to_string(),
    ]);

    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| RecordingError::EncodingFailed(format!("failed to run muxer: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RecordingError::EncodingFailed(format!(
            "muxer exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}
