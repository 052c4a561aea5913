//! GIF frame buffer and assembler
//!
//! During a GIF-mode session every accepted video sample is decoded into
//! a static RGBA image and buffered in memory. On stop the assembler
//! reduces the frame rate to the configured target, optionally rescales,
//! and serializes the sequence as an animated GIF with a file-level loop
//! count and a per-frame delay.

use crate::config::GifConfig;
use crate::error::{RecordingError, Result};
use crate::sample::VideoFrame;
use color_quant::NeuQuant;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{imageops, Delay, Frame, RgbaImage};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Buffered frame count at which the sticky memory warning is raised
/// (about 30 seconds of capture at 15 fps)
pub const MEMORY_WARNING_FRAMES: usize = 450;

/// In-memory accumulator for GIF-mode recording.
///
/// The warning threshold is warn-only: the buffer never truncates itself
/// and never halts capture. A hard cap is available as a policy flag on
/// `GifConfig` for hosts that prefer bounded memory over completeness.
pub struct GifFrameBuffer {
    frames: Mutex<Vec<RgbaImage>>,
    config: GifConfig,
    source_fps: u32,
    memory_warning: AtomicBool,
    dropped: AtomicU64,
}

impl GifFrameBuffer {
    pub fn new(config: GifConfig, source_fps: u32) -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            config: config.normalized(),
            source_fps,
            memory_warning: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Decode a captured frame into a static image and buffer it.
    /// Returns `false` when the frame was dropped (malformed pixel data,
    /// or the configured hard cap was reached).
    pub fn push(&self, frame: &VideoFrame) -> bool {
        let mut frames = self.frames.lock();

        if let Some(cap) = self.config.hard_frame_cap {
            if frames.len() >= cap {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        let Some(image) = RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
        else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "dropping malformed frame: {} bytes for {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            );
            return false;
        };

        frames.push(image);

        if frames.len() >= MEMORY_WARNING_FRAMES
            && !self.memory_warning.swap(true, Ordering::SeqCst)
        {
            tracing::warn!(
                "GIF frame buffer reached {} frames, memory use is getting large",
                frames.len()
            );
        }

        true
    }

    /// Number of buffered frames
    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether the sticky memory warning has been raised
    pub fn memory_warning_raised(&self) -> bool {
        self.memory_warning.load(Ordering::SeqCst)
    }

    /// Frames dropped (hard cap or malformed data)
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain the buffer for assembly
    pub fn take_frames(&self) -> Vec<RgbaImage> {
        std::mem::take(&mut *self.frames.lock())
    }

    pub fn config(&self) -> &GifConfig {
        &self.config
    }

    pub fn source_fps(&self) -> u32 {
        self.source_fps
    }
}

/// Serializes a buffered frame sequence into an animated GIF
pub struct GifAssembler {
    config: GifConfig,
    source_fps: u32,
}

impl GifAssembler {
    pub fn new(config: GifConfig, source_fps: u32) -> Self {
        Self {
            config: config.normalized(),
            source_fps,
        }
    }

    /// Reduce, rescale and encode `frames` into `destination`.
    ///
    /// An empty frame list fails with a distinct error before any
    /// encoding is attempted and before the destination file is created.
    pub fn assemble(&self, frames: Vec<RgbaImage>, destination: &Path) -> Result<()> {
        if frames.is_empty() {
            return Err(RecordingError::NoFramesToEncode);
        }

        let selected = reduce_frame_rate(frames, self.source_fps, self.config.frame_rate);
        tracing::info!(
            "assembling GIF: {} frames at {} fps -> {:?}",
            selected.len(),
            self.config.frame_rate,
            destination
        );

        let mut scaled: Vec<RgbaImage> = if self.config.scale < 1.0 {
            selected
                .into_iter()
                .map(|image| rescale(&image, self.config.scale))
                .collect()
        } else {
            selected
        };

        if self.config.max_colors < 256 {
            for image in &mut scaled {
                bound_palette(image, self.config.max_colors);
            }
        }

        let file = File::create(destination).map_err(|e| RecordingError::CannotCreateFile {
            path: destination.display().to_string(),
            source: e,
        })?;

        let mut encoder =
            GifEncoder::new_with_speed(BufWriter::new(file), quantizer_speed(self.config.max_colors));

        let repeat = if self.config.loop_count == 0 {
            Repeat::Infinite
        } else {
            Repeat::Finite(self.config.loop_count)
        };
        encoder
            .set_repeat(repeat)
            .map_err(|e| RecordingError::EncodingFailed(e.to_string()))?;

        // Delay per frame is 1/target_fps. Targets are capped at 30 fps,
        // which keeps the delay above the floor many decoders clamp at.
        let delay = Delay::from_numer_denom_ms(1_000, self.config.frame_rate);

        for image in scaled {
            let frame = Frame::from_parts(image, 0, 0, delay);
            encoder
                .encode_frame(frame)
                .map_err(|e| RecordingError::EncodingFailed(e.to_string()))?;
        }

        Ok(())
    }
}

/// Select frames to hit `target_fps` from a `source_fps` sequence.
///
/// A target at or above the source returns the input unchanged. Otherwise
/// the selection cursor starts at frame 0 (always retained) and advances
/// by `source/target` with fractional accumulation, truncating to an
/// index, until the source is exhausted.
pub fn reduce_frame_rate<T>(frames: Vec<T>, source_fps: u32, target_fps: u32) -> Vec<T>
where
    T: Clone,
{
    if target_fps >= source_fps || frames.is_empty() {
        return frames;
    }

    let ratio = source_fps as f64 / target_fps as f64;
    let mut selected = Vec::with_capacity((frames.len() as f64 / ratio).ceil() as usize);
    let mut cursor = 0.0_f64;

    while (cursor as usize) < frames.len() {
        selected.push(frames[cursor as usize].clone());
        cursor += ratio;
    }

    selected
}

/// Uniform resize preserving aspect ratio
fn rescale(image: &RgbaImage, scale: f32) -> RgbaImage {
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(image, width, height, imageops::FilterType::Lanczos3)
}

/// Smallest palette the neural quantizer can train
const QUANTIZER_MIN_COLORS: u16 = 64;

/// Quantize an image in place to at most `max_colors` distinct colors.
/// Bounds below the quantizer's 64-entry minimum are honored at 64.
fn bound_palette(image: &mut RgbaImage, max_colors: u16) {
    let colors = usize::from(max_colors.max(QUANTIZER_MIN_COLORS));
    let quantizer = NeuQuant::new(quantizer_speed(max_colors), colors, image.as_raw());
    for pixel in image.pixels_mut() {
        quantizer.map_pixel(&mut pixel.0);
    }
}

/// Map the configured palette bound to the quantizer's speed/quality
/// knob: larger palettes get more quantizer effort.
fn quantizer_speed(max_colors: u16) -> i32 {
    (30 - i32::from(max_colors) / 10).clamp(1, 30)
}
