//! Recording configuration
//!
//! Defines the capture region, the two output formats and their encoder
//! parameters. A `RecordingFormat` selects exactly one sink: either the
//! streaming video writer or the in-memory GIF frame buffer.

use serde::{Deserialize, Serialize};

/// Capture frame rate used while recording in GIF mode.
///
/// GIF targets are 5-30 fps, so capturing at 15 keeps the frame buffer
/// small while still allowing the full target range after reduction.
pub const GIF_CAPTURE_FPS: u32 = 15;

/// A rectangle in display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// What part of the screen to record. Immutable once a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RecordingRegion {
    /// An entire display
    Display { id: u32 },
    /// A single window
    Window { id: u32 },
    /// A fixed area of a display
    Area { rect: Rect, display: u32 },
}

/// Output resolution presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Hd720,
    FullHd1080,
    Qhd1440,
    Uhd4k,
}

impl Resolution {
    /// Pixel dimensions for this preset
    pub fn pixel_size(&self) -> (u32, u32) {
        match self {
            Resolution::Hd720 => (1280, 720),
            Resolution::FullHd1080 => (1920, 1080),
            Resolution::Qhd1440 => (2560, 1440),
            Resolution::Uhd4k => (3840, 2160),
        }
    }

    /// H.264 bitrate in kbps at `Quality::High`
    fn base_bitrate_kbps(&self) -> u32 {
        match self {
            Resolution::Hd720 => 5_000,
            Resolution::FullHd1080 => 10_000,
            Resolution::Qhd1440 => 18_000,
            Resolution::Uhd4k => 35_000,
        }
    }
}

/// Supported video capture frame rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRate {
    #[serde(rename = "15")]
    Fps15,
    #[serde(rename = "24")]
    Fps24,
    #[serde(rename = "30")]
    Fps30,
    #[serde(rename = "60")]
    Fps60,
}

impl FrameRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            FrameRate::Fps15 => 15,
            FrameRate::Fps24 => 24,
            FrameRate::Fps30 => 30,
            FrameRate::Fps60 => 60,
        }
    }
}

/// Encoder quality levels, expressed as a bitrate multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
    Maximum,
}

impl Quality {
    /// Multiplier applied to the resolution's base bitrate
    pub fn multiplier(&self) -> f64 {
        match self {
            Quality::Low => 0.5,
            Quality::Medium => 0.75,
            Quality::High => 1.0,
            Quality::Maximum => 1.5,
        }
    }
}

/// Configuration for video (MP4) recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    pub quality: Quality,
    pub include_system_audio: bool,
    pub include_microphone: bool,
    pub show_clicks: bool,
    pub show_keystrokes: bool,
    pub show_cursor: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::FullHd1080,
            frame_rate: FrameRate::Fps30,
            quality: Quality::High,
            include_system_audio: false,
            include_microphone: false,
            show_clicks: false,
            show_keystrokes: false,
            show_cursor: true,
        }
    }
}

impl VideoConfig {
    /// H.264 target bitrate from the resolution x quality lookup
    pub fn bitrate_kbps(&self) -> u32 {
        (self.resolution.base_bitrate_kbps() as f64 * self.quality.multiplier()).round() as u32
    }
}

/// Configuration for animated GIF recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GifConfig {
    /// Target playback frame rate, 5-30 fps
    pub frame_rate: u32,

    /// Palette size bound, 2-256 colors.
    ///
    /// Frames are quantized to at most this many colors before encoding.
    /// The neural quantizer's smallest trainable palette is 64 entries,
    /// so bounds below 64 are honored at 64.
    pub max_colors: u16,

    /// Number of playback loops, 0 = infinite
    pub loop_count: u16,

    /// Uniform output scale, 0.25-1.0
    pub scale: f32,

    /// Optional hard cap on buffered frames. `None` keeps the buffer
    /// warn-only: a memory warning is raised at the threshold but capture
    /// continues.
    #[serde(default)]
    pub hard_frame_cap: Option<usize>,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            frame_rate: 15,
            max_colors: 256,
            loop_count: 0,
            scale: 1.0,
            hard_frame_cap: None,
        }
    }
}

impl GifConfig {
    /// Clamp all fields into their valid ranges
    pub fn normalized(&self) -> Self {
        Self {
            frame_rate: self.frame_rate.clamp(5, 30),
            max_colors: self.max_colors.clamp(2, 256),
            loop_count: self.loop_count,
            scale: self.scale.clamp(0.25, 1.0),
            hard_frame_cap: self.hard_frame_cap,
        }
    }

    /// Per-frame display duration in seconds
    pub fn frame_delay_secs(&self) -> f64 {
        1.0 / self.frame_rate as f64
    }
}

/// Output format for a recording session. Selects exactly one sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "config")]
pub enum RecordingFormat {
    Video(VideoConfig),
    Gif(GifConfig),
}

impl RecordingFormat {
    /// File extension for the output artifact
    pub fn extension(&self) -> &'static str {
        match self {
            RecordingFormat::Video(_) => "mp4",
            RecordingFormat::Gif(_) => "gif",
        }
    }

    /// Frame rate the capture stream should run at for this format
    pub fn capture_fps(&self) -> u32 {
        match self {
            RecordingFormat::Video(config) => config.frame_rate.as_u32(),
            RecordingFormat::Gif(_) => GIF_CAPTURE_FPS,
        }
    }

    /// Whether the format wants a microphone track
    pub fn wants_microphone(&self) -> bool {
        matches!(self, RecordingFormat::Video(config) if config.include_microphone)
    }

    /// Whether the format wants a system audio track
    pub fn wants_system_audio(&self) -> bool {
        matches!(self, RecordingFormat::Video(config) if config.include_system_audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_reference_points() {
        let high_1080 = VideoConfig {
            resolution: Resolution::FullHd1080,
            quality: Quality::High,
            ..Default::default()
        };
        assert_eq!(high_1080.bitrate_kbps(), 10_000);

        let high_4k = VideoConfig {
            resolution: Resolution::Uhd4k,
            quality: Quality::High,
            ..Default::default()
        };
        assert_eq!(high_4k.bitrate_kbps(), 35_000);
    }

    #[test]
    fn bitrate_scales_with_quality_multiplier() {
        let max_1080 = VideoConfig {
            resolution: Resolution::FullHd1080,
            quality: Quality::Maximum,
            ..Default::default()
        };
        assert_eq!(max_1080.bitrate_kbps(), 15_000);

        let low_1080 = VideoConfig {
            resolution: Resolution::FullHd1080,
            quality: Quality::Low,
            ..Default::default()
        };
        assert_eq!(low_1080.bitrate_kbps(), 5_000);
    }

    #[test]
    fn gif_config_clamps_to_valid_ranges() {
        let config = GifConfig {
            frame_rate: 200,
            max_colors: 1,
            loop_count: 3,
            scale: 0.1,
            hard_frame_cap: None,
        }
        .normalized();

        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.max_colors, 2);
        assert_eq!(config.loop_count, 3);
        assert!((config.scale - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn frame_delay_is_reciprocal_of_frame_rate() {
        let config = GifConfig {
            frame_rate: 20,
            ..Default::default()
        };
        assert!((config.frame_delay_secs() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn capture_fps_follows_format() {
        let video = RecordingFormat::Video(VideoConfig::default());
        assert_eq!(video.capture_fps(), 30);

        let gif = RecordingFormat::Gif(GifConfig::default());
        assert_eq!(gif.capture_fps(), GIF_CAPTURE_FPS);
    }
}
