//! Media samples flowing from capture to the active sink
//!
//! Frames and audio chunks carry raw capture-clock timestamps; the
//! timeline coordinator converts them to pause-adjusted presentation
//! timestamps at the sink boundary.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Origin of an audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    /// Audio played by the system, captured alongside the screen
    System,
    /// Dedicated microphone input tap
    Microphone,
}

/// A single captured video frame (tightly packed RGBA)
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data, `width * height * 4` bytes
    pub data: Arc<Vec<u8>>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Raw timestamp on the capture clock
    pub timestamp: Duration,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp: Duration) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            timestamp,
        }
    }

    /// Expected byte length for the frame dimensions
    pub fn expected_len(&self) -> usize {
        (self.width * self.height * 4) as usize
    }
}

/// A chunk of interleaved PCM audio in canonical f32 form
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved samples, `channels` values per frame
    pub samples: Arc<Vec<f32>>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Raw timestamp on the producing device's clock
    pub timestamp: Duration,

    /// Which tap produced this chunk
    pub source: AudioSource,
}

impl AudioChunk {
    pub fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        timestamp: Duration,
        source: AudioSource,
    ) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            channels,
            timestamp,
            source,
        }
    }
}

/// A timestamped media sample delivered by a capture producer
#[derive(Debug, Clone)]
pub enum Sample {
    Video(VideoFrame),
    Audio(AudioChunk),
}

impl Sample {
    /// Raw timestamp of the sample, whatever its media type
    pub fn timestamp(&self) -> Duration {
        match self {
            Sample::Video(frame) => frame.timestamp,
            Sample::Audio(chunk) => chunk.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_expected_len_matches_rgba() {
        let frame = VideoFrame::new(vec![0; 16], 2, 2, Duration::ZERO);
        assert_eq!(frame.expected_len(), 16);
    }

    #[test]
    fn sample_timestamp_is_media_agnostic() {
        let ts = Duration::from_millis(250);
        let video = Sample::Video(VideoFrame::new(vec![], 0, 0, ts));
        let audio = Sample::Audio(AudioChunk::new(vec![], 44_100, 1, ts, AudioSource::Microphone));
        assert_eq!(video.timestamp(), ts);
        assert_eq!(audio.timestamp(), ts);
    }
}
