//! Capture sources
//!
//! Platform-agnostic capture backend trait, the ffmpeg-based screen grab
//! implementation, the scripted backend used by tests, and the
//! microphone input tap.

pub mod convert;
pub mod microphone;
pub mod scripted;
pub mod stream;

pub use microphone::MicrophoneCaptureAdapter;
pub use scripted::{SampleInjector, ScriptedCaptureBackend};
pub use stream::{CaptureBackend, CaptureConfig, CaptureEvent, FfmpegGrabBackend, SampleSink};
