//! Screenflow - screen recording pipeline with MP4 and animated GIF output.
//!
//! A recording session captures one screen region, optionally joined by
//! system audio and a microphone tap, and writes either an MP4 file
//! through a streaming encoder or an animated GIF assembled from an
//! in-memory frame buffer. Sessions can be paused, resumed, stopped and
//! cancelled; paused intervals are excluded from the output timeline.
//!
//! The entry point is [`recorder::RecordingController`]. Hosts plug in a
//! [`capture::CaptureBackend`], a [`permissions::PermissionGate`] and
//! optional [`overlay::OverlayController`]s, then observe the session
//! through the controller's broadcast events.

pub mod capture;
pub mod config;
pub mod destination;
pub mod disk;
pub mod encode;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod permissions;
pub mod recorder;
pub mod sample;
pub mod timeline;

pub use config::{GifConfig, RecordingFormat, RecordingRegion, VideoConfig};
pub use error::{ErrorResponse, RecordingError, Result};
pub use recorder::{RecordingController, RecordingEvent, RecordingResult, RecordingState};
