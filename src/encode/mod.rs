//! Encoding sinks
//!
//! One sink per session, selected by the recording format: the streaming
//! video writer or the in-memory GIF frame buffer with its assembler.

pub mod gif;
pub mod video;

pub use gif::{GifAssembler, GifFrameBuffer, MEMORY_WARNING_FRAMES};
pub use video::VideoEncodingSink;
