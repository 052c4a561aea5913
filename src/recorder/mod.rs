//! Recording session orchestration
//!
//! The controller drives the session state machine; the router moves
//! captured samples into the session's sink with the pause gate and the
//! adjusted timeline applied on the way through.

pub mod controller;
pub mod router;
pub mod state;

pub use controller::{RecordingController, RecordingEvent};
pub use router::{ActiveSink, SinkRouter};
pub use state::{RecordingResult, RecordingState};
