//! Sample routing between capture producers and the session sink
//!
//! Producers run on their own threads and call `append` concurrently; the
//! router applies the pause gate, converts raw timestamps to adjusted
//! presentation timestamps and forwards to whichever sink the session
//! selected. Every rejection is a drop, never a queue.

use crate::capture::stream::SampleSink;
use crate::encode::{GifFrameBuffer, VideoEncodingSink};
use crate::sample::Sample;
use crate::timeline::TimelineCoordinator;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The one sink a session writes into
#[derive(Clone)]
pub enum ActiveSink {
    Video(Arc<VideoEncodingSink>),
    Gif(Arc<GifFrameBuffer>),
}

/// Routes captured samples into the active sink
pub struct SinkRouter {
    accepting: AtomicBool,
    timeline: Arc<TimelineCoordinator>,
    sink: RwLock<Option<ActiveSink>>,
}

impl SinkRouter {
    pub fn new(timeline: Arc<TimelineCoordinator>) -> Self {
        Self {
            accepting: AtomicBool::new(false),
            timeline,
            sink: RwLock::new(None),
        }
    }

    /// Install the session sink. Samples still do not flow until the
    /// router is set accepting.
    pub fn install(&self, sink: ActiveSink) {
        *self.sink.write() = Some(sink);
    }

    /// Remove the session sink, dropping everything that arrives after
    pub fn clear(&self) {
        self.sink.write().take();
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Open or close the sample gate. Closed while paused, stopping and
    /// before the session starts.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

impl SampleSink for SinkRouter {
    fn append(&self, sample: Sample) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }

        let guard = self.sink.read();
        let Some(active) = guard.as_ref() else {
            return false;
        };

        match sample {
            Sample::Video(frame) => {
                if frame.data.len() != frame.expected_len() {
                    tracing::warn!(
                        "dropping malformed frame: {} bytes for {}x{}",
                        frame.data.len(),
                        frame.width,
                        frame.height
                    );
                    return false;
                }

                self.timeline.note_video_sample(frame.timestamp);
                let adjusted = self.timeline.adjusted(frame.timestamp);

                match active {
                    ActiveSink::Video(sink) => sink.append_video(&frame, adjusted),
                    ActiveSink::Gif(buffer) => buffer.push(&frame),
                }
            }
            Sample::Audio(chunk) => match active {
                ActiveSink::Video(sink) => sink.append_audio(&chunk),
                // GIF output carries no audio
                ActiveSink::Gif(_) => false,
            },
        }
    }
}
