//! Scripted capture backend
//!
//! A deterministic `CaptureBackend` for tests and demos: the caller holds
//! a `SampleInjector` and pushes synthetic samples through the same sink
//! path the real backend uses, including the termination event.

use crate::capture::stream::{CaptureBackend, CaptureConfig, CaptureEvent, SampleSink};
use crate::error::Result;
use crate::sample::Sample;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Shared {
    sink: Mutex<Option<Arc<dyn SampleSink>>>,
    events: Mutex<Option<mpsc::Sender<CaptureEvent>>>,
    started: AtomicBool,
    stopped: AtomicBool,
    last_config: Mutex<Option<CaptureConfig>>,
}

/// Caller-side handle for driving a `ScriptedCaptureBackend`
#[derive(Clone)]
pub struct SampleInjector {
    shared: Arc<Shared>,
}

impl SampleInjector {
    /// Push a sample into the active sink. Returns `false` when the
    /// backend is not running or the sink dropped the sample.
    pub fn push(&self, sample: Sample) -> bool {
        match self.shared.sink.lock().as_ref() {
            Some(sink) => sink.append(sample),
            None => false,
        }
    }

    /// Report an irrecoverable mid-session stream termination
    pub fn terminate(&self, reason: impl Into<String>) {
        if let Some(events) = self.shared.events.lock().as_ref() {
            let _ = events.try_send(CaptureEvent::Terminated {
                reason: reason.into(),
            });
        }
    }

    /// Whether `start` has ever been called on the backend
    pub fn started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Whether `stop` has been called since the last start
    pub fn stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Capture configuration from the most recent start
    pub fn last_config(&self) -> Option<CaptureConfig> {
        self.shared.last_config.lock().clone()
    }
}

/// Backend that only delivers what its `SampleInjector` is told to push
pub struct ScriptedCaptureBackend {
    shared: Arc<Shared>,
}

impl ScriptedCaptureBackend {
    pub fn new() -> (Self, SampleInjector) {
        let shared = Arc::new(Shared {
            sink: Mutex::new(None),
            events: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            last_config: Mutex::new(None),
        });
        let injector = SampleInjector {
            shared: shared.clone(),
        };
        (Self { shared }, injector)
    }
}

#[async_trait]
impl CaptureBackend for ScriptedCaptureBackend {
    async fn start(
        &mut self,
        config: CaptureConfig,
        sink: Arc<dyn SampleSink>,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<()> {
        *self.shared.sink.lock() = Some(sink);
        *self.shared.events.lock() = Some(events);
        *self.shared.last_config.lock() = Some(config);
        self.shared.started.store(true, Ordering::SeqCst);
        self.shared.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) {
        self.shared.sink.lock().take();
        self.shared.events.lock().take();
        self.shared.stopped.store(true, Ordering::SeqCst);
    }
}
