//! Recording session controller
//!
//! Owns the session state machine and orchestrates the collaborators: the
//! capture backend, the microphone tap, the encoding sink, the overlays
//! and the pause-adjusted timeline. One controller manages at most one
//! session at a time; every lifecycle change is published on a broadcast
//! channel for host applications to observe.

use crate::capture::stream::{CaptureBackend, CaptureConfig, CaptureEvent, SampleSink};
use crate::capture::MicrophoneCaptureAdapter;
use crate::config::{RecordingFormat, RecordingRegion, GIF_CAPTURE_FPS};
use crate::destination::{DestinationProvider, TimestampedDestination};
use crate::disk::DiskSpaceGuard;
use crate::encode::{GifAssembler, GifFrameBuffer, VideoEncodingSink};
use crate::error::{RecordingError, Result};
use crate::overlay::OverlayController;
use crate::permissions::{GrantedPermissions, PermissionGate};
use crate::recorder::router::{ActiveSink, SinkRouter};
use crate::recorder::state::{RecordingResult, RecordingState};
use crate::timeline::TimelineCoordinator;
use chrono::Utc;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

/// How often the progress ticker publishes while a session is live
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle and progress notifications published by the controller
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    Started { id: Uuid, output_url: PathBuf },
    Paused,
    Resumed,
    Stopped(RecordingResult),
    Cancelled,
    /// The capture stream died mid-session; a best-effort stop follows
    StreamLost { reason: String },
    /// The GIF frame buffer crossed its memory warning threshold
    MemoryPressure { frames: usize },
    Progress { duration: Duration },
    Error(String),
}

/// Everything owned by one live session
struct ActiveSession {
    id: Uuid,
    format: RecordingFormat,
    output_url: PathBuf,
    router: Arc<SinkRouter>,
    sink: ActiveSink,
    timeline: Arc<TimelineCoordinator>,
    started: Instant,
    microphone: Option<MicrophoneCaptureAdapter>,
    overlays: Vec<Arc<dyn OverlayController>>,
    ticker: tokio::task::JoinHandle<()>,
}

/// Drives recording sessions from start to finished artifact
pub struct RecordingController {
    state: Arc<RwLock<RecordingState>>,
    session: Arc<Mutex<Option<ActiveSession>>>,
    backend: Arc<Mutex<Box<dyn CaptureBackend>>>,
    permissions: Arc<dyn PermissionGate>,
    disk_guard: DiskSpaceGuard,
    destination: Arc<dyn DestinationProvider>,
    microphone_device: Option<String>,
    click_overlay: Option<Arc<dyn OverlayController>>,
    keystroke_overlay: Option<Arc<dyn OverlayController>>,
    events: broadcast::Sender<RecordingEvent>,
}

impl RecordingController {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            session: Arc::new(Mutex::new(None)),
            backend: Arc::new(Mutex::new(backend)),
            permissions: Arc::new(GrantedPermissions),
            disk_guard: DiskSpaceGuard::new(),
            destination: Arc::new(TimestampedDestination::new(std::env::temp_dir())),
            microphone_device: None,
            click_overlay: None,
            keystroke_overlay: None,
            events,
        }
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionGate>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_disk_guard(mut self, guard: DiskSpaceGuard) -> Self {
        self.disk_guard = guard;
        self
    }

    /// Directory where finished recordings are written, with generated
    /// timestamped filenames
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.destination = Arc::new(TimestampedDestination::new(dir));
        self
    }

    /// Custom destination collaborator deciding where recordings land
    pub fn with_destination(mut self, provider: Arc<dyn DestinationProvider>) -> Self {
        self.destination = provider;
        self
    }

    /// Select a specific microphone instead of the system default
    pub fn with_microphone_device(mut self, name: impl Into<String>) -> Self {
        self.microphone_device = Some(name.into());
        self
    }

    pub fn with_click_overlay(mut self, overlay: Arc<dyn OverlayController>) -> Self {
        self.click_overlay = Some(overlay);
        self
    }

    pub fn with_keystroke_overlay(mut self, overlay: Arc<dyn OverlayController>) -> Self {
        self.keystroke_overlay = Some(overlay);
        self
    }

    /// Subscribe to lifecycle and progress events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Recorded duration of the live session, paused intervals excluded
    pub async fn duration(&self) -> Option<Duration> {
        let guard = self.session.lock().await;
        guard
            .as_ref()
            .map(|s| s.started.elapsed().saturating_sub(s.timeline.paused_duration()))
    }

    /// Begin a recording session.
    ///
    /// Preconditions run in a fixed order before anything is allocated:
    /// no session may exist, screen capture must be authorized, the
    /// microphone must be authorized when the format wants one, and the
    /// destination volume must have room. Any failure leaves the
    /// controller idle with nothing to clean up.
    pub async fn start(&self, region: RecordingRegion, format: RecordingFormat) -> Result<Uuid> {
        {
            let mut state = self.state.write();
            if state.is_busy() {
                return Err(RecordingError::AlreadyRecording);
            }
            *state = RecordingState::Starting;
        }

        match self.start_inner(region, format).await {
            Ok(id) => Ok(id),
            Err(e) => {
                *self.state.write() = RecordingState::Idle;
                Err(e)
            }
        }
    }

    async fn start_inner(&self, region: RecordingRegion, format: RecordingFormat) -> Result<Uuid> {
        if !self.permissions.screen_capture().is_authorized() {
            return Err(RecordingError::ScreenCaptureNotAuthorized);
        }
        if format.wants_microphone() && !self.permissions.microphone().is_authorized() {
            return Err(RecordingError::MicrophoneNotAuthorized);
        }
        let output_url = self.destination.resolve(&format)?;
        let volume = output_url
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        self.disk_guard.check(&volume)?;

        std::fs::create_dir_all(&volume).map_err(|e| RecordingError::CannotCreateFile {
            path: volume.display().to_string(),
            source: e,
        })?;

        let id = Uuid::new_v4();

        let timeline = Arc::new(TimelineCoordinator::new());
        let router = Arc::new(SinkRouter::new(timeline.clone()));

        let sink = match &format {
            RecordingFormat::Video(config) => ActiveSink::Video(Arc::new(
                VideoEncodingSink::new(output_url.clone(), config.clone())?,
            )),
            RecordingFormat::Gif(config) => ActiveSink::Gif(Arc::new(GifFrameBuffer::new(
                config.clone(),
                GIF_CAPTURE_FPS,
            ))),
        };
        router.install(sink.clone());

        // The microphone tap starts before the capture backend so an
        // unusable device fails the start instead of a half-live session.
        let microphone = if format.wants_microphone() {
            let mut adapter = MicrophoneCaptureAdapter::new(self.microphone_device.clone());
            let mic_sink: Arc<dyn SampleSink> = router.clone();
            if let Err(e) = adapter.start(mic_sink) {
                discard_sink(&sink).await;
                return Err(e);
            }
            Some(adapter)
        } else {
            None
        };

        let capture_config = CaptureConfig {
            region,
            fps: format.capture_fps(),
            capture_system_audio: format.wants_system_audio(),
            show_cursor: match &format {
                RecordingFormat::Video(config) => config.show_cursor,
                RecordingFormat::Gif(_) => true,
            },
        };

        let (event_tx, event_rx) = mpsc::channel(8);
        let backend_sink: Arc<dyn SampleSink> = router.clone();
        if let Err(e) = self
            .backend
            .lock()
            .await
            .start(capture_config, backend_sink, event_tx)
            .await
        {
            if let Some(mut adapter) = microphone {
                let _ = tokio::task::spawn_blocking(move || adapter.stop()).await;
            }
            discard_sink(&sink).await;
            return Err(e);
        }

        let mut overlays = Vec::new();
        if let RecordingFormat::Video(config) = &format {
            if config.show_clicks {
                if let Some(overlay) = &self.click_overlay {
                    overlay.start();
                    overlays.push(overlay.clone());
                }
            }
            if config.show_keystrokes {
                if let Some(overlay) = &self.keystroke_overlay {
                    overlay.start();
                    overlays.push(overlay.clone());
                }
            }
        }

        let started = Instant::now();
        router.set_accepting(true);

        let ticker = self.spawn_ticker(started, timeline.clone(), router.clone(), sink.clone());
        self.spawn_watchdog(id, event_rx);

        let session = ActiveSession {
            id,
            format,
            output_url: output_url.clone(),
            router,
            sink,
            timeline,
            started,
            microphone,
            overlays,
            ticker,
        };

        // A cancel may have fired during the starting window; the session
        // goes live only if the state is still Starting. Otherwise the
        // freshly built resources are torn down and the cancel stands.
        let mut slot = self.session.lock().await;
        let aborted = {
            let mut state = self.state.write();
            if *state != RecordingState::Starting {
                true
            } else {
                *state = RecordingState::Recording;
                false
            }
        };
        if aborted {
            drop(slot);
            abort_session(session, &self.backend).await;
            tracing::info!("start aborted by a concurrent cancel");
            return Err(RecordingError::NotRecording);
        }
        *slot = Some(session);
        drop(slot);

        tracing::info!("recording started: {id} -> {:?}", output_url);
        let _ = self.events.send(RecordingEvent::Started { id, output_url });

        Ok(id)
    }

    /// Pause the live session. Captured samples are dropped while paused
    /// and the paused interval is excluded from the output timeline.
    pub async fn pause(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != RecordingState::Recording {
                return Err(RecordingError::NotRecording);
            }
            *state = RecordingState::Paused;
        }

        let guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            session.router.set_accepting(false);
            session.timeline.begin_pause();
        }
        drop(guard);

        tracing::info!("recording paused");
        let _ = self.events.send(RecordingEvent::Paused);
        Ok(())
    }

    /// Resume a paused session
    pub async fn resume(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != RecordingState::Paused {
                return Err(RecordingError::NotRecording);
            }
            *state = RecordingState::Recording;
        }

        let guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            session.timeline.end_pause();
            session.router.set_accepting(true);
        }
        drop(guard);

        tracing::info!("recording resumed");
        let _ = self.events.send(RecordingEvent::Resumed);
        Ok(())
    }

    /// Stop the session and await finalization of the output artifact
    pub async fn stop(&self) -> Result<RecordingResult> {
        {
            let mut state = self.state.write();
            match *state {
                RecordingState::Recording | RecordingState::Paused => {
                    *state = RecordingState::Stopping;
                }
                _ => return Err(RecordingError::NotRecording),
            }
        }

        let session = self.session.lock().await.take();
        let result = match session {
            Some(session) => finish_session(session, &self.backend).await,
            None => Err(RecordingError::NotRecording),
        };

        *self.state.write() = RecordingState::Idle;

        match result {
            Ok(result) => {
                tracing::info!(
                    "recording stopped: {:?} ({:.1}s)",
                    result.url,
                    result.duration.as_secs_f64()
                );
                let _ = self.events.send(RecordingEvent::Stopped(result.clone()));
                Ok(result)
            }
            Err(e) => {
                tracing::error!("failed to finalize recording: {e}");
                let _ = self.events.send(RecordingEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Abandon the session: capture stops, encoders are killed and any
    /// partial output is deleted. A no-op when no session exists.
    pub async fn cancel(&self) {
        {
            let mut state = self.state.write();
            if !state.is_busy() {
                return;
            }
            *state = RecordingState::Stopping;
        }

        if let Some(session) = self.session.lock().await.take() {
            let id = session.id;
            abort_session(session, &self.backend).await;
            tracing::info!("recording cancelled: {id}");
        }

        *self.state.write() = RecordingState::Idle;
        let _ = self.events.send(RecordingEvent::Cancelled);
    }

    /// Periodic progress publisher; also surfaces GIF memory pressure.
    /// Progress is suspended while the session is paused.
    fn spawn_ticker(
        &self,
        started: Instant,
        timeline: Arc<TimelineCoordinator>,
        router: Arc<SinkRouter>,
        sink: ActiveSink,
    ) -> tokio::task::JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
            let mut pressure_reported = false;
            loop {
                interval.tick().await;

                if router.is_accepting() {
                    let duration = started.elapsed().saturating_sub(timeline.paused_duration());
                    let _ = events.send(RecordingEvent::Progress { duration });
                }

                if let ActiveSink::Gif(buffer) = &sink {
                    if !pressure_reported && buffer.memory_warning_raised() {
                        pressure_reported = true;
                        let _ = events.send(RecordingEvent::MemoryPressure {
                            frames: buffer.frame_count(),
                        });
                    }
                }
            }
        })
    }

    /// Consumes backend capture events for one session. An irrecoverable
    /// termination triggers a best-effort stop that finalizes whatever was
    /// captured. Guarded by the session id so an event still queued during
    /// teardown can never touch a later session.
    fn spawn_watchdog(&self, id: Uuid, mut event_rx: mpsc::Receiver<CaptureEvent>) {
        let state = self.state.clone();
        let session = self.session.clone();
        let backend = self.backend.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let CaptureEvent::Terminated { reason } = event;

                let mut slot = session.lock().await;
                if slot.as_ref().map(|s| s.id) != Some(id) {
                    // The guarded session is already gone
                    return;
                }
                {
                    let mut st = state.write();
                    match *st {
                        RecordingState::Recording | RecordingState::Paused => {
                            *st = RecordingState::Stopping;
                        }
                        // A stop or cancel is already tearing down
                        _ => return,
                    }
                }
                let active = slot.take();
                drop(slot);

                tracing::warn!("capture stream lost: {reason}");
                let _ = events.send(RecordingEvent::StreamLost {
                    reason: reason.clone(),
                });

                if let Some(active) = active {
                    match finish_session(active, &backend).await {
                        Ok(result) => {
                            let _ = events.send(RecordingEvent::Stopped(result));
                        }
                        Err(e) => {
                            let e = RecordingError::StreamTerminated(format!(
                                "{reason}; finalization failed: {e}"
                            ));
                            let _ = events.send(RecordingEvent::Error(e.to_string()));
                        }
                    }
                }

                *state.write() = RecordingState::Idle;
                return;
            }
        });
    }
}

/// Tear a session down and finalize its artifact.
///
/// Teardown (gate, capture, microphone, overlays) always runs to
/// completion before finalization, so a finalize failure never leaks a
/// live capture resource.
async fn finish_session(
    mut session: ActiveSession,
    backend: &Mutex<Box<dyn CaptureBackend>>,
) -> Result<RecordingResult> {
    session.router.set_accepting(false);
    session.timeline.end_pause();
    let duration = session
        .started
        .elapsed()
        .saturating_sub(session.timeline.paused_duration());

    backend.lock().await.stop().await;

    if let Some(mut adapter) = session.microphone.take() {
        let _ = tokio::task::spawn_blocking(move || adapter.stop()).await;
    }
    for overlay in &session.overlays {
        overlay.stop();
    }

    session.router.clear();
    session.ticker.abort();

    match &session.sink {
        ActiveSink::Video(sink) => {
            sink.finish().await?;
        }
        ActiveSink::Gif(buffer) => {
            let frames = buffer.take_frames();
            let assembler = GifAssembler::new(buffer.config().clone(), buffer.source_fps());
            let destination = session.output_url.clone();
            tokio::task::spawn_blocking(move || assembler.assemble(frames, &destination))
                .await
                .map_err(|e| RecordingError::EncodingFailed(e.to_string()))??;
        }
    }

    Ok(RecordingResult {
        id: session.id,
        url: session.output_url,
        duration,
        format: session.format.extension().to_string(),
        timestamp: Utc::now(),
    })
}

/// Tear a session down without producing an artifact: capture stops,
/// encoders are killed and any partial output is deleted. Used by cancel
/// and by a start losing the race against a concurrent cancel.
async fn abort_session(mut session: ActiveSession, backend: &Mutex<Box<dyn CaptureBackend>>) {
    session.router.set_accepting(false);
    backend.lock().await.stop().await;

    if let Some(mut adapter) = session.microphone.take() {
        let _ = tokio::task::spawn_blocking(move || adapter.stop()).await;
    }
    for overlay in &session.overlays {
        overlay.stop();
    }

    discard_sink(&session.sink).await;
    session.router.clear();
    session.ticker.abort();
}

/// Best-effort sink discard used by cancel and failed starts
async fn discard_sink(sink: &ActiveSink) {
    match sink {
        ActiveSink::Video(sink) => {
            let sink = sink.clone();
            let _ = tokio::task::spawn_blocking(move || sink.discard()).await;
        }
        ActiveSink::Gif(buffer) => {
            buffer.take_frames();
        }
    }
}
