//! End-to-end session lifecycle tests driven through the scripted
//! capture backend.

use screenflow::capture::{
    CaptureBackend, CaptureConfig, CaptureEvent, SampleInjector, SampleSink,
    ScriptedCaptureBackend,
};
use screenflow::config::{GifConfig, RecordingFormat, RecordingRegion, VideoConfig};
use screenflow::permissions::{AuthorizationStatus, StaticPermissions};
use screenflow::sample::{Sample, VideoFrame};
use screenflow::{RecordingController, RecordingError, RecordingEvent, RecordingState};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

fn region() -> RecordingRegion {
    RecordingRegion::Display { id: 0 }
}

fn gif_format() -> RecordingFormat {
    RecordingFormat::Gif(GifConfig::default())
}

fn frame(ms: u64) -> Sample {
    Sample::Video(VideoFrame::new(
        vec![128u8; 8 * 8 * 4],
        8,
        8,
        Duration::from_millis(ms),
    ))
}

fn controller_in(dir: &Path) -> (RecordingController, SampleInjector) {
    let (backend, injector) = ScriptedCaptureBackend::new();
    let controller =
        RecordingController::new(Box::new(backend)).with_output_dir(dir.to_path_buf());
    (controller, injector)
}

/// Scripted backend whose startup dwells long enough for another call to
/// land inside the starting window.
struct SlowStartBackend {
    inner: ScriptedCaptureBackend,
    delay: Duration,
}

#[async_trait::async_trait]
impl CaptureBackend for SlowStartBackend {
    async fn start(
        &mut self,
        config: CaptureConfig,
        sink: Arc<dyn SampleSink>,
        events: tokio::sync::mpsc::Sender<CaptureEvent>,
    ) -> screenflow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.start(config, sink, events).await
    }

    async fn stop(&mut self) {
        self.inner.stop().await;
    }
}

async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<RecordingEvent>,
    mut matches: F,
) -> RecordingEvent
where
    F: FnMut(&RecordingEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn gif_session_produces_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();
    assert_eq!(controller.state(), RecordingState::Recording);
    assert!(injector.started());

    for i in 0..5 {
        assert!(injector.push(frame(i * 66)));
    }

    let result = controller.stop().await.unwrap();
    assert_eq!(result.format, "gif");
    assert!(result.url.exists());
    assert!(std::fs::metadata(&result.url).unwrap().len() > 0);
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(injector.stopped());
}

#[tokio::test]
async fn stopping_twice_fails_the_second_time() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();
    injector.push(frame(0));
    controller.stop().await.unwrap();

    let second = controller.stop().await;
    assert!(matches!(second, Err(RecordingError::NotRecording)));
}

#[tokio::test]
async fn starting_while_recording_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();

    let second = controller.start(region(), gif_format()).await;
    assert!(matches!(second, Err(RecordingError::AlreadyRecording)));

    // The live session is untouched by the rejected start
    assert_eq!(controller.state(), RecordingState::Recording);
    controller.cancel().await;
}

#[tokio::test]
async fn cancel_from_idle_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.cancel().await;
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(!injector.started());
}

#[tokio::test]
async fn cancel_discards_the_session_without_an_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();
    for i in 0..5 {
        injector.push(frame(i * 66));
    }

    controller.cancel().await;
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(injector.stopped());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "cancel must not leave files behind");
}

#[tokio::test]
async fn stop_with_zero_frames_fails_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();

    let result = controller.stop().await;
    assert!(matches!(result, Err(RecordingError::NoFramesToEncode)));
    assert_eq!(controller.state(), RecordingState::Idle);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "no file may exist for an empty session");
}

#[tokio::test]
async fn microphone_denial_fails_before_capture_starts() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());
    let controller = controller.with_permissions(Arc::new(StaticPermissions {
        screen_capture: AuthorizationStatus::Authorized,
        microphone: AuthorizationStatus::Denied,
    }));

    let format = RecordingFormat::Video(VideoConfig {
        include_microphone: true,
        ..Default::default()
    });

    let result = controller.start(region(), format).await;
    assert!(matches!(
        result,
        Err(RecordingError::MicrophoneNotAuthorized)
    ));
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(!injector.started(), "backend must never start");

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn screen_denial_takes_priority() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _injector) = controller_in(dir.path());
    let controller = controller.with_permissions(Arc::new(StaticPermissions {
        screen_capture: AuthorizationStatus::Denied,
        microphone: AuthorizationStatus::Denied,
    }));

    let format = RecordingFormat::Video(VideoConfig {
        include_microphone: true,
        ..Default::default()
    });

    let result = controller.start(region(), format).await;
    assert!(matches!(
        result,
        Err(RecordingError::ScreenCaptureNotAuthorized)
    ));
}

#[tokio::test]
async fn paused_samples_are_dropped_not_deferred() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();
    assert!(injector.push(frame(0)));

    controller.pause().await.unwrap();
    assert_eq!(controller.state(), RecordingState::Paused);
    assert!(!injector.push(frame(66)));
    assert!(!injector.push(frame(132)));

    controller.resume().await.unwrap();
    assert!(injector.push(frame(200)));

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn pause_is_only_valid_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, _injector) = controller_in(dir.path());

    assert!(matches!(
        controller.pause().await,
        Err(RecordingError::NotRecording)
    ));

    controller.start(region(), gif_format()).await.unwrap();
    controller.pause().await.unwrap();

    // Pausing a paused session is rejected, as is resuming twice
    assert!(matches!(
        controller.pause().await,
        Err(RecordingError::NotRecording)
    ));
    controller.resume().await.unwrap();
    assert!(matches!(
        controller.resume().await,
        Err(RecordingError::NotRecording)
    ));

    controller.cancel().await;
}

#[tokio::test]
async fn duration_excludes_the_paused_interval() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    let wall_start = Instant::now();
    controller.start(region(), gif_format()).await.unwrap();
    injector.push(frame(0));

    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.pause().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.resume().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    injector.push(frame(500));
    let result = controller.stop().await.unwrap();
    let wall = wall_start.elapsed();

    // Roughly 500ms elapsed, 300ms of it paused
    assert!(
        result.duration + Duration::from_millis(250) <= wall,
        "duration {:?} should exclude the pause (wall {:?})",
        result.duration,
        wall
    );
    assert!(result.duration >= Duration::from_millis(150));
}

#[tokio::test]
async fn stream_termination_finalizes_what_was_captured() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());
    let mut events = controller.subscribe();

    controller.start(region(), gif_format()).await.unwrap();
    for i in 0..4 {
        injector.push(frame(i * 66));
    }

    injector.terminate("display disconnected");

    wait_for_event(&mut events, |e| matches!(e, RecordingEvent::StreamLost { .. })).await;
    let stopped =
        wait_for_event(&mut events, |e| matches!(e, RecordingEvent::Stopped(_))).await;

    let RecordingEvent::Stopped(result) = stopped else {
        unreachable!()
    };
    assert!(result.url.exists());
    assert_eq!(controller.state(), RecordingState::Idle);
}

#[tokio::test]
async fn cancel_during_startup_wins_over_the_start() {
    let dir = tempfile::tempdir().unwrap();
    let (scripted, injector) = ScriptedCaptureBackend::new();
    let backend = SlowStartBackend {
        inner: scripted,
        delay: Duration::from_millis(200),
    };
    let controller = Arc::new(
        RecordingController::new(Box::new(backend)).with_output_dir(dir.path().to_path_buf()),
    );

    let starter = controller.clone();
    let start_task = tokio::spawn(async move { starter.start(region(), gif_format()).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.state() != RecordingState::Starting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("start never entered the starting window");

    controller.cancel().await;
    assert_eq!(controller.state(), RecordingState::Idle);

    // The in-flight start must not resurrect the cancelled session
    let started = start_task.await.unwrap();
    assert!(matches!(started, Err(RecordingError::NotRecording)));
    assert_eq!(controller.state(), RecordingState::Idle);
    assert!(!injector.started() || injector.stopped());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "the losing start must clean up");
}

#[tokio::test]
async fn stale_termination_cannot_touch_a_later_session() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();
    injector.push(frame(0));

    // Queue a termination event and stop in the same breath; the stop
    // takes the session, so the queued event must die with it
    injector.terminate("display disconnected");
    let first = controller.stop().await.unwrap();
    assert_eq!(controller.state(), RecordingState::Idle);

    controller.start(region(), gif_format()).await.unwrap();
    assert_eq!(controller.state(), RecordingState::Recording);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        controller.state(),
        RecordingState::Recording,
        "a stale termination event must not end the new session"
    );

    injector.push(frame(0));
    let second = controller.stop().await.unwrap();
    assert!(second.url.exists());
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn controller_is_reusable_after_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());

    controller.start(region(), gif_format()).await.unwrap();
    injector.push(frame(0));
    let first = controller.stop().await.unwrap();

    controller.start(region(), gif_format()).await.unwrap();
    injector.push(frame(0));
    let second = controller.stop().await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.url, second.url);
    assert!(first.url.exists());
    assert!(second.url.exists());
}

#[tokio::test]
async fn lifecycle_events_are_published_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, injector) = controller_in(dir.path());
    let mut events = controller.subscribe();

    controller.start(region(), gif_format()).await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, RecordingEvent::Started { .. })).await;

    injector.push(frame(0));
    controller.pause().await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, RecordingEvent::Paused)).await;

    controller.resume().await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, RecordingEvent::Resumed)).await;

    controller.stop().await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, RecordingEvent::Stopped(_))).await;
}
