//! Overlay collaborator interface
//!
//! Click and keystroke visualizers live outside the recording core; the
//! core only drives their lifecycle per the configured flags. Their
//! rendered visuals are never composited into the recorded stream here.

/// Minimal start/stop capability for a session-scoped overlay
pub trait OverlayController: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Overlay that does nothing
pub struct NoopOverlay;

impl OverlayController for NoopOverlay {
    fn start(&self) {}
    fn stop(&self) {}
}
