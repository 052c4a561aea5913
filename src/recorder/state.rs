//! Session lifecycle state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of the recording controller.
///
/// `Starting` and `Stopping` cover the async windows where preconditions
/// run or finalization is in flight; both reject concurrent starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
}

impl RecordingState {
    /// Whether a session exists in any form
    pub fn is_busy(&self) -> bool {
        !matches!(self, RecordingState::Idle)
    }
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// The finished artifact handed back from a successful stop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResult {
    /// Session identifier
    pub id: Uuid,

    /// Location of the finished file
    pub url: PathBuf,

    /// Recorded duration, paused intervals excluded
    pub duration: Duration,

    /// Output container extension, `mp4` or `gif`
    pub format: String,

    /// When the recording finished
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_is_not_busy() {
        assert!(!RecordingState::Idle.is_busy());
        assert!(RecordingState::Starting.is_busy());
        assert!(RecordingState::Paused.is_busy());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&RecordingState::Recording).unwrap();
        assert_eq!(json, "\"recording\"");
    }
}
