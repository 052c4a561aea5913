//! Error types and handling
//!
//! Common error types used across the recording pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recording pipeline error type
///
/// Precondition errors (`AlreadyRecording`, `NotRecording`,
/// `ScreenCaptureNotAuthorized`, `MicrophoneNotAuthorized`,
/// `InsufficientDiskSpace`) are raised before any resource allocation.
/// Everything else triggers a full cleanup with the state reset to idle.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording is in progress")]
    NotRecording,

    #[error("screen recording permission not granted. Please allow screen recording in your system's privacy settings and try again.")]
    ScreenCaptureNotAuthorized,

    #[error("microphone permission not granted. Please allow microphone access in your system's privacy settings and try again.")]
    MicrophoneNotAuthorized,

    #[error("not enough free disk space at the destination: {available_mb} MB available, {required_mb} MB required. Free up space and try again.")]
    InsufficientDiskSpace { available_mb: u64, required_mb: u64 },

    #[error("cannot create output file at {path}: {source}")]
    CannotCreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder setup failed: {0}")]
    EncoderSetupFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("no frames were captured, nothing to encode")]
    NoFramesToEncode,

    #[error("capture stream terminated unexpectedly: {0}")]
    StreamTerminated(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecordingError {
    /// Stable error code for host applications.
    pub fn code(&self) -> &'static str {
        match self {
            RecordingError::AlreadyRecording => "ALREADY_RECORDING",
            RecordingError::NotRecording => "NOT_RECORDING",
            RecordingError::ScreenCaptureNotAuthorized => "SCREEN_CAPTURE_NOT_AUTHORIZED",
            RecordingError::MicrophoneNotAuthorized => "MICROPHONE_NOT_AUTHORIZED",
            RecordingError::InsufficientDiskSpace { .. } => "INSUFFICIENT_DISK_SPACE",
            RecordingError::CannotCreateFile { .. } => "CANNOT_CREATE_FILE",
            RecordingError::EncoderSetupFailed(_) => "ENCODER_SETUP_FAILED",
            RecordingError::EncodingFailed(_) => "ENCODING_FAILED",
            RecordingError::NoFramesToEncode => "NO_FRAMES_TO_ENCODE",
            RecordingError::StreamTerminated(_) => "STREAM_TERMINATED",
            RecordingError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether this error was raised before any session resources existed.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RecordingError::AlreadyRecording
                | RecordingError::NotRecording
                | RecordingError::ScreenCaptureNotAuthorized
                | RecordingError::MicrophoneNotAuthorized
                | RecordingError::InsufficientDiskSpace { .. }
        )
    }
}

/// Error response for host applications (frontends, IPC bridges)
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecordingError> for ErrorResponse {
    fn from(error: RecordingError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecordingError
pub type Result<T> = std::result::Result<T, RecordingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_are_flagged() {
        assert!(RecordingError::AlreadyRecording.is_precondition());
        assert!(RecordingError::InsufficientDiskSpace {
            available_mb: 12,
            required_mb: 500
        }
        .is_precondition());
        assert!(!RecordingError::NoFramesToEncode.is_precondition());
        assert!(!RecordingError::EncodingFailed("x".into()).is_precondition());
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let response: ErrorResponse = RecordingError::NotRecording.into();
        assert_eq!(response.code, "NOT_RECORDING");
        assert!(!response.message.is_empty());
    }

    #[test]
    fn permission_errors_hint_at_privacy_settings() {
        let message = RecordingError::MicrophoneNotAuthorized.to_string();
        assert!(message.contains("privacy settings"));
    }
}
