//! Destination collaborator interface
//!
//! The host application decides where recordings land; the recording core
//! only asks for a resolved output URL at session start and never invents
//! directory layouts on its own.

use crate::config::RecordingFormat;
use crate::error::Result;
use chrono::Utc;
use std::path::PathBuf;

/// Supplies the output URL for a new recording session
pub trait DestinationProvider: Send + Sync {
    /// Resolve the output path for a session of the given format. The
    /// path's parent directory need not exist yet.
    fn resolve(&self, format: &RecordingFormat) -> Result<PathBuf>;
}

/// Default provider: timestamped filenames inside a fixed directory
pub struct TimestampedDestination {
    dir: PathBuf,
}

impl TimestampedDestination {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl DestinationProvider for TimestampedDestination {
    fn resolve(&self, format: &RecordingFormat) -> Result<PathBuf> {
        let name = format!(
            "recording-{}.{}",
            Utc::now().format("%Y-%m-%d_%H-%M-%S%.3f"),
            format.extension()
        );
        Ok(self.dir.join(name))
    }
}

/// Provider with a fixed answer, for hosts that let the user pick a path
pub struct FixedDestination {
    path: PathBuf,
}

impl FixedDestination {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DestinationProvider for FixedDestination {
    fn resolve(&self, _format: &RecordingFormat) -> Result<PathBuf> {
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GifConfig, VideoConfig};

    #[test]
    fn timestamped_names_carry_the_format_extension() {
        let provider = TimestampedDestination::new(PathBuf::from("/tmp/recordings"));

        let video = provider
            .resolve(&RecordingFormat::Video(VideoConfig::default()))
            .unwrap();
        assert_eq!(video.extension().unwrap(), "mp4");
        assert!(video.starts_with("/tmp/recordings"));

        let gif = provider
            .resolve(&RecordingFormat::Gif(GifConfig::default()))
            .unwrap();
        assert_eq!(gif.extension().unwrap(), "gif");
    }

    #[test]
    fn fixed_destination_ignores_the_format() {
        let provider = FixedDestination::new(PathBuf::from("/tmp/demo.mp4"));
        let path = provider
            .resolve(&RecordingFormat::Gif(GifConfig::default()))
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/demo.mp4"));
    }
}
