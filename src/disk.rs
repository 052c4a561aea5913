//! Pre-flight disk capacity check
//!
//! Queries available space at the destination volume before a session
//! allocates anything. When the query itself fails the guard fails open:
//! transient filesystem-metadata errors should not block recording.

use crate::error::{RecordingError, Result};
use std::path::Path;
use sysinfo::Disks;

/// Minimum free space required at the destination volume
pub const MIN_FREE_BYTES: u64 = 500 * 1024 * 1024;

/// Checks destination volume capacity before recording starts
#[derive(Debug, Clone)]
pub struct DiskSpaceGuard {
    min_free: u64,
}

impl DiskSpaceGuard {
    pub fn new() -> Self {
        Self {
            min_free: MIN_FREE_BYTES,
        }
    }

    /// Override the threshold, mainly for tests
    pub fn with_min_free(min_free: u64) -> Self {
        Self { min_free }
    }

    /// Fail if the destination volume has less than the threshold free.
    pub fn check(&self, destination: &Path) -> Result<()> {
        verdict(available_space(destination), self.min_free)
    }
}

impl Default for DiskSpaceGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Available bytes on the volume holding `path`, if it can be determined
fn available_space(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

fn verdict(available: Option<u64>, min_free: u64) -> Result<()> {
    match available {
        Some(bytes) if bytes < min_free => Err(RecordingError::InsufficientDiskSpace {
            available_mb: bytes / (1024 * 1024),
            required_mb: min_free / (1024 * 1024),
        }),
        Some(_) => Ok(()),
        None => {
            tracing::warn!("could not determine free disk space, proceeding anyway");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_rejected() {
        let result = verdict(Some(MIN_FREE_BYTES - 1), MIN_FREE_BYTES);
        assert!(matches!(
            result,
            Err(RecordingError::InsufficientDiskSpace { .. })
        ));
    }

    #[test]
    fn at_threshold_is_accepted() {
        assert!(verdict(Some(MIN_FREE_BYTES), MIN_FREE_BYTES).is_ok());
    }

    #[test]
    fn unknown_capacity_fails_open() {
        assert!(verdict(None, MIN_FREE_BYTES).is_ok());
    }

    #[test]
    fn error_reports_megabytes() {
        let err = verdict(Some(12 * 1024 * 1024), MIN_FREE_BYTES).unwrap_err();
        match err {
            RecordingError::InsufficientDiskSpace {
                available_mb,
                required_mb,
            } => {
                assert_eq!(available_mb, 12);
                assert_eq!(required_mb, 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
