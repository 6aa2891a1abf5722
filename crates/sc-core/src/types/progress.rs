//! Progress snapshots for a running scan.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// A point-in-time view of scan progress.
///
/// Snapshots are emitted by the directory walker at a throttled rate while it
/// runs, followed by exactly one terminal snapshot whose `directory` is
/// `None`. Consumers use the terminal snapshot to learn that scanning ended.
///
/// # Examples
///
/// ```
/// use sc_core::ProgressSnapshot;
///
/// let done = ProgressSnapshot::finished(42);
/// assert!(done.is_terminal());
/// assert_eq!(done.examined, 42);
/// assert_eq!(done.remaining, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Smoothed number of entries examined per second.
    pub rate: f64,

    /// Cumulative number of filesystem entries examined.
    pub examined: u64,

    /// Entries of `directory` not yet visited, including the current one.
    pub remaining: u64,

    /// Directory being visited, or `None` on the terminal snapshot.
    pub directory: Option<Utf8PathBuf>,
}

impl ProgressSnapshot {
    /// Creates an in-progress snapshot for `directory`.
    #[must_use]
    pub fn scanning(rate: f64, examined: u64, remaining: u64, directory: &Utf8Path) -> Self {
        Self {
            rate,
            examined,
            remaining,
            directory: Some(directory.to_owned()),
        }
    }

    /// Creates the terminal snapshot sent once a walk has ended.
    #[must_use]
    pub const fn finished(examined: u64) -> Self {
        Self {
            rate: 0.0,
            examined,
            remaining: 0,
            directory: None,
        }
    }

    /// Returns `true` for the terminal snapshot.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.directory.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scanning_snapshot() {
        let snap = ProgressSnapshot::scanning(120.5, 10, 3, Utf8Path::new("/data/photos"));
        assert!(!snap.is_terminal());
        assert_eq!(snap.directory.as_deref(), Some(Utf8Path::new("/data/photos")));
        assert_eq!(snap.remaining, 3);
    }

    #[test]
    fn test_finished_snapshot() {
        let snap = ProgressSnapshot::finished(0);
        assert!(snap.is_terminal());
        assert_eq!(snap.examined, 0);
        assert!(snap.rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snap = ProgressSnapshot::scanning(2.5, 7, 1, Utf8Path::new("/sync/docs"));
        insta::assert_json_snapshot!(snap, @r#"
        {
          "rate": 2.5,
          "examined": 7,
          "remaining": 1,
          "directory": "/sync/docs"
        }
        "#);
    }

    #[test]
    fn test_terminal_snapshot_serializes_null_directory() {
        let json = serde_json::to_string(&ProgressSnapshot::finished(3)).unwrap();
        assert_eq!(
            json,
            r#"{"rate":0.0,"examined":3,"remaining":0,"directory":null}"#
        );
    }
}
