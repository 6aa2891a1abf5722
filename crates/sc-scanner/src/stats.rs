//! Walk statistics with atomic counters.
//!
//! This module provides [`ScanStats`], which the walker thread updates as it
//! goes, and [`StatsSnapshot`] for point-in-time views from any other thread.
//!
//! # Thread Safety
//!
//! All counters use [`AtomicU64`] with [`Relaxed`](std::sync::atomic::Ordering::Relaxed)
//! ordering. The numbers are informational and don't order any other memory.
//!
//! # Examples
//!
//! ```
//! use sc_scanner::ScanStats;
//!
//! let stats = ScanStats::new();
//! stats.increment_examined();
//! stats.increment_conflicts();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.examined, 1);
//! assert_eq!(snapshot.conflicts, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for one walk.
///
/// Shared between the walker thread and its session via `Arc`, so a consumer
/// can read live totals without waiting for a progress snapshot.
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Filesystem entries examined.
    examined: AtomicU64,
    /// Directories whose listing was read.
    directories: AtomicU64,
    /// Conflict paths emitted.
    conflicts: AtomicU64,
    /// Directories that could not be listed.
    skipped_dirs: AtomicU64,
    /// Entries the directory listing could not inspect.
    walk_errors: AtomicU64,
}

impl ScanStats {
    /// Creates a new [`ScanStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the examined-entries counter.
    #[inline]
    pub fn increment_examined(&self) {
        self.examined.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the visited-directories counter.
    #[inline]
    pub fn increment_directories(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the emitted-conflicts counter.
    #[inline]
    pub fn increment_conflicts(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the skipped-directories counter.
    #[inline]
    pub fn increment_skipped_dirs(&self) {
        self.skipped_dirs.fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the walk-error counter.
    #[inline]
    pub fn increment_walk_errors(&self) {
        self.walk_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    ///
    /// Each counter is read independently, so a snapshot taken mid-walk may
    /// mix values from slightly different moments.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            examined: self.examined.load(Ordering::Relaxed),
            directories: self.directories.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            skipped_dirs: self.skipped_dirs.load(Ordering::Relaxed),
            walk_errors: self.walk_errors.load(Ordering::Relaxed),
        }
    }
}

/// A copied view of [`ScanStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Filesystem entries examined.
    pub examined: u64,
    /// Directories whose listing was read.
    pub directories: u64,
    /// Conflict paths emitted.
    pub conflicts: u64,
    /// Directories that could not be listed.
    pub skipped_dirs: u64,
    /// Entries the directory listing could not inspect.
    pub walk_errors: u64,
}

impl StatsSnapshot {
    /// Returns `true` if any part of the tree could not be read.
    #[inline]
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.skipped_dirs > 0 || self.walk_errors > 0
    }
}
