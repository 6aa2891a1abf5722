//! Directory traversal for conflict artifacts.
//!
//! This module provides [`ConflictWalker`], which visits every directory
//! under a root, examines each non-directory entry, and streams two feeds:
//!
//! - conflict paths, one per entry whose name [looks like a conflict
//!   artifact](sc_core::is_conflict_artifact)
//! - throttled [`ProgressSnapshot`]s, closed by exactly one terminal snapshot
//!
//! # Traversal Order
//!
//! Directories are visited depth-first without following symbolic links.
//! Each directory is listed once by a single-level `ignore` walk, sorted by
//! name: its files are examined first, then its subdirectories are visited
//! in the same byte-wise name order, so a given tree always produces the
//! same sequence.
//!
//! # Failure Handling
//!
//! Unreadable directories and entry errors are logged, counted, and
//! collected into the returned [`WalkReport`]. The walk itself always runs to
//! the end (or until cancelled) and always sends the terminal snapshot.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use sc_core::{ProgressSnapshot, is_conflict_artifact};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ScanConfig;
use crate::error::ScanError;
use crate::rate::RateWatcher;
use crate::stats::{ScanStats, StatsSnapshot};

/// The two output feeds of a walk.
///
/// Both channels are unbounded so the walker never waits on its consumer.
#[derive(Debug, Clone)]
pub struct WalkOutputs {
    /// Conflict artifact paths, in discovery order.
    pub conflicts: UnboundedSender<Utf8PathBuf>,
    /// Progress snapshots, ending with a terminal snapshot.
    pub progress: UnboundedSender<ProgressSnapshot>,
}

impl WalkOutputs {
    /// Returns `true` once nobody is listening on either feed.
    fn is_closed(&self) -> bool {
        self.conflicts.is_closed() && self.progress.is_closed()
    }
}

/// Outcome of a finished walk.
#[derive(Debug)]
pub struct WalkReport {
    /// Final counter values.
    pub stats: StatsSnapshot,
    /// Recoverable errors met along the way, in order.
    pub errors: Vec<ScanError>,
    /// Whether the walk stopped before visiting the whole tree.
    pub cancelled: bool,
}

/// Walks a directory tree looking for conflict artifacts.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use sc_scanner::{ConflictWalker, ScanConfig, ScanStats, WalkOutputs};
/// use tokio::sync::mpsc::unbounded_channel;
/// use tokio_util::sync::CancellationToken;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("a.txt"), "x").unwrap();
/// std::fs::write(dir.path().join("a.sync-conflict-20230723-000249-ONMECE6.txt"), "y").unwrap();
///
/// let root = Utf8Path::from_path(dir.path()).unwrap();
/// let (conflicts, mut conflict_rx) = unbounded_channel();
/// let (progress, mut progress_rx) = unbounded_channel();
/// let outputs = WalkOutputs { conflicts, progress };
///
/// let walker = ConflictWalker::new(ScanConfig::new(root));
/// let report = walker.walk(&outputs, &ScanStats::new(), &CancellationToken::new());
///
/// assert_eq!(report.stats.examined, 2);
/// assert!(conflict_rx.try_recv().unwrap().as_str().ends_with("ONMECE6.txt"));
/// while let Ok(snapshot) = progress_rx.try_recv() {
///     if snapshot.is_terminal() {
///         assert_eq!(snapshot.examined, 2);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ConflictWalker {
    config: ScanConfig,
}

/// Mutable bookkeeping for one walk.
struct WalkState {
    watcher: RateWatcher,
    last_report: Instant,
    examined: u64,
    errors: Vec<ScanError>,
}

impl WalkState {
    fn new(smoothing_window: usize) -> Self {
        Self {
            watcher: RateWatcher::new(smoothing_window),
            last_report: Instant::now(),
            examined: 0,
            errors: Vec::new(),
        }
    }
}

/// One directory's entries, split by kind, each in name order.
#[derive(Debug, Default)]
struct Listing {
    files: Vec<OsString>,
    subdirs: Vec<PathBuf>,
}

impl ConflictWalker {
    /// Creates a walker for the given configuration.
    #[must_use]
    pub const fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.config.root
    }

    /// Runs the walk to completion on the current thread.
    ///
    /// `cancel` is checked between directories; a cancelled walk still sends
    /// its terminal snapshot. If both output receivers have been dropped the
    /// walk stops as if cancelled.
    pub fn walk(
        &self,
        outputs: &WalkOutputs,
        stats: &ScanStats,
        cancel: &CancellationToken,
    ) -> WalkReport {
        info!(root = %self.config.root, "Starting conflict walk");

        let mut state = WalkState::new(self.config.smoothing_window);
        let mut cancelled = false;
        let mut pending = vec![self.config.root.clone().into_std_path_buf()];

        while let Some(dir) = pending.pop() {
            if cancel.is_cancelled() || outputs.is_closed() {
                cancelled = true;
                break;
            }

            let subdirs = self.visit_directory(&dir, outputs, stats, &mut state);
            // Reversed so the stack pops them in name order.
            pending.extend(subdirs.into_iter().rev());
        }

        // Nobody may be listening any more; the walk still ends normally.
        let _ = outputs.progress.send(ProgressSnapshot::finished(state.examined));

        let report = WalkReport {
            stats: stats.snapshot(),
            errors: state.errors,
            cancelled,
        };

        info!(
            examined = report.stats.examined,
            directories = report.stats.directories,
            conflicts = report.stats.conflicts,
            skipped_dirs = report.stats.skipped_dirs,
            cancelled,
            "Conflict walk completed"
        );

        report
    }

    /// Lists one directory, examines its files, and returns the
    /// subdirectories still to visit.
    fn visit_directory(
        &self,
        dir: &Path,
        outputs: &WalkOutputs,
        stats: &ScanStats,
        state: &mut WalkState,
    ) -> Vec<PathBuf> {
        let display_dir = Utf8PathBuf::from(dir.to_string_lossy().into_owned());

        let listing = match self.list_directory(dir, stats, state) {
            Ok(listing) => listing,
            Err(err) => {
                warn!(dir = %display_dir, error = %err, "Skipping unreadable directory");
                stats.increment_skipped_dirs();
                state.errors.push(ScanError::read_dir(display_dir, err));
                return Vec::new();
            }
        };
        stats.increment_directories();

        let utf8_dir = Utf8Path::from_path(dir);
        if utf8_dir.is_none() {
            debug!(dir = %display_dir, "Directory path is not UTF-8, conflicts cannot be reported");
            state.errors.push(ScanError::NonUtf8Path(dir.to_owned()));
        }

        let total = listing.files.len();
        for (index, name) in listing.files.iter().enumerate() {
            state.examined += 1;
            stats.increment_examined();
            state.watcher.tick();

            if state.last_report.elapsed() >= self.config.min_interval {
                if let Some(rate) = state.watcher.rate() {
                    state.last_report = Instant::now();
                    let remaining = (total - index) as u64;
                    trace!(rate, examined = state.examined, remaining, "Progress");
                    let _ = outputs.progress.send(ProgressSnapshot::scanning(
                        rate,
                        state.examined,
                        remaining,
                        &display_dir,
                    ));
                }
            }

            let (Some(dir), Some(name)) = (utf8_dir, name.to_str()) else {
                continue;
            };

            if is_conflict_artifact(name) {
                let path = dir.join(name);
                debug!(path = %path, "Found conflict artifact");
                stats.increment_conflicts();
                let _ = outputs.conflicts.send(path);
            }
        }

        listing.subdirs
    }

    /// Reads the entries of `dir` once, sorting them into files to examine
    /// and subdirectories to descend.
    ///
    /// Fails only when `dir` itself cannot be read; errors on single entries
    /// are recorded and the entry is skipped.
    fn list_directory(
        &self,
        dir: &Path,
        stats: &ScanStats,
        state: &mut WalkState,
    ) -> std::io::Result<Listing> {
        let mut listing = Listing::default();

        for result in self.build_lister(dir) {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) if error_path(&err) == Some(dir) && err.io_error().is_some() => {
                    if let Some(io_err) = err.into_io_error() {
                        return Err(io_err);
                    }
                    continue;
                }
                Err(err) => {
                    record_walk_error(err, stats, state);
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            let is_link = entry.path_is_symlink();

            if is_dir {
                if self.is_skipped_dir(entry.file_name()) {
                    trace!(dir = %entry.path().display(), "Pruned directory");
                } else {
                    listing.subdirs.push(entry.into_path());
                }
            } else if is_link && entry.path().is_dir() {
                // Links to directories are neither descended nor examined.
                trace!(link = %entry.path().display(), "Skipping directory link");
            } else {
                listing.files.push(entry.file_name().to_owned());
            }
        }

        Ok(listing)
    }

    fn is_skipped_dir(&self, name: &std::ffi::OsStr) -> bool {
        self.config.skip_dirs.iter().any(|skip| name == skip.as_str())
    }

    /// Builds a single-level, name-sorted lister for `dir`.
    fn build_lister(&self, dir: &Path) -> ignore::Walk {
        WalkBuilder::new(dir)
            // A plain listing: no ignore files, hidden entries on request
            .standard_filters(false)
            .hidden(self.config.skip_hidden)
            .follow_links(false)
            .require_git(false)
            .max_depth(Some(1))
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
    }
}

/// Logs and records an error reported for a single entry.
fn record_walk_error(err: ignore::Error, stats: &ScanStats, state: &mut WalkState) {
    warn!(error = %err, "Skipping entry after walk error");
    stats.increment_walk_errors();
    state.errors.push(ScanError::Walk(err));
}

/// Finds the path an `ignore` error refers to, looking through wrappers.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}
