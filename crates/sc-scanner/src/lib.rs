//! Conflict scanning and grouping engine for sibscan.
//!
//! This crate walks a synchronized directory tree looking for conflict
//! artifacts, streams what it finds to a consumer, and groups the paths into
//! sibships (all variants of one original file) as they arrive.
//!
//! # Overview
//!
//! The main entry point is [`ScanSession`], which combines:
//!
//! - [`ConflictWalker`]: directory traversal on a dedicated thread
//! - [`RateWatcher`]: smoothed entries-per-second estimate for progress
//! - [`SibshipRegistry`]: grouping by canonical path with change notifications
//! - [`ScanStats`]: atomic counters readable while the walk runs
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use sc_scanner::{MembershipChange, ScanConfig, ScanSession, SibshipRegistry};
//!
//! let registry = SibshipRegistry::new().with_listener(|change: &MembershipChange<'_>| {
//!     println!("{} -> {}", change.path, change.sibship.canonical());
//! });
//!
//! let config = ScanConfig::new(Utf8Path::new("/srv/sync")).with_skip_dirs(&[".stversions"]);
//! let mut session = ScanSession::start(config, registry)?;
//!
//! while !session.is_finished() {
//!     let summary = session.drain();
//!     if let Some(progress) = summary.latest {
//!         eprintln!("{:.0} entries/s", progress.rate);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//!
//! let (report, registry) = session.join()?;
//! println!("{} groups from {} entries", registry.len(), report.stats.examined);
//! # Ok::<(), sc_scanner::ScanError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ScanSession (consuming side)
//!     │
//!     ├── walker thread ──────────────────────────┐
//!     │       ConflictWalker                      │
//!     │         ├── WalkBuilder (ignore crate)    │
//!     │         ├── RateWatcher                   │
//!     │         └── ScanStats (atomic counters)   │
//!     │                                           │
//!     ├── conflict paths  ◄── unbounded mpsc ─────┤
//!     ├── progress        ◄── unbounded mpsc ─────┘
//!     │
//!     └── SibshipRegistry (FxHashMap index, no locks)
//!             └── MembershipListener
//! ```
//!
//! The walker never touches a sibship and the registry never walks the tree;
//! the two channels are the only link between them.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod error;
mod rate;
mod registry;
mod session;
mod stats;
mod walker;

pub use error::ScanError;
pub use rate::{DEFAULT_SMOOTHING_WINDOW, RateWatcher};
pub use registry::{
    DiskProbe, MemberKind, MembershipChange, MembershipListener, PathProbe, Removal, Sibship,
    SibshipId, SibshipRegistry,
};
pub use session::{DrainSummary, ScanSession, SessionEvent, WALKER_THREAD_NAME};
pub use stats::{ScanStats, StatsSnapshot};
pub use walker::{ConflictWalker, WalkOutputs, WalkReport};

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

/// Default minimum time between two progress snapshots.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for one walk.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use camino::Utf8Path;
/// use sc_scanner::ScanConfig;
///
/// let config = ScanConfig::new(Utf8Path::new("/srv/sync"))
///     .with_skip_dirs(&[".stversions"])
///     .with_min_interval(Duration::from_millis(250));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Root directory to scan.
    pub root: Utf8PathBuf,
    /// Directory names pruned from the walk.
    pub skip_dirs: Vec<String>,
    /// Whether hidden files and directories are skipped.
    pub skip_hidden: bool,
    /// Minimum time between two progress snapshots.
    pub min_interval: Duration,
    /// Number of samples the rate watcher averages.
    pub smoothing_window: usize,
}

impl ScanConfig {
    /// Creates a configuration for `root` with default settings.
    #[must_use]
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_owned(),
            skip_dirs: Vec::new(),
            skip_hidden: false,
            min_interval: DEFAULT_MIN_INTERVAL,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
        }
    }

    /// Builds a walk configuration from loaded settings.
    ///
    /// Uses `config.scan.root_path` as the root.
    #[must_use]
    pub fn from_settings(config: &sc_core::Config) -> Self {
        Self {
            root: config.scan.root_path.clone(),
            skip_dirs: config.scan.skip_dirs.clone(),
            skip_hidden: config.scan.skip_hidden,
            min_interval: config.progress.min_interval(),
            smoothing_window: config.progress.smoothing_window,
        }
    }

    /// Adds directory names to prune.
    #[must_use]
    pub fn with_skip_dirs(mut self, dirs: &[&str]) -> Self {
        self.skip_dirs.extend(dirs.iter().map(ToString::to_string));
        self
    }

    /// Configures whether hidden entries are skipped.
    #[must_use]
    pub const fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Sets the minimum time between progress snapshots.
    #[must_use]
    pub const fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the rate watcher's smoothing window.
    #[must_use]
    pub const fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = window;
        self
    }

    /// Checks the settings a walk cannot run with.
    ///
    /// The root is not checked: a missing root yields an empty walk.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.smoothing_window == 0 {
            return Err(ScanError::config("smoothing window must be at least 1"));
        }
        if self.root.as_str().is_empty() {
            return Err(ScanError::config("root path is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_config_defaults() {
        let config = ScanConfig::new(Utf8Path::new("/srv/sync"));
        assert_eq!(config.root, "/srv/sync");
        assert!(config.skip_dirs.is_empty());
        assert!(!config.skip_hidden);
        assert_eq!(config.min_interval, Duration::from_millis(100));
        assert_eq!(config.smoothing_window, 10);
    }

    #[test]
    fn test_scan_config_builders() {
        let config = ScanConfig::new(Utf8Path::new("/srv/sync"))
            .with_skip_dirs(&[".stversions", ".stfolder"])
            .with_skip_hidden(true)
            .with_min_interval(Duration::ZERO)
            .with_smoothing_window(3);
        assert_eq!(config.skip_dirs, vec![".stversions", ".stfolder"]);
        assert!(config.skip_hidden);
        assert_eq!(config.min_interval, Duration::ZERO);
        assert_eq!(config.smoothing_window, 3);
    }

    #[test]
    fn test_scan_config_from_settings() {
        let mut settings = sc_core::Config::default();
        settings.scan.root_path = Utf8PathBuf::from("/data");
        settings.scan.skip_dirs = vec!["tmp".to_owned()];
        settings.progress.min_interval_ms = 250;
        settings.progress.smoothing_window = 4;

        let config = ScanConfig::from_settings(&settings);
        assert_eq!(config.root, "/data");
        assert_eq!(config.skip_dirs, vec!["tmp"]);
        assert_eq!(config.min_interval, Duration::from_millis(250));
        assert_eq!(config.smoothing_window, 4);
    }

    #[test]
    fn test_scan_config_validate() {
        assert!(ScanConfig::new(Utf8Path::new("/nonexistent")).validate().is_ok());
        assert!(
            ScanConfig::new(Utf8Path::new("/srv"))
                .with_smoothing_window(0)
                .validate()
                .is_err()
        );
        assert!(ScanConfig::new(Utf8Path::new("")).validate().is_err());
    }
}
