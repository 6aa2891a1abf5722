//! One scan: a walker thread plus the registry fed from its output.
//!
//! [`ScanSession::start`] spawns the walker on its own OS thread and keeps the
//! receiving ends of both feeds. The consuming side polls the session with
//! [`try_next`](ScanSession::try_next), [`next`](ScanSession::next) or
//! [`drain`](ScanSession::drain); every conflict path received is ingested into
//! the session's [`SibshipRegistry`] before it is handed out, so membership
//! listeners always run on the consuming thread.
//!
//! Restarting a scan means dropping the session (which cancels its walker) and
//! starting a new one with a fresh registry.
//!
//! # Examples
//!
//! ```no_run
//! use camino::Utf8Path;
//! use sc_scanner::{ScanConfig, ScanSession, SibshipRegistry};
//!
//! # async fn run() -> Result<(), sc_scanner::ScanError> {
//! let config = ScanConfig::new(Utf8Path::new("/srv/sync"));
//! let mut session = ScanSession::start(config, SibshipRegistry::new())?;
//!
//! while let Some(event) = session.next().await {
//!     println!("{event:?}");
//! }
//!
//! let (report, registry) = session.join()?;
//! println!("{} groups, {} entries", registry.len(), report.stats.examined);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use camino::Utf8PathBuf;
use sc_core::ProgressSnapshot;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ScanConfig;
use crate::error::ScanError;
use crate::registry::{SibshipId, SibshipRegistry};
use crate::stats::{ScanStats, StatsSnapshot};
use crate::walker::{ConflictWalker, WalkOutputs, WalkReport};

/// Name given to walker threads.
pub const WALKER_THREAD_NAME: &str = "sibscan-walker";

/// Something the consuming side received from the walker.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A conflict path was received and ingested.
    Conflict {
        /// The sibship it joined.
        sibship: SibshipId,
        /// The conflict path.
        path: Utf8PathBuf,
        /// Whether ingesting it created the sibship.
        is_new_group: bool,
    },
    /// A progress snapshot was received.
    Progress(ProgressSnapshot),
}

/// What one [`ScanSession::drain`] call consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainSummary {
    /// Conflict paths ingested.
    pub ingested: usize,
    /// Sibships created.
    pub new_groups: usize,
    /// Most recent progress snapshot received, if any.
    pub latest: Option<ProgressSnapshot>,
    /// Whether the terminal snapshot has been received (now or earlier).
    pub finished: bool,
}

/// A running scan and the registry it feeds.
///
/// Dropping a session cancels its walker and detaches the thread.
#[derive(Debug)]
pub struct ScanSession {
    registry: SibshipRegistry,
    conflicts: UnboundedReceiver<Utf8PathBuf>,
    progress: UnboundedReceiver<ProgressSnapshot>,
    conflicts_open: bool,
    progress_open: bool,
    finished: bool,
    latest: Option<ProgressSnapshot>,
    stats: Arc<ScanStats>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<WalkReport>>,
}

enum Received {
    Conflict(Option<Utf8PathBuf>),
    Progress(Option<ProgressSnapshot>),
}

impl ScanSession {
    /// Starts walking `config.root` on a new thread.
    ///
    /// `registry` receives every conflict path found; register listeners on
    /// it before calling this.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] for an invalid configuration and
    /// [`ScanError::Spawn`] if the thread could not be created. A missing or
    /// unreadable root is not an error here: the walk reports it and ends.
    pub fn start(config: ScanConfig, registry: SibshipRegistry) -> Result<Self, ScanError> {
        config.validate()?;

        let (conflicts_tx, conflicts) = unbounded_channel();
        let (progress_tx, progress) = unbounded_channel();
        let outputs = WalkOutputs {
            conflicts: conflicts_tx,
            progress: progress_tx,
        };

        let stats = Arc::new(ScanStats::new());
        let cancel = CancellationToken::new();

        info!(root = %config.root, "Starting scan session");

        let walker = ConflictWalker::new(config);
        let thread_stats = Arc::clone(&stats);
        let thread_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(WALKER_THREAD_NAME.to_owned())
            .spawn(move || walker.walk(&outputs, &thread_stats, &thread_cancel))
            .map_err(ScanError::Spawn)?;

        Ok(Self {
            registry,
            conflicts,
            progress,
            conflicts_open: true,
            progress_open: true,
            finished: false,
            latest: None,
            stats,
            cancel,
            handle: Some(handle),
        })
    }

    /// Returns the next pending event without waiting.
    ///
    /// Pending conflict paths are returned before pending snapshots. `None`
    /// means nothing is queued right now, not that the scan is over; see
    /// [`is_finished`](Self::is_finished).
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        if self.conflicts_open {
            match self.conflicts.try_recv() {
                Ok(path) => return Some(self.accept_conflict(path)),
                Err(TryRecvError::Disconnected) => self.conflicts_open = false,
                Err(TryRecvError::Empty) => {}
            }
        }

        if self.progress_open {
            match self.progress.try_recv() {
                Ok(snapshot) => return Some(self.accept_progress(snapshot)),
                Err(TryRecvError::Disconnected) => self.progress_open = false,
                Err(TryRecvError::Empty) => {}
            }
        }

        None
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the walker has exited and both feeds are empty.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            let received = tokio::select! {
                biased;
                path = self.conflicts.recv(), if self.conflicts_open => Received::Conflict(path),
                snapshot = self.progress.recv(), if self.progress_open => Received::Progress(snapshot),
                else => return None,
            };

            match received {
                Received::Conflict(Some(path)) => return Some(self.accept_conflict(path)),
                Received::Progress(Some(snapshot)) => return Some(self.accept_progress(snapshot)),
                Received::Conflict(None) => self.conflicts_open = false,
                Received::Progress(None) => self.progress_open = false,
            }
        }
    }

    /// Consumes everything queued right now.
    pub fn drain(&mut self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        while let Some(event) = self.try_next() {
            match event {
                SessionEvent::Conflict { is_new_group, .. } => {
                    summary.ingested += 1;
                    if is_new_group {
                        summary.new_groups += 1;
                    }
                }
                SessionEvent::Progress(snapshot) => summary.latest = Some(snapshot),
            }
        }

        summary.finished = self.finished;
        summary
    }

    fn accept_conflict(&mut self, path: Utf8PathBuf) -> SessionEvent {
        let (sibship, is_new_group) = self.registry.ingest(&path);
        SessionEvent::Conflict {
            sibship,
            path,
            is_new_group,
        }
    }

    fn accept_progress(&mut self, snapshot: ProgressSnapshot) -> SessionEvent {
        if snapshot.is_terminal() {
            debug!(examined = snapshot.examined, "Received terminal snapshot");
            self.finished = true;
        }
        self.latest = Some(snapshot.clone());
        SessionEvent::Progress(snapshot)
    }

    /// Returns `true` once the terminal snapshot has been received.
    #[inline]
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the most recent snapshot received.
    #[inline]
    #[must_use]
    pub const fn latest_progress(&self) -> Option<&ProgressSnapshot> {
        self.latest.as_ref()
    }

    /// Returns the walker's live counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the registry fed by this session.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &SibshipRegistry {
        &self.registry
    }

    /// Returns the registry mutably, e.g. to remove members.
    #[inline]
    pub const fn registry_mut(&mut self) -> &mut SibshipRegistry {
        &mut self.registry
    }

    /// Asks the walker to stop after the directory it is visiting.
    ///
    /// The terminal snapshot is still sent.
    pub fn cancel(&self) {
        debug!("Cancelling scan session");
        self.cancel.cancel();
    }

    /// Waits for the walker thread and returns its report with the registry.
    ///
    /// Anything still queued is ingested first. This blocks the calling
    /// thread until the walk ends, which is immediate once
    /// [`is_finished`](Self::is_finished) is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::WalkerPanicked`] if the walker thread panicked.
    pub fn join(mut self) -> Result<(WalkReport, SibshipRegistry), ScanError> {
        let Some(handle) = self.handle.take() else {
            return Err(ScanError::WalkerPanicked);
        };
        let report = handle.join().map_err(|_| ScanError::WalkerPanicked)?;

        // The walker has exited, so both feeds are closed and this terminates.
        self.drain();

        Ok((report, std::mem::take(&mut self.registry)))
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use camino::Utf8Path;

    use super::*;
    use crate::registry::{MemberKind, MembershipChange};

    fn utf8(path: &Path) -> &Utf8Path {
        Utf8Path::from_path(path).unwrap()
    }

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "a.txt",
            "a.sync-conflict-20230723-000249-ONMECE6.txt",
            "a.sync-conflict-20230724-101112-ABCDE12.txt",
            "b.txt",
        ] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_next_until_exhausted() {
        let dir = sample_tree();
        let mut session =
            ScanSession::start(ScanConfig::new(utf8(dir.path())), SibshipRegistry::new()).unwrap();

        let mut conflicts = 0;
        let mut terminals = 0;
        while let Some(event) = session.next().await {
            match event {
                SessionEvent::Conflict { .. } => conflicts += 1,
                SessionEvent::Progress(snapshot) if snapshot.is_terminal() => terminals += 1,
                SessionEvent::Progress(_) => {}
            }
        }

        assert_eq!(conflicts, 2);
        assert_eq!(terminals, 1);
        assert!(session.is_finished());
        assert_eq!(session.registry().len(), 1);

        let (report, registry) = session.join().unwrap();
        assert_eq!(report.stats.examined, 4);
        assert!(!report.cancelled);
        let id = registry.iter().next().unwrap().id();
        assert_eq!(registry.extant_count(id), 3);
    }

    #[tokio::test]
    async fn test_listener_runs_on_consuming_side() {
        let dir = sample_tree();
        let seen: Arc<Mutex<Vec<(MemberKind, bool)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let registry = SibshipRegistry::new().with_listener(move |change: &MembershipChange<'_>| {
            assert_ne!(thread::current().name(), Some(WALKER_THREAD_NAME));
            sink.lock().unwrap().push((change.kind, change.is_new_group));
        });

        let mut session = ScanSession::start(ScanConfig::new(utf8(dir.path())), registry).unwrap();
        while session.next().await.is_some() {}

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (MemberKind::Canonical, true),
                (MemberKind::Conflict, true),
                (MemberKind::Conflict, false),
            ]
        );
    }

    #[test]
    fn test_drain_polling_loop() {
        let dir = sample_tree();
        let mut session =
            ScanSession::start(ScanConfig::new(utf8(dir.path())), SibshipRegistry::new()).unwrap();

        let mut total = DrainSummary::default();
        for _ in 0..500 {
            let summary = session.drain();
            total.ingested += summary.ingested;
            total.new_groups += summary.new_groups;
            if summary.finished {
                total.finished = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert!(total.finished);
        assert_eq!(total.ingested, 2);
        assert_eq!(total.new_groups, 1);
        assert!(session.latest_progress().is_some_and(ProgressSnapshot::is_terminal));
        assert_eq!(session.stats().conflicts, 2);
    }

    #[test]
    fn test_try_next_on_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let session =
            ScanSession::start(ScanConfig::new(utf8(dir.path())), SibshipRegistry::new()).unwrap();

        let (report, registry) = session.join().unwrap();
        assert_eq!(report.stats.examined, 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_join_drains_pending_paths() {
        let dir = sample_tree();
        let session =
            ScanSession::start(ScanConfig::new(utf8(dir.path())), SibshipRegistry::new()).unwrap();

        let (_, registry) = session.join().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().members().len(), 2);
    }

    #[test]
    fn test_cancel_still_finishes() {
        let dir = sample_tree();
        let session =
            ScanSession::start(ScanConfig::new(utf8(dir.path())), SibshipRegistry::new()).unwrap();
        session.cancel();

        let (report, _) = session.join().unwrap();
        // The walk may already have completed before the token was seen.
        assert!(report.cancelled || report.stats.examined == 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::new(utf8(dir.path())).with_smoothing_window(0);
        let err = ScanSession::start(config, SibshipRegistry::new()).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_missing_root_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let mut session =
            ScanSession::start(ScanConfig::new(utf8(&missing)), SibshipRegistry::new()).unwrap();

        let mut events = Vec::new();
        for _ in 0..500 {
            while let Some(event) = session.try_next() {
                events.push(event);
            }
            if session.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(events, vec![SessionEvent::Progress(ProgressSnapshot::finished(0))]);
        let (report, _) = session.join().unwrap();
        assert_eq!(report.errors.len(), 1);
    }
}
