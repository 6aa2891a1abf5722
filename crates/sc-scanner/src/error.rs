//! Error types for the sc-scanner crate.
//!
//! This module provides the [`ScanError`] type for failures met while walking
//! a tree or starting a scan session.

use camino::Utf8PathBuf;

/// Errors that can occur during scanning.
///
/// # Error Recovery Strategy
///
/// - **Walk errors** ([`ScanError::Walk`]): log, count, continue the walk
/// - **Directory read errors** ([`ScanError::ReadDir`]): log, skip the directory, continue
/// - **Configuration errors** ([`ScanError::Config`]): reject before the walk starts
/// - **Spawn errors** ([`ScanError::Spawn`]): the session never started
/// - **Walker panics** ([`ScanError::WalkerPanicked`]): surfaced by [`join`](crate::ScanSession::join)
///
/// A running walk never fails as a whole; recoverable errors are collected
/// into the [`WalkReport`](crate::WalkReport) instead.
///
/// # Examples
///
/// ```
/// use sc_scanner::ScanError;
///
/// fn describe(err: &ScanError) -> String {
///     match err {
///         ScanError::Walk(e) => format!("walk: {e}"),
///         ScanError::ReadDir { path, .. } => format!("unreadable: {path}"),
///         ScanError::Config(msg) => format!("config: {msg}"),
///         ScanError::NonUtf8Path(p) => format!("non-UTF-8: {}", p.display()),
///         ScanError::Spawn(e) => format!("spawn: {e}"),
///         ScanError::WalkerPanicked => "walker panicked".to_owned(),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A single entry of a directory listing could not be inspected.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    /// A directory's listing could not be read.
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        /// The directory that couldn't be listed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid scanner configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The walker thread could not be started.
    #[error("failed to start walker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The walker thread panicked before returning its report.
    #[error("walker thread panicked")]
    WalkerPanicked,
}

impl ScanError {
    /// Creates a new [`ScanError::ReadDir`] error.
    #[inline]
    pub fn read_dir(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::ReadDir {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::Config`] error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` if the walk continues past this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Walk(_) | Self::ReadDir { .. } | Self::NonUtf8Path(_)
        )
    }

    /// Returns the directory associated with this error, if known.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::ReadDir { path, .. } => Some(path),
            Self::Walk(_)
            | Self::Config(_)
            | Self::NonUtf8Path(_)
            | Self::Spawn(_)
            | Self::WalkerPanicked => None,
        }
    }
}
