//! Conflict-artifact name matching.
//!
//! Synchronization tools that detect concurrent edits keep both sides by
//! writing the losing copy next to the original with a fixed-width marker
//! spliced into its name:
//!
//! ```text
//! notes.txt
//! notes.sync-conflict-20230723-000249-ONMECE6.txt
//! ```
//!
//! This module answers two questions about such names:
//!
//! - [`is_conflict_artifact`]: does this file name look like a conflict copy?
//! - [`canonicalize_path`]: which original path does it conflict over?
//!
//! Both functions are pure and may be called from any thread.
//!
//! # Examples
//!
//! ```
//! use sc_core::{canonicalize_path, is_conflict_artifact};
//!
//! let name = "notes.sync-conflict-20230723-000249-ONMECE6.txt";
//! assert!(is_conflict_artifact(name));
//! assert_eq!(canonicalize_path(name), "notes.txt");
//! ```

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

/// The literal that introduces a conflict marker inside a path.
pub const CONFLICT_INDICATOR: &str = ".sync-conflict-";

/// Shape of the fixed-width payload following [`CONFLICT_INDICATOR`]:
/// an 8-digit date, a 6-digit time and a 7-character device tag.
pub const MARKER_PAYLOAD_TEMPLATE: &str = "NNNNNNNN-NNNNNN-XXXXXXX";

/// Total number of bytes removed by [`canonicalize_path`].
pub const MARKER_LEN: usize = CONFLICT_INDICATOR.len() + MARKER_PAYLOAD_TEMPLATE.len();

/// Prefix of the synchronization tool's own temporary files.
const BOOKKEEPING_PREFIX: &str = ".syncthing";

/// Suffix of the synchronization tool's own temporary files.
const BOOKKEEPING_SUFFIX: &str = ".tmp";

/// Anchored at the start, like a prefix match over the whole name.
#[allow(clippy::unwrap_used)] // Constant pattern, covered by tests
static CONFLICT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*sync-conflict-[0-9A-Z-]*").unwrap());

/// Returns `true` if `name` looks like a conflict artifact.
///
/// A name qualifies when it contains `sync-conflict-` and is not one of the
/// synchronization tool's bookkeeping files (`.syncthing*.tmp`), which can
/// carry the same shape while a transfer is in flight.
///
/// # Examples
///
/// ```
/// use sc_core::is_conflict_artifact;
///
/// assert!(is_conflict_artifact("a.sync-conflict-20230724-101112-ABCDE12.txt"));
/// assert!(!is_conflict_artifact("a.txt"));
/// assert!(!is_conflict_artifact(
///     ".syncthing.a.sync-conflict-20230724-101112-ABCDE12.txt.tmp"
/// ));
/// ```
#[must_use]
pub fn is_conflict_artifact(name: &str) -> bool {
    CONFLICT_NAME_REGEX.is_match(name) && !is_bookkeeping_file(name)
}

fn is_bookkeeping_file(name: &str) -> bool {
    name.starts_with(BOOKKEEPING_PREFIX) && name.ends_with(BOOKKEEPING_SUFFIX)
}

/// Returns the byte range of the conflict marker within `path`, if any.
///
/// The range starts at the first [`CONFLICT_INDICATOR`] and always spans
/// [`MARKER_LEN`] bytes. `None` is returned when there is no indicator, when
/// the path ends before the fixed-width payload does, or when the span would
/// split a multi-byte character.
#[must_use]
pub fn marker_span(path: &str) -> Option<Range<usize>> {
    let start = path.find(CONFLICT_INDICATOR)?;
    let end = start.checked_add(MARKER_LEN)?;
    path.get(start..end)?;
    Some(start..end)
}

/// Removes the conflict marker from `path`, yielding the original path.
///
/// This is a raw fixed-width excision: the first [`CONFLICT_INDICATOR`] and
/// the payload after it are cut out and whatever follows (usually the
/// original extension) is spliced back on. Paths without a marker, and paths
/// whose marker is truncated, are returned unchanged.
///
/// # Examples
///
/// ```
/// use sc_core::canonicalize_path;
///
/// assert_eq!(
///     canonicalize_path("/docs/a.sync-conflict-20230723-000249-ONMECE6.txt"),
///     "/docs/a.txt"
/// );
/// assert_eq!(canonicalize_path("/docs/b.txt"), "/docs/b.txt");
/// ```
#[must_use]
pub fn canonicalize_path(path: &str) -> Cow<'_, str> {
    match marker_span(path) {
        Some(span) => {
            let mut canonical = String::with_capacity(path.len() - MARKER_LEN);
            canonical.push_str(&path[..span.start]);
            canonical.push_str(&path[span.end..]);
            Cow::Owned(canonical)
        }
        None => Cow::Borrowed(path),
    }
}

/// [`canonicalize_path`] for UTF-8 paths.
#[must_use]
pub fn canonical_path(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(canonicalize_path(path.as_str()).into_owned())
}

/// The decoded payload of a conflict marker.
///
/// # Examples
///
/// ```
/// use sc_core::conflict_stamp;
///
/// let stamp = conflict_stamp("a.sync-conflict-20230723-000249-ONMECE6.txt").unwrap();
/// assert_eq!(stamp.device, "ONMECE6");
/// assert_eq!(stamp.timestamp(), "2023-07-23 00:02:49");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictStamp<'a> {
    /// `YYYYMMDD`.
    pub date: &'a str,
    /// `HHMMSS`.
    pub time: &'a str,
    /// Short identifier of the device that wrote the losing copy.
    pub device: &'a str,
}

impl ConflictStamp<'_> {
    /// Formats the date and time as `YYYY-MM-DD HH:MM:SS`.
    #[must_use]
    pub fn timestamp(&self) -> String {
        format!(
            "{}-{}-{} {}:{}:{}",
            &self.date[0..4],
            &self.date[4..6],
            &self.date[6..8],
            &self.time[0..2],
            &self.time[2..4],
            &self.time[4..6],
        )
    }
}

/// Decodes the marker payload in `path`.
///
/// Returns `None` when there is no marker or the payload does not have the
/// expected digit/tag shape.
#[must_use]
pub fn conflict_stamp(path: &str) -> Option<ConflictStamp<'_>> {
    let span = marker_span(path)?;
    let payload = &path[span.start + CONFLICT_INDICATOR.len()..span.end];

    let (date, rest) = payload.split_at_checked(8)?;
    let rest = rest.strip_prefix('-')?;
    let (time, rest) = rest.split_at_checked(6)?;
    let device = rest.strip_prefix('-')?;

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(date) || !all_digits(time) {
        return None;
    }
    if device.len() != 7 || !device.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    Some(ConflictStamp { date, time, device })
}
