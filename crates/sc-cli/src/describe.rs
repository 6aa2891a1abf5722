//! Per-file details shown next to group members.
//!
//! Everything here reads the filesystem at call time: a file deleted since
//! the scan simply shows up as missing.

use std::fs;
use std::io;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use sc_core::{DisplayConfig, conflict_stamp};
use sc_scanner::{Sibship, SibshipRegistry};
use serde::Serialize;
use tracing::debug;

/// Number of hex digits of the content hash that are displayed.
const SHORT_HASH_LEN: usize = 12;

/// What one path of a group looks like on disk right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    /// The path.
    pub path: Utf8PathBuf,
    /// Whether the path is the group's canonical path.
    pub canonical: bool,
    /// Whether anything exists at the path.
    pub exists: bool,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Local modification time, `YYYY-MM-DD HH:MM:SS`.
    pub modified: Option<String>,
    /// Shortened blake3 digest, for files within the hash size limit.
    pub hash: Option<String>,
    /// Conflict time and device taken from the marker, if any.
    pub conflict: Option<String>,
}

impl MemberInfo {
    /// Reads the details of `path`.
    pub fn read(path: &Utf8Path, canonical: bool, hash_size_limit: u64) -> Self {
        let conflict = path
            .file_name()
            .and_then(conflict_stamp)
            .map(|stamp| format!("{} {}", stamp.timestamp(), stamp.device));

        let Ok(metadata) = fs::metadata(path) else {
            return Self {
                path: path.to_owned(),
                canonical,
                exists: false,
                size: None,
                modified: None,
                hash: None,
                conflict,
            };
        };

        let size = metadata.len();
        let modified = metadata.modified().ok().map(format_time);
        let hash = if metadata.is_file() && size <= hash_size_limit {
            match short_hash(path) {
                Ok(hash) => Some(hash),
                Err(err) => {
                    debug!(path = %path, error = %err, "Could not hash file");
                    None
                }
            }
        } else {
            None
        };

        Self {
            path: path.to_owned(),
            canonical,
            exists: true,
            size: Some(size),
            modified,
            hash,
            conflict,
        }
    }
}

/// A group with its members described.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    /// The canonical path.
    pub canonical: Utf8PathBuf,
    /// Paths of the group that exist right now.
    pub extant: usize,
    /// Canonical path first, then the discovered variants.
    pub members: Vec<MemberInfo>,
    /// Shared size, when every existing member has the same one.
    pub same_size: Option<u64>,
    /// Shared hash, when every existing member was hashed to the same value.
    pub same_content: Option<String>,
    /// Existing paths to hand to a comparison tool, at most the compare limit.
    pub compare: Vec<Utf8PathBuf>,
}

impl GroupView {
    /// Describes one sibship of `registry`.
    pub fn new(registry: &SibshipRegistry, sibship: &Sibship, display: &DisplayConfig) -> Self {
        let members: Vec<MemberInfo> = sibship
            .paths_to_compare()
            .into_iter()
            .map(|path| {
                MemberInfo::read(
                    path,
                    path == sibship.canonical(),
                    display.hash_size_limit,
                )
            })
            .collect();

        let existing: Vec<&MemberInfo> = members.iter().filter(|m| m.exists).collect();

        let same_size = shared_value(existing.iter().map(|m| m.size));
        let same_content = shared_value(existing.iter().map(|m| m.hash.clone()));

        let compare = existing
            .iter()
            .take(display.compare_limit)
            .map(|m| m.path.clone())
            .collect();

        Self {
            canonical: sibship.canonical().to_owned(),
            extant: registry.extant_count(sibship.id()),
            members,
            same_size,
            same_content,
            compare,
        }
    }
}

/// Returns the common value when there are at least two and all are equal.
fn shared_value<T: PartialEq>(values: impl Iterator<Item = Option<T>>) -> Option<T> {
    let mut first: Option<T> = None;
    let mut count = 0usize;
    for value in values {
        let value = value?;
        match &first {
            Some(existing) if *existing != value => return None,
            Some(_) => {}
            None => first = Some(value),
        }
        count += 1;
    }
    if count >= 2 { first } else { None }
}

fn short_hash(path: &Utf8Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    let mut hex = blake3::hash(&bytes).to_hex().to_string();
    hex.truncate(SHORT_HASH_LEN);
    Ok(hex)
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Formats a byte count the way the summary prints it.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    #[allow(clippy::cast_precision_loss)] // Display only
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
