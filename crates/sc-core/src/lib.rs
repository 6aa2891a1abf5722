//! Core types and pure functions for sibscan.
//!
//! This crate holds everything the scanner and its consumers share:
//!
//! - Conflict-name matching ([`is_conflict_artifact`], [`canonicalize_path`])
//! - The [`ProgressSnapshot`] telemetry record
//! - Configuration structures ([`Config`] and its sections)
//! - [`ConfigError`] for configuration failures
//! - Type aliases for `FxHashMap`/`FxHashSet`

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod pattern;
pub mod types;

pub use config::{Config, DisplayConfig, ProgressConfig, ScanConfig};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, fx_hash_map, fx_hash_set};
pub use pattern::{
    CONFLICT_INDICATOR, ConflictStamp, MARKER_LEN, canonical_path, canonicalize_path,
    conflict_stamp, is_conflict_artifact, marker_span,
};
pub use types::ProgressSnapshot;
