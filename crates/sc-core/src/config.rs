//! Configuration structures for sibscan.
//!
//! This module provides configuration types for each part of a scan:
//!
//! - [`ScanConfig`] - Traversal settings (root, pruned directories, hidden entries)
//! - [`ProgressConfig`] - Progress throttling and rate smoothing
//! - [`DisplayConfig`] - How consumers describe group members
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`], and every section is
//! `#[serde(default)]` so a configuration file only needs the keys it changes.

use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the directory walk.
///
/// # Examples
///
/// ```
/// use sc_core::ScanConfig;
///
/// let config = ScanConfig::default();
/// assert!(config.skip_dirs.is_empty());
/// assert!(!config.skip_hidden);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root directory to scan.
    pub root_path: Utf8PathBuf,

    /// Directory names to prune from the walk (matched per component).
    pub skip_dirs: Vec<String>,

    /// Skip hidden files and directories (names starting with `.`).
    ///
    /// Off by default: conflict copies turn up inside hidden folders too.
    pub skip_hidden: bool,
}

/// Configuration for progress reporting.
///
/// # Examples
///
/// ```
/// use sc_core::ProgressConfig;
///
/// let config = ProgressConfig::default();
/// assert_eq!(config.min_interval_ms, 100);
/// assert_eq!(config.smoothing_window, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum time between two progress snapshots, in milliseconds.
    pub min_interval_ms: u64,

    /// Number of instantaneous rate samples averaged by the rate watcher.
    pub smoothing_window: usize,
}

impl ProgressConfig {
    /// Returns the minimum progress interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            smoothing_window: 10,
        }
    }
}

/// Configuration for presenting groups to a user.
///
/// # Examples
///
/// ```
/// use sc_core::DisplayConfig;
///
/// let config = DisplayConfig::default();
/// assert_eq!(config.hash_size_limit, 10 * 1024);
/// assert_eq!(config.compare_limit, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Files larger than this many bytes are not content-hashed.
    pub hash_size_limit: u64,

    /// Maximum number of paths handed to a comparison tool at once.
    pub compare_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            hash_size_limit: 10 * 1024,
            compare_limit: 3,
        }
    }
}

/// Root configuration for sibscan.
///
/// # Examples
///
/// ```
/// use sc_core::Config;
///
/// let config: Config = serde_json::from_str(r#"{"progress": {"min_interval_ms": 250}}"#).unwrap();
/// assert_eq!(config.progress.min_interval_ms, 250);
/// assert_eq!(config.progress.smoothing_window, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory walk configuration.
    pub scan: ScanConfig,

    /// Progress reporting configuration.
    pub progress: ProgressConfig,

    /// Presentation configuration.
    pub display: DisplayConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing keys take their default values. The loaded configuration is
    /// validated before it is returned.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::InvalidPath {
                path: path.to_owned(),
                reason: "not a file".to_owned(),
            });
        }

        let contents = fs::read_to_string(path.as_std_path())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option values that the type system cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress.smoothing_window == 0 {
            return Err(ConfigError::InvalidOption {
                option: "progress.smoothing_window".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if self.display.compare_limit == 0 {
            return Err(ConfigError::InvalidOption {
                option: "display.compare_limit".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_config_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.root_path, Utf8PathBuf::new());
        assert!(config.skip_dirs.is_empty());
        assert!(!config.skip_hidden);
    }

    #[test]
    fn test_progress_config_defaults() {
        let config = ProgressConfig::default();
        assert_eq!(config.min_interval(), Duration::from_millis(100));
        assert_eq!(config.smoothing_window, 10);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"scan": {"skip_dirs": [".stversions"]}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.scan.skip_dirs, vec![".stversions"]);
        assert_eq!(config.progress.min_interval_ms, 100);
        assert_eq!(config.display.compare_limit, 3);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.progress.smoothing_window = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("progress.smoothing_window"));
    }

    #[test]
    fn test_validate_rejects_zero_compare_limit() {
        let mut config = Config::default();
        config.display.compare_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sibscan.json");
        fs::write(&path, r#"{"display": {"hash_size_limit": 0}}"#).unwrap();

        let path = Utf8PathBuf::try_from(path).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.display.hash_size_limit, 0);
        assert_eq!(config.display.compare_limit, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Utf8Path::new("/nonexistent/sibscan.json")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let path = Utf8PathBuf::try_from(path).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
