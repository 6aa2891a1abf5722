//! Error types for the sc-core crate.
//!
//! [`ConfigError`] covers loading and validating a [`Config`](crate::Config)
//! and checking the scan root a caller supplies.

use camino::Utf8PathBuf;

/// Errors that can occur while loading or validating configuration.
///
/// # Examples
///
/// ```
/// use sc_core::ConfigError;
/// use camino::Utf8PathBuf;
///
/// let error = ConfigError::MissingDirectory(Utf8PathBuf::from("/sync/root"));
/// assert_eq!(error.to_string(), "scan root is not a directory: /sync/root");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A path given in configuration cannot be used.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: Utf8PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// The scan root does not exist or is not a directory.
    #[error("scan root is not a directory: {0}")]
    MissingDirectory(Utf8PathBuf),

    /// An option holds a value outside its allowed range.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// Dotted name of the option, e.g. `progress.smoothing_window`.
        option: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Reading the configuration file failed.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`Config`](crate::Config).
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let error = ConfigError::InvalidPath {
            path: Utf8PathBuf::from("/etc/sibscan.json"),
            reason: "not a file".to_owned(),
        };
        let msg = error.to_string();
        assert!(msg.contains("/etc/sibscan.json"));
        assert!(msg.contains("not a file"));
    }

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::InvalidOption {
            option: "display.compare_limit".to_owned(),
            reason: "must be at least 1".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "invalid configuration option 'display.compare_limit': must be at least 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = ConfigError::from(io);
        assert!(matches!(error, ConfigError::Io(_)));
        assert!(error.to_string().contains("denied"));
    }
}
