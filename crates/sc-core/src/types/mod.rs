//! Domain types shared between the scanner and its consumers.
//!
//! - [`progress`] - Progress telemetry emitted while a scan runs
//!
//! All public types are re-exported at the crate root:
//!
//! ```
//! use sc_core::ProgressSnapshot;
//! ```

mod progress;

pub use progress::ProgressSnapshot;
