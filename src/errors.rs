use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for inventory loading, splitting, and artifact persistence.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Master index (or split table) lacks required columns.
    #[error("master index '{}' is missing required columns: {}", path.display(), missing.join(", "))]
    Schema {
        /// Offending file.
        path: PathBuf,
        /// Missing column names, in required order.
        missing: Vec<String>,
    },
    /// A row names a source without a patient-id rule.
    #[error("unknown source '{source_tag}' for image '{filename}'")]
    UnknownSource {
        /// Source tag as written in the master index.
        source_tag: String,
        /// Filename of the offending row.
        filename: String,
    },
    /// Ratios are negative, non-finite or do not sum to `1.0`.
    #[error(
        "split ratios must sum to 1.0 and be non-negative (train={train}, val={validation}, test={test}, sum={sum})"
    )]
    InvalidRatio {
        /// Requested train fraction.
        train: f64,
        /// Requested validation fraction.
        validation: f64,
        /// Requested test fraction.
        test: f64,
        /// Sum of the three fractions.
        sum: f64,
    },
    /// Caption file missing or not valid UTF-8; recoverable.
    #[error("failed to read caption '{}': {reason}", path.display())]
    CaptionRead {
        /// Resolved caption path.
        path: PathBuf,
        /// Underlying I/O or decode error.
        reason: String,
    },
    /// Master index rows could not be parsed.
    #[error("master index '{}' is unreadable: {details}", path.display())]
    MasterIndex {
        /// Master index path.
        path: PathBuf,
        /// Row and cell context.
        details: String,
    },
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON encode or decode failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// CSV encode or decode failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
