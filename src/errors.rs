use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for corpus IO, configuration, and sink failures.
///
/// Per-record conditions (malformed lines, unshaped or short records,
/// duplicates) are counted by the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// A required input path does not exist.
    #[error("input '{}' does not exist", path.display())]
    InputMissing {
        /// Path that was looked up.
        path: PathBuf,
    },
    /// Writing output failed; the run stops.
    #[error("failed writing to '{}': {source}", path.display())]
    Write {
        /// Output the failed write was aimed at.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// Any other IO failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A JSON document (plan, cache, grouping spec) failed to decode.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Invalid flag, plan, or fingerprint value.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CorpusError {
    /// Wrap an output failure for the sink at `path`.
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
