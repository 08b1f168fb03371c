use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a source call produced no data this cycle
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot in {}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("source did not answer within {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    /// Whether the source answered at all (as opposed to answering with garbage)
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io { .. } | Self::Timeout(_))
    }
}
