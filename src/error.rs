//! Error types.
//!
//! Only two things can fail: constructing a component with out-of-range
//! parameters, and writing the seed store to disk. Reading the seed store never
//! fails (it degrades to an empty map instead).

use std::path::PathBuf;

/// An out-of-range configuration parameter.
///
/// Values are reported as given; nothing is clamped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("epsilon must be in [0, 1], got {0}")]
    Epsilon(f64),

    #[error("decay must be in (0, 1], got {0}")]
    Decay(f64),

    #[error("max_drift_per_iter must be finite and > 0, got {0}")]
    MaxDriftPerIter(f64),

    #[error("top_k must be >= 1, got {0}")]
    TopK(usize),

    #[error("alpha must be in (0, 1), got {0}")]
    Alpha(f64),

    #[error("drift_cap must be finite and > 0, got {0}")]
    DriftCap(f64),

    #[error("top_n must be >= 1, got {0}")]
    TopN(usize),
}

/// Seed store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("seed store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seed store JSON error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
