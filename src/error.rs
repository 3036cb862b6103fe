use std::fmt;
use std::path::PathBuf;

/// Failures that abort a statistics run.
#[derive(Debug)]
pub enum StatsError {
    /// Missing or mismatched inputs, raised before any counting happens
    Config(String),
    /// A record count could not be obtained for a file
    Counting { path: PathBuf, reason: String },
    /// Total original reads is zero so the aggregate percentage has no value
    UndefinedAggregate,
}

impl StatsError {
    pub fn counting<P: Into<PathBuf>>(path: P, reason: impl Into<String>) -> Self {
        StatsError::Counting {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            StatsError::Counting { path, reason } => {
                write!(f, "Failed to count records in {}: {}", path.display(), reason)
            }
            StatsError::UndefinedAggregate => write!(
                f,
                "Total reads before filtering is zero; average percentage excluded is undefined"
            ),
        }
    }
}

impl std::error::Error for StatsError {}
