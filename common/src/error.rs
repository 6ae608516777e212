//! Error types shared by the stores and the coordinator.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Anything that went wrong while reading or writing a collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed data in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("failed to encode csv: {0}")]
    Encode(#[from] csv::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Failures reported to whoever drives the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("team name must not be empty")]
    InvalidTeam,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("team '{team}' already has a running session")]
    AlreadyActive { team: String },

    #[error("team '{team}' has no running session, start the timer first")]
    NoActiveSession { team: String },

    #[error("could not save: {0}")]
    PersistFailure(#[from] StoreError),
}

impl CoordinatorError {
    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTeam | Self::InvalidInput(_) => "invalid_input",
            Self::AlreadyActive { .. } => "already_active",
            Self::NoActiveSession { .. } => "no_active_session",
            Self::PersistFailure(_) => "persist_failure",
        }
    }

    /// Whether the caller can simply try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_error_kinds() {
        let already = CoordinatorError::AlreadyActive {
            team: "Gouda".to_string(),
        };
        assert_eq!(already.kind(), "already_active");
        assert!(already.to_string().contains("Gouda"));
        assert!(!already.is_retryable());

        let persist = CoordinatorError::from(StoreError::io(
            "data/submissions.csv",
            io::Error::other("disk full"),
        ));
        assert_eq!(persist.kind(), "persist_failure");
        assert!(persist.is_retryable());
        assert!(persist.to_string().contains("disk full"));

        assert_eq!(CoordinatorError::InvalidTeam.kind(), "invalid_input");
    }
}
