//! A library with common utilities for scoring the cheese integration contest.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod scoring;
pub mod store_util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, FileCoordinator};
pub use error::{CoordinatorError, StoreError};

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The value the teams are trying to estimate.
pub const TRUE_INTEGRAL: f64 = 0.780_207_872_582;

/// File names inside the data directory.
pub const SESSIONS_FILE: &str = "sessions.csv";
pub const SUBMISSIONS_FILE: &str = "submissions.csv";

/// A team's stopwatch. Kept forever, closed once the team submits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSession {
    pub team: String,
    pub start_time: DateTime<Utc>,
    pub completed: bool,
    pub end_time: Option<DateTime<Utc>>,
}

impl TeamSession {
    /// Open a fresh session for a team.
    pub fn start(team: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            team: team.to_string(),
            start_time,
            completed: false,
            end_time: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.completed
    }

    /// Seconds between the session start and `now`, never negative.
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.start_time).num_milliseconds().max(0);
        millis as f64 / 1000f64
    }
}

/// A completed solution as stored on disk. The error is always derived from the estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub team: String,
    pub time: f64,
    pub estimate: f64,
    pub error: f64,
    pub error_estimate: f64,
    pub timestamp: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Build a record, deriving the absolute error against [`TRUE_INTEGRAL`].
    /// An `error_estimate` of zero means the team did not provide one.
    pub fn new(
        team: &str,
        time: f64,
        estimate: f64,
        error_estimate: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            team: team.to_string(),
            time: time.max(0f64),
            estimate,
            error: (estimate - TRUE_INTEGRAL).abs(),
            error_estimate,
            timestamp,
        }
    }

    pub fn has_error_estimate(&self) -> bool {
        self.error_estimate > 0f64
    }
}

/// A submission with every derived scoring column. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecord {
    #[serde(flatten)]
    pub record: SubmissionRecord,
    pub s_n: f64,
    pub t_n: f64,
    pub score: f64,
    pub z_statistic: f64,
    pub error_bonus: f64,
    pub final_score: f64,
    pub rank: usize,
}
