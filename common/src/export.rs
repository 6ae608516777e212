//! Turn rankings and raw submissions into downloadable CSV.

use crate::{RankedRecord, StoreError, SubmissionRecord};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

/// One line of the results table, columns in display order.
#[derive(Debug, Serialize)]
struct RankedRow<'a> {
    rank: usize,
    team: &'a str,
    time: f64,
    estimate: f64,
    error: f64,
    error_estimate: f64,
    timestamp: String,
    s_n: f64,
    t_n: f64,
    score: f64,
    z_statistic: f64,
    error_bonus: f64,
    final_score: f64,
}

impl<'a> From<&'a RankedRecord> for RankedRow<'a> {
    fn from(r: &'a RankedRecord) -> Self {
        Self {
            rank: r.rank,
            team: &r.record.team,
            time: r.record.time,
            estimate: r.record.estimate,
            error: r.record.error,
            error_estimate: r.record.error_estimate,
            timestamp: r.record.timestamp.to_rfc3339(),
            s_n: r.s_n,
            t_n: r.t_n,
            score: r.score,
            z_statistic: r.z_statistic,
            error_bonus: r.error_bonus,
            final_score: r.final_score,
        }
    }
}

fn to_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Encode(e.into_error().into()))
}

/// The ranked results as UTF-8 CSV with a header row.
///
/// # Errors
/// Returns an error if a row could not be encoded.
pub fn ranked_to_csv(ranked: &[RankedRecord]) -> Result<Vec<u8>, StoreError> {
    to_csv(ranked.iter().map(RankedRow::from))
}

/// The raw submissions, same layout as the submission store.
///
/// # Errors
/// Returns an error if a row could not be encoded.
pub fn submissions_to_csv(records: &[SubmissionRecord]) -> Result<Vec<u8>, StoreError> {
    to_csv(records)
}

/// Name for a point-in-time copy of the results, e.g. `team_results_20250301_142501.csv`.
pub fn snapshot_file_name<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("team_results_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// Write the raw submissions to a timestamped file inside `dir`.
///
/// # Errors
/// Returns an error if the directory or file could not be written.
pub fn write_snapshot<Tz>(
    dir: &Path,
    records: &[SubmissionRecord],
    now: &DateTime<Tz>,
) -> Result<PathBuf, StoreError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    let path = dir.join(snapshot_file_name(now));
    let bytes = submissions_to_csv(records)?;
    fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
    log::info!(
        "Snapshot saved as {} with {} records",
        path.display(),
        records.len()
    );
    Ok(path)
}
