//! Rank submissions by accuracy and speed.
//!
//! Each team is placed in a plane of (normalized error, normalized time) and scored
//! by its distance from the origin. Teams that also reported a believable error
//! estimate get up to [`MAX_BONUS_RATIO`] of that distance taken off.

use crate::{RankedRecord, SubmissionRecord};
use itertools::Itertools;

/// Share of the raw score a perfectly calibrated error estimate removes.
pub const MAX_BONUS_RATIO: f64 = 0.2;

/// Error estimates with `z` above this earn no bonus.
pub const Z_CUTOFF: f64 = 3.0;

/// Sample standard deviation (n - 1 denominator).
/// `None` when it is undefined or zero, in which case nothing is normalized.
pub fn normalizing_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 || values.iter().all_equal() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1f64);
    let stdev = variance.sqrt();
    (stdev.is_finite() && stdev > 0f64).then_some(stdev)
}

/// Calibration of a team's own error estimate, returned as `(z, bonus)`.
/// No estimate (zero) means no bonus and a `z` of zero.
pub fn error_bonus(error: f64, error_estimate: f64, score: f64) -> (f64, f64) {
    if error_estimate <= 0f64 {
        return (0f64, 0f64);
    }
    let z = error.abs() / error_estimate;
    if z > Z_CUTOFF {
        return (z, 0f64);
    }
    let bonus = (1f64 - z / Z_CUTOFF).max(0f64) * MAX_BONUS_RATIO * score;
    (z, bonus)
}

/// Score and rank every submission. Lower final scores rank first; ties keep input order.
/// Always recomputed from the full set since the normalization depends on every record.
pub fn score(records: &[SubmissionRecord]) -> Vec<RankedRecord> {
    if records.is_empty() {
        return Vec::new();
    }

    let errors = records.iter().map(|r| r.error).collect_vec();
    let times = records.iter().map(|r| r.time).collect_vec();
    let error_stdev = normalizing_stdev(&errors);
    let time_stdev = normalizing_stdev(&times);
    log::debug!(
        "Scoring {} submissions, error stdev {error_stdev:?}, time stdev {time_stdev:?}",
        records.len()
    );

    records
        .iter()
        .map(|record| {
            let s_n = error_stdev.map_or(0f64, |sd| record.error / sd);
            let t_n = time_stdev.map_or(0f64, |sd| record.time / sd);
            let score = s_n.hypot(t_n);
            let (z_statistic, error_bonus) =
                error_bonus(record.error, record.error_estimate, score);
            RankedRecord {
                record: record.clone(),
                s_n,
                t_n,
                score,
                z_statistic,
                error_bonus,
                final_score: (score - error_bonus).max(0f64),
                rank: 0,
            }
        })
        .sorted_by(|a, b| a.final_score.total_cmp(&b.final_score))
        .enumerate()
        .map(|(i, mut ranked)| {
            ranked.rank = i + 1;
            ranked
        })
        .collect()
}
