//! R-R interval extraction and artifact rejection.
//!
//! Each cleaning round runs two passes: a global one (statistical outliers
//! and the physiological bounds) followed by a local neighbor-consistency
//! check over the survivors of the first pass. Rounds repeat until nothing
//! more is removed, so cleaned output is a fixed point.

use crate::{
    config::CleaningConfig,
    signal::{Beats, RRSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Successive timestamp differences of the beat marks.
pub fn extract_intervals(beats: &Beats) -> RRSeries {
    RRSeries::from_beats(beats)
}

/// How many intervals each pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input: usize,
    pub dropped_outliers: usize,
    pub dropped_inconsistent: usize,
    pub kept: usize,
    /// Outlier plus neighbor rounds run before the sequence stopped changing.
    pub rounds: usize,
    /// Too few intervals to clean; the input passed through.
    pub skipped: bool,
}

pub fn clean_intervals(rr: &RRSeries, cfg: &CleaningConfig) -> RRSeries {
    clean_intervals_with_report(rr, cfg).0
}

pub fn clean_intervals_with_report(rr: &RRSeries, cfg: &CleaningConfig) -> (RRSeries, CleaningReport) {
    let input = rr.len();
    if input < cfg.min_intervals {
        let report = CleaningReport {
            input,
            kept: input,
            skipped: true,
            ..Default::default()
        };
        return (rr.clone(), report);
    }

    let mut current = rr.rr.clone();
    let mut report = CleaningReport {
        input,
        ..Default::default()
    };
    // Dropping a large outlier tightens the spread, so repeat both passes
    // until a round removes nothing.
    while current.len() >= cfg.min_intervals {
        let filtered = reject_outliers(&current, cfg);
        let consistent = reject_inconsistent(&filtered, cfg.neighbor_tolerance);
        report.rounds += 1;
        report.dropped_outliers += current.len() - filtered.len();
        report.dropped_inconsistent += filtered.len() - consistent.len();
        let settled = consistent.len() == current.len();
        current = consistent;
        if settled {
            break;
        }
    }
    report.kept = current.len();
    debug!(
        "cleaning: {} intervals, {} outliers, {} inconsistent, {} kept after {} rounds",
        report.input, report.dropped_outliers, report.dropped_inconsistent, report.kept, report.rounds
    );
    (RRSeries::new(current), report)
}

fn reject_outliers(rr: &[i64], cfg: &CleaningConfig) -> Vec<i64> {
    let n = rr.len() as f64;
    let mean = rr.iter().map(|&v| v as f64).sum::<f64>() / n;
    let std = (rr.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt();
    let limit = cfg.outlier_sd * std;
    rr.iter()
        .copied()
        .filter(|&v| (v as f64 - mean).abs() <= limit)
        .filter(|v| (cfg.min_rr_ms..=cfg.max_rr_ms).contains(v))
        .collect()
}

/// Interior intervals must sit within `tolerance` of their neighbors' mean.
/// Neighbors are taken from the input sequence, not from earlier decisions
/// of this pass.
fn reject_inconsistent(rr: &[i64], tolerance: f64) -> Vec<i64> {
    let last = rr.len().saturating_sub(1);
    rr.iter()
        .enumerate()
        .filter(|&(i, &v)| {
            if i == 0 || i == last {
                return true;
            }
            let neighbors = (rr[i - 1] + rr[i + 1]) as f64 / 2.0;
            (v as f64 - neighbors).abs() < neighbors * tolerance
        })
        .map(|(_, &v)| v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::BeatMark;

    fn rr(values: &[i64]) -> RRSeries {
        RRSeries::new(values.to_vec())
    }

    #[test]
    fn extracts_successive_differences() {
        let marks = [0, 810, 1620, 2410]
            .iter()
            .enumerate()
            .map(|(index, &timestamp_ms)| BeatMark {
                index,
                timestamp_ms,
            })
            .collect();
        let out = extract_intervals(&Beats::from_marks(marks));
        assert_eq!(out.rr, vec![810, 810, 790]);
    }

    #[test]
    fn fewer_than_three_is_a_no_op() {
        let input = rr(&[100, 5000]);
        let (out, report) = clean_intervals_with_report(&input, &CleaningConfig::default());
        assert_eq!(out, input);
        assert!(report.skipped);
    }

    #[test]
    fn drops_out_of_range_intervals() {
        let input = rr(&[800, 810, 790, 805, 2500, 795, 800, 812, 798, 803]);
        let (out, report) = clean_intervals_with_report(&input, &CleaningConfig::default());
        assert_eq!(out.rr, vec![800, 810, 790, 805, 795, 800, 812, 798, 803]);
        assert_eq!(report.dropped_outliers, 1);
        assert_eq!(report.dropped_inconsistent, 0);
    }

    #[test]
    fn drops_statistical_outliers() {
        let mut values = vec![800; 20];
        values.push(1900);
        let out = clean_intervals(&rr(&values), &CleaningConfig::default());
        assert_eq!(out.rr, vec![800; 20]);
    }

    #[test]
    fn neighbor_pass_keeps_endpoints() {
        // 320 is in range and within 3 sd, but far from its neighbors.
        let input = rr(&[400, 820, 800, 320, 810, 790, 805, 1300]);
        let (out, report) = clean_intervals_with_report(&input, &CleaningConfig::default());
        assert_eq!(out.rr, vec![400, 820, 800, 810, 790, 805, 1300]);
        assert_eq!(report.dropped_inconsistent, 1);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let cfg = CleaningConfig::default();
        let once = clean_intervals(
            &rr(&[800, 810, 790, 805, 2500, 795, 800, 812, 798, 803]),
            &cfg,
        );
        let twice = clean_intervals(&once, &cfg);
        assert_eq!(once, twice);
    }

    #[test]
    fn outlier_masking_is_resolved_in_one_call() {
        // 1900 inflates the spread enough to hide 1000 on the first round.
        let mut values = vec![800; 20];
        values.extend([1000, 1900]);
        let cfg = CleaningConfig::default();
        let (once, report) = clean_intervals_with_report(&rr(&values), &cfg);
        assert_eq!(once.rr, vec![800; 20]);
        assert_eq!(report.dropped_outliers, 2);
        assert_eq!(report.rounds, 3);

        let (twice, again) = clean_intervals_with_report(&once, &cfg);
        assert_eq!(twice, once);
        assert_eq!(again.rounds, 1);
        assert_eq!(again.kept, again.input);
    }

    #[test]
    fn exactly_half_off_is_dropped() {
        // |1200 - 800| == 0.5 * 800 is not inside the tolerance
        let out = clean_intervals(&rr(&[800, 800, 1200, 800, 800]), &CleaningConfig::default());
        assert_eq!(out.rr, vec![800, 800, 800, 800]);
    }
}
