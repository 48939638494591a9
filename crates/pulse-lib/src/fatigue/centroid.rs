//! Nearest-centroid fatigue heuristics over per-label mean RMSSD.

use super::{FatigueRange, DEFAULT_LEVEL, MAX_LEVEL, MIN_LEVEL};
use crate::metrics::DailyRecord;
use log::{debug, warn};

const LEVELS: usize = MAX_LEVEL as usize;
/// Trend needs this many days of history...
const MIN_TREND_HISTORY: usize = 5;
/// ...and this many confirmed labels in the recent window.
const MIN_TREND_RECENT: usize = 2;

fn is_usable(r: &DailyRecord) -> bool {
    r.has_confirmed_fatigue() && r.rmssd > 0.0 && r.heart_rate > 0.0
}

/// Distance from `rmssd` to each label's mean RMSSD, indexed by label - 1.
/// Labels without usable history are `None`.
pub fn label_scores(history: &[DailyRecord], rmssd: f64) -> [Option<f64>; LEVELS] {
    let mut sums = [0.0; LEVELS];
    let mut counts = [0usize; LEVELS];
    for r in history.iter().filter(|r| is_usable(r)) {
        let slot = (r.fatigue_level - MIN_LEVEL) as usize;
        sums[slot] += r.rmssd;
        counts[slot] += 1;
    }
    let mut scores = [None; LEVELS];
    for (slot, score) in scores.iter_mut().enumerate() {
        if counts[slot] > 0 {
            *score = Some((rmssd - sums[slot] / counts[slot] as f64).abs());
        }
    }
    scores
}

/// Lowest label with the smallest score, as a slot index.
fn best_slot(scores: &[Option<f64>; LEVELS]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (slot, score) in scores.iter().enumerate() {
        if let Some(s) = *score {
            if best.map_or(true, |(_, b)| s < b) {
                best = Some((slot, s));
            }
        }
    }
    best.map(|(slot, _)| slot)
}

fn level_of(slot: usize) -> u8 {
    slot as u8 + MIN_LEVEL
}

/// Label whose mean RMSSD is closest to `rmssd`; 3 without usable history.
pub fn predict_level(history: &[DailyRecord], rmssd: f64) -> u8 {
    match best_slot(&label_scores(history, rmssd)) {
        Some(slot) => level_of(slot),
        None => {
            warn!("no usable fatigue history; defaulting to level {DEFAULT_LEVEL}");
            DEFAULT_LEVEL
        }
    }
}

/// Best label widened to its contiguous neighbours scoring within
/// `tolerance` of the best score. A label with no history ends the walk.
pub fn predict_range(history: &[DailyRecord], rmssd: f64, tolerance: f64) -> FatigueRange {
    let scores = label_scores(history, rmssd);
    let Some(best) = best_slot(&scores) else {
        warn!("no usable fatigue history; defaulting to level {DEFAULT_LEVEL}");
        return FatigueRange::single(DEFAULT_LEVEL);
    };
    let limit = scores[best].unwrap_or(0.0) * (1.0 + tolerance);
    let close = |slot: usize| scores[slot].is_some_and(|s| s <= limit);

    let mut low = best;
    while low > 0 && close(low - 1) {
        low -= 1;
    }
    let mut high = best;
    while high + 1 < LEVELS && close(high + 1) {
        high += 1;
    }
    FatigueRange {
        low: level_of(low),
        high: level_of(high),
    }
}

/// Widen `base` toward the average confirmed label of the most recent
/// `recent_days` days when it lies clearly outside.
///
/// Needs at least 5 days of history and at least 2 confirmed labels among
/// the recent days. Beyond 0.6 of a level the range stretches to cover the
/// average; between 0.3 and 0.6 it grows one step toward it.
pub fn adjust_for_trend(history: &[DailyRecord], base: FatigueRange, recent_days: usize) -> FatigueRange {
    if history.len() < MIN_TREND_HISTORY {
        return base;
    }
    let mut newest_first: Vec<&DailyRecord> = history.iter().collect();
    newest_first.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    let recent: Vec<f64> = newest_first
        .iter()
        .take(recent_days)
        .filter(|r| r.has_confirmed_fatigue())
        .map(|r| r.fatigue_level as f64)
        .collect();
    if recent.len() < MIN_TREND_RECENT {
        return base;
    }
    let avg = recent.iter().sum::<f64>() / recent.len() as f64;

    let (low, high) = (base.low as f64, base.high as f64);
    let distance = if avg < low {
        low - avg
    } else if avg > high {
        avg - high
    } else {
        return base;
    };

    let mut adjusted = base;
    if distance > 0.6 {
        if avg < low {
            adjusted.low = (avg.floor() as u8).max(MIN_LEVEL);
        } else {
            adjusted.high = (avg.ceil() as u8).min(MAX_LEVEL);
        }
    } else if distance > 0.3 {
        if avg < low {
            adjusted.low = base.low.saturating_sub(1).max(MIN_LEVEL);
        } else {
            adjusted.high = (base.high + 1).min(MAX_LEVEL);
        }
    }
    debug!("trend: recent average {avg:.2}, range {base} -> {adjusted}");
    adjusted
}

/// Percent confidence in `level`, from how often it was reported before.
pub fn confidence(history: &[DailyRecord], level: u8) -> f64 {
    if history.is_empty() {
        return 50.0;
    }
    let matches = history.iter().filter(|r| r.fatigue_level == level).count();
    let mut c = (30.0 + matches as f64 * 10.0).min(90.0);
    if history.len() < MIN_TREND_HISTORY {
        c *= 0.7;
    }
    c.max(25.0)
}
