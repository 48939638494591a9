//! Fatigue level (1-5) estimation from day history.
//!
//! [`centroid`] holds the RMSSD nearest-centroid heuristics used for the
//! headline label, range and confidence; [`forest`] holds the bagged tree
//! ensemble that gives a continuous alternative.

pub mod centroid;
pub mod forest;

pub use centroid::{adjust_for_trend, confidence, label_scores, predict_level, predict_range};
pub use forest::RandomForest;

use crate::{config::FatigueConfig, error::HrvError, metrics::DailyRecord};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 5;
/// Returned whenever there is nothing to learn from.
pub const DEFAULT_LEVEL: u8 = 3;

/// Inclusive span of fatigue labels, written `"3"` or `"2-4"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FatigueRange {
    pub low: u8,
    pub high: u8,
}

impl FatigueRange {
    pub fn single(level: u8) -> Self {
        Self {
            low: level,
            high: level,
        }
    }

    pub fn new(low: u8, high: u8) -> Result<Self, HrvError> {
        let valid = |l: u8| (MIN_LEVEL..=MAX_LEVEL).contains(&l);
        if !valid(low) || !valid(high) || low > high {
            return Err(HrvError::InvalidFatigueRange(format!("{low}-{high}")));
        }
        Ok(Self { low, high })
    }

    pub fn is_single(&self) -> bool {
        self.low == self.high
    }

    pub fn contains(&self, level: u8) -> bool {
        (self.low..=self.high).contains(&level)
    }
}

impl fmt::Display for FatigueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

impl FromStr for FatigueRange {
    type Err = HrvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HrvError::InvalidFatigueRange(s.to_string());
        let s = s.trim();
        let (low, high) = match s.split_once('-') {
            Some((low, high)) => (low.trim(), high.trim()),
            None => (s, s),
        };
        let low: u8 = low.parse().map_err(|_| invalid())?;
        let high: u8 = high.parse().map_err(|_| invalid())?;
        Self::new(low, high).map_err(|_| invalid())
    }
}

impl TryFrom<String> for FatigueRange {
    type Error = HrvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FatigueRange> for String {
    fn from(range: FatigueRange) -> Self {
        range.to_string()
    }
}

/// Everything the predictor says about one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueEstimate {
    pub level: u8,
    pub range: FatigueRange,
    /// `range` after the recent-trend adjustment.
    pub adjusted_range: FatigueRange,
    /// Percent, 25 to 90.
    pub confidence: f64,
}

pub fn estimate(history: &[DailyRecord], rmssd: f64, cfg: &FatigueConfig) -> FatigueEstimate {
    let level = predict_level(history, rmssd);
    let range = predict_range(history, rmssd, cfg.range_tolerance);
    FatigueEstimate {
        level,
        range,
        adjusted_range: adjust_for_trend(history, range, cfg.recent_days),
        confidence: confidence(history, level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_display_and_parse() {
        assert_eq!(FatigueRange::single(3).to_string(), "3");
        let range: FatigueRange = " 2-4 ".parse().unwrap();
        assert_eq!(range, FatigueRange { low: 2, high: 4 });
        assert_eq!(range.to_string(), "2-4");
        assert!(range.contains(3) && !range.contains(5));
    }

    #[test]
    fn range_parse_rejects_garbage() {
        for bad in ["", "x", "0", "6", "4-2", "1-9", "2-"] {
            assert_eq!(
                bad.parse::<FatigueRange>(),
                Err(HrvError::InvalidFatigueRange(bad.to_string())),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn range_serializes_as_label_text() {
        let json = serde_json::to_string(&FatigueRange::new(1, 2).unwrap()).unwrap();
        assert_eq!(json, "\"1-2\"");
        let back: FatigueRange = serde_json::from_str("\"5\"").unwrap();
        assert_eq!(back, FatigueRange::single(5));
        assert!(serde_json::from_str::<FatigueRange>("\"7\"").is_err());
    }

    #[test]
    fn estimate_on_empty_history_uses_defaults() {
        let e = estimate(&[], 30.0, &FatigueConfig::default());
        assert_eq!(e.level, DEFAULT_LEVEL);
        assert_eq!(e.range, FatigueRange::single(DEFAULT_LEVEL));
        assert_eq!(e.adjusted_range, e.range);
        assert_eq!(e.confidence, 50.0);
    }
}
