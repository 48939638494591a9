//! Rolling personal baseline and deviation scoring.
//!
//! The analyzer owns its history buffer. Every mutation goes through
//! `&mut self`, and a refresh builds the complete [`Baseline`] before
//! swapping it in, so readers only ever see a whole baseline or none.

use crate::{
    config::BaselineConfig,
    error::{HrvError, Result},
    metrics::DailyRecord,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Z-score magnitude above which a metric is called out.
const NOTABLE_Z: f64 = 1.5;
/// Composite weights, SDNN / RMSSD / pNN50.
const WEIGHTS: [f64; 3] = [0.3, 0.5, 0.2];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean: f64,
    pub standard_deviation: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
}

impl BaselineStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            standard_deviation: variance.sqrt(),
            median: percentile(&sorted, 50.0),
            p25: percentile(&sorted, 25.0),
            p75: percentile(&sorted, 75.0),
        }
    }

    /// Zero spread means no measurable deviation, so the score is 0.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.standard_deviation > 0.0 {
            (value - self.mean) / self.standard_deviation
        } else {
            0.0
        }
    }
}

impl fmt::Display for BaselineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mean: {:.2}, Std: {:.2}, Median: {:.2}",
            self.mean, self.standard_deviation, self.median
        )
    }
}

/// Linear interpolation between order statistics (R type 7).
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub sdnn: BaselineStats,
    pub rmssd: BaselineStats,
    pub pnn50: BaselineStats,
}

impl Baseline {
    pub fn from_records(records: &[DailyRecord]) -> Self {
        let column = |f: fn(&DailyRecord) -> f64| -> Vec<f64> { records.iter().map(f).collect() };
        Self {
            sdnn: BaselineStats::from_values(&column(|r| r.sdnn)),
            rmssd: BaselineStats::from_values(&column(|r| r.rmssd)),
            pnn50: BaselineStats::from_values(&column(|r| r.pnn50)),
        }
    }

    /// Weighted sum of each metric relative to its baseline mean. A metric
    /// whose baseline mean is zero contributes nothing.
    pub fn composite_score(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> f64 {
        [
            (sdnn, self.sdnn.mean),
            (rmssd, self.rmssd.mean),
            (pnn50, self.pnn50.mean),
        ]
        .iter()
        .zip(WEIGHTS)
        .filter(|((_, mean), _)| *mean != 0.0)
        .map(|((value, mean), w)| w * value / mean)
        .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "MILD_DEVIATION")]
    Mild,
    #[serde(rename = "MODERATE_DEVIATION")]
    Moderate,
    #[serde(rename = "HIGH_DEVIATION")]
    High,
}

impl RiskLevel {
    pub fn from_composite(composite: f64) -> Self {
        if composite <= 1.0 {
            RiskLevel::Normal
        } else if composite <= 1.5 {
            RiskLevel::Mild
        } else if composite <= 2.0 {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "NORMAL",
            RiskLevel::Mild => "MILD_DEVIATION",
            RiskLevel::Moderate => "MODERATE_DEVIATION",
            RiskLevel::High => "HIGH_DEVIATION",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "HRV is within normal baseline range.",
            RiskLevel::Mild => "HRV shows mild deviation from baseline.",
            RiskLevel::Moderate => {
                "HRV shows moderate deviation from baseline. Consider lighter training."
            }
            RiskLevel::High => {
                "HRV shows significant deviation from baseline. Consider rest or very light activity."
            }
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationResult {
    pub sdnn_z: f64,
    pub rmssd_z: f64,
    pub pnn50_z: f64,
    pub composite: f64,
    pub risk: RiskLevel,
    pub interpretation: String,
}

impl DeviationResult {
    fn new(sdnn_z: f64, rmssd_z: f64, pnn50_z: f64) -> Self {
        let composite = WEIGHTS[0] * sdnn_z.abs() + WEIGHTS[1] * rmssd_z.abs() + WEIGHTS[2] * pnn50_z.abs();
        let risk = RiskLevel::from_composite(composite);
        let interpretation = interpret(risk, [sdnn_z, rmssd_z, pnn50_z]);
        Self {
            sdnn_z,
            rmssd_z,
            pnn50_z,
            composite,
            risk,
            interpretation,
        }
    }
}

fn interpret(risk: RiskLevel, z: [f64; 3]) -> String {
    const NAMES: [&str; 3] = ["SDNN", "RMSSD", "PNN50"];
    let pick = |keep: fn(f64) -> bool| -> Vec<&'static str> {
        NAMES
            .iter()
            .zip(z)
            .filter(|(_, z)| keep(*z))
            .map(|(name, _)| *name)
            .collect()
    };
    let low = pick(|z| z < -NOTABLE_Z);
    let high = pick(|z| z > NOTABLE_Z);

    let mut text = risk.summary().to_string();
    if !low.is_empty() {
        text.push_str(&format!(" Lower than normal: {}.", low.join(", ")));
    }
    if !high.is_empty() {
        text.push_str(&format!(" Higher than normal: {}.", high.join(", ")));
    }
    text
}

/// Owns the trailing history and the baseline computed from it.
#[derive(Debug, Clone)]
pub struct BaselineAnalyzer {
    cfg: BaselineConfig,
    history: Vec<DailyRecord>,
    baseline: Option<Baseline>,
}

impl BaselineAnalyzer {
    pub fn new(cfg: BaselineConfig) -> Self {
        Self {
            cfg,
            history: Vec::new(),
            baseline: None,
        }
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn history(&self) -> &[DailyRecord] {
        &self.history
    }

    /// Replace the history and recompute the baseline from its most recent
    /// `baseline_days` entries.
    pub fn update_baseline(&mut self, history: &[DailyRecord]) -> Result<()> {
        if history.is_empty() {
            return Err(HrvError::EmptyHistory);
        }
        let window = &history[history.len().saturating_sub(self.cfg.baseline_days)..];
        let baseline = Baseline::from_records(window);
        debug!(
            "baseline refreshed from {} of {} records (sdnn {:.1}, rmssd {:.1}, pnn50 {:.1})",
            window.len(),
            history.len(),
            baseline.sdnn.mean,
            baseline.rmssd.mean,
            baseline.pnn50.mean
        );
        self.history = history.to_vec();
        self.baseline = Some(baseline);
        Ok(())
    }

    pub fn analyze_deviation(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> Result<DeviationResult> {
        let b = self.baseline.as_ref().ok_or(HrvError::BaselineNotEstablished)?;
        Ok(DeviationResult::new(
            b.sdnn.z_score(sdnn),
            b.rmssd.z_score(rmssd),
            b.pnn50.z_score(pnn50),
        ))
    }

    /// Share of stored days (percent) whose composite score is strictly
    /// below the query's. 50 with no history.
    pub fn percentile_rank(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> Result<f64> {
        if self.history.is_empty() {
            return Ok(50.0);
        }
        let b = self.baseline.as_ref().ok_or(HrvError::BaselineNotEstablished)?;
        let current = b.composite_score(sdnn, rmssd, pnn50);
        let below = self
            .history
            .iter()
            .filter(|r| b.composite_score(r.sdnn, r.rmssd, r.pnn50) < current)
            .count();
        Ok(below as f64 / self.history.len() as f64 * 100.0)
    }

    /// Composite above 2, or both SDNN and RMSSD z-scores above +1.5.
    /// The secondary trigger is signed: scores below the mean never fire it.
    pub fn is_high_fatigue_risk(&self, sdnn: f64, rmssd: f64, pnn50: f64) -> Result<bool> {
        let d = self.analyze_deviation(sdnn, rmssd, pnn50)?;
        Ok(d.composite > 2.0 || (d.sdnn_z > NOTABLE_Z && d.rmssd_z > NOTABLE_Z))
    }

    pub fn baseline_info(&self) -> String {
        match &self.baseline {
            None => "Baseline not established".to_string(),
            Some(b) => format!(
                "Baseline ({} days):\nSDNN: {}\nRMSSD: {}\nPNN50: {}",
                self.cfg.baseline_days, b.sdnn, b.rmssd, b.pnn50
            ),
        }
    }

    /// Append one day. Past twice the window the buffer is cut back to one
    /// window; the baseline refreshes whenever the length is a multiple of
    /// `refresh_every`.
    pub fn add_record(&mut self, record: DailyRecord) {
        self.history.push(record);
        let days = self.cfg.baseline_days;
        if self.history.len() > days * 2 {
            let excess = self.history.len() - days;
            self.history.drain(..excess);
        }
        if self.history.len() % self.cfg.refresh_every.max(1) == 0 {
            let snapshot = self.history.clone();
            if let Err(err) = self.update_baseline(&snapshot) {
                warn!("baseline refresh skipped: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::synthetic_history;

    fn record(sdnn: f64, rmssd: f64, pnn50: f64) -> DailyRecord {
        DailyRecord {
            sdnn,
            rmssd,
            pnn50,
            heart_rate: 70.0,
            ..Default::default()
        }
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn constant_history_round_trips() {
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig::default());
        analyzer
            .update_baseline(&vec![record(40.0, 40.0, 40.0); 12])
            .unwrap();
        let b = analyzer.baseline().unwrap();
        for stats in [b.sdnn, b.rmssd, b.pnn50] {
            assert_eq!(stats.mean, 40.0);
            assert_eq!(stats.standard_deviation, 0.0);
            assert_eq!((stats.p25, stats.median, stats.p75), (40.0, 40.0, 40.0));
        }
        let d = analyzer.analyze_deviation(55.0, 20.0, 40.0).unwrap();
        assert_eq!((d.sdnn_z, d.rmssd_z, d.composite), (0.0, 0.0, 0.0));
        assert_eq!(d.risk, RiskLevel::Normal);
    }

    #[test]
    fn percentiles_interpolate_and_stay_ordered() {
        let stats = BaselineStats::from_values(&[7.0, 1.0, 3.0, 10.0]);
        assert_close(stats.p25, 2.5, 1e-12);
        assert_close(stats.median, 5.0, 1e-12);
        assert_close(stats.p75, 7.75, 1e-12);
        assert!(stats.p25 <= stats.median && stats.median <= stats.p75);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[4.0], 90.0), 4.0);
    }

    #[test]
    fn query_at_baseline_mean_is_normal() {
        let history: Vec<DailyRecord> = (0..20)
            .map(|i| record(40.0 + (i % 5) as f64, 30.0 + (i % 3) as f64, 15.0 + (i % 4) as f64))
            .collect();
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig::default());
        analyzer.update_baseline(&history).unwrap();
        let b = *analyzer.baseline().unwrap();
        let d = analyzer
            .analyze_deviation(b.sdnn.mean, b.rmssd.mean, b.pnn50.mean)
            .unwrap();
        assert_close(d.composite, 0.0, 1e-12);
        assert_eq!(d.risk, RiskLevel::Normal);
        assert_eq!(d.interpretation, "HRV is within normal baseline range.");
    }

    #[test]
    fn preconditions_are_reported() {
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig::default());
        assert_eq!(
            analyzer.analyze_deviation(40.0, 30.0, 10.0),
            Err(HrvError::BaselineNotEstablished)
        );
        assert_eq!(analyzer.update_baseline(&[]), Err(HrvError::EmptyHistory));
        assert_eq!(analyzer.percentile_rank(40.0, 30.0, 10.0), Ok(50.0));
        assert_eq!(analyzer.baseline_info(), "Baseline not established");
    }

    #[test]
    fn risk_tiers_follow_composite_bounds() {
        assert_eq!(RiskLevel::from_composite(1.0), RiskLevel::Normal);
        assert_eq!(RiskLevel::from_composite(1.2), RiskLevel::Mild);
        assert_eq!(RiskLevel::from_composite(2.0), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_composite(2.01), RiskLevel::High);
        assert_eq!(
            serde_json::to_string(&RiskLevel::Mild).unwrap(),
            "\"MILD_DEVIATION\""
        );
    }

    #[test]
    fn interpretation_lists_outlying_metrics() {
        let history: Vec<DailyRecord> = (0..10)
            .map(|i| record(40.0 + (i % 2) as f64 * 4.0, 30.0 + (i % 2) as f64 * 4.0, 15.0))
            .collect();
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig::default());
        analyzer.update_baseline(&history).unwrap();
        // baseline: sdnn 42 +- 2, rmssd 32 +- 2, pnn50 15 +- 0
        let d = analyzer.analyze_deviation(37.6, 36.4, 15.0).unwrap();
        assert_close(d.sdnn_z, -2.2, 1e-9);
        assert_close(d.rmssd_z, 2.2, 1e-9);
        assert_eq!(d.risk, RiskLevel::Moderate);
        assert_eq!(
            d.interpretation,
            "HRV shows moderate deviation from baseline. Consider lighter training. \
             Lower than normal: SDNN. Higher than normal: RMSSD."
        );
        // opposite signs never trip the secondary trigger
        assert!(!analyzer.is_high_fatigue_risk(37.6, 36.4, 15.0).unwrap());
        assert!(!analyzer.is_high_fatigue_risk(42.0, 36.4, 15.0).unwrap());
    }

    #[test]
    fn secondary_risk_trigger_is_signed() {
        let history: Vec<DailyRecord> = (0..10)
            .map(|i| record(40.0 + (i % 2) as f64 * 4.0, 30.0 + (i % 2) as f64 * 4.0, 15.0))
            .collect();
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig::default());
        analyzer.update_baseline(&history).unwrap();

        // z = (+1.6, +1.6), composite 1.28
        let high = analyzer.analyze_deviation(45.2, 35.2, 15.0).unwrap();
        assert_close(high.composite, 1.28, 1e-9);
        assert!(analyzer.is_high_fatigue_risk(45.2, 35.2, 15.0).unwrap());

        // z = (-1.6, -1.6), same composite
        let low = analyzer.analyze_deviation(38.8, 28.8, 15.0).unwrap();
        assert_close(low.sdnn_z, -1.6, 1e-9);
        assert_close(low.rmssd_z, -1.6, 1e-9);
        assert!(!analyzer.is_high_fatigue_risk(38.8, 28.8, 15.0).unwrap());

        // only one metric above the cut
        assert!(!analyzer.is_high_fatigue_risk(45.2, 32.0, 15.0).unwrap());
    }

    #[test]
    fn zero_mean_metric_drops_out_of_composite() {
        let b = Baseline::from_records(&[record(40.0, 20.0, 0.0), record(40.0, 20.0, 0.0)]);
        assert_close(b.composite_score(40.0, 20.0, 7.0), 0.8, 1e-12);
    }

    #[test]
    fn baseline_uses_trailing_window() {
        let mut history: Vec<DailyRecord> = (0..10).map(|_| record(100.0, 100.0, 100.0)).collect();
        history.extend((0..5).map(|_| record(40.0, 30.0, 10.0)));
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig {
            baseline_days: 5,
            refresh_every: 7,
        });
        analyzer.update_baseline(&history).unwrap();
        assert_eq!(analyzer.baseline().unwrap().sdnn.mean, 40.0);
        assert_eq!(analyzer.history().len(), 15);
        assert!(analyzer.baseline_info().starts_with("Baseline (5 days):\nSDNN: Mean: 40.00"));
    }

    #[test]
    fn add_record_refreshes_periodically_and_trims() {
        let cfg = BaselineConfig {
            baseline_days: 5,
            refresh_every: 7,
        };
        let mut analyzer = BaselineAnalyzer::new(cfg);
        for i in 0..6 {
            analyzer.add_record(record(30.0 + i as f64, 30.0, 10.0));
        }
        assert!(analyzer.baseline().is_none());
        analyzer.add_record(record(36.0, 30.0, 10.0));
        // refreshed on the 7th record from the last 5 (32..=36)
        assert_eq!(analyzer.baseline().unwrap().sdnn.mean, 34.0);

        for i in 0..4 {
            analyzer.add_record(record(50.0 + i as f64, 30.0, 10.0));
        }
        // 11 > 2 * 5, cut back to the last 5
        assert_eq!(analyzer.history().len(), 5);
        assert_eq!(analyzer.history()[0].sdnn, 36.0);
    }

    #[test]
    fn synthetic_sixty_day_scenario() {
        let history = synthetic_history(60, 24);
        let mut analyzer = BaselineAnalyzer::new(BaselineConfig::default());
        analyzer.update_baseline(&history).unwrap();

        let typical = analyzer.analyze_deviation(45.2, 38.1, 15.3).unwrap();
        assert!(
            matches!(typical.risk, RiskLevel::Normal | RiskLevel::Mild),
            "{typical:?}"
        );
        assert!(analyzer.percentile_rank(45.2, 38.1, 15.3).unwrap() > 50.0);

        let depressed = analyzer.analyze_deviation(28.1, 18.2, 4.2).unwrap();
        assert_eq!(depressed.risk, RiskLevel::High, "{depressed:?}");
        assert!(analyzer.is_high_fatigue_risk(28.1, 18.2, 4.2).unwrap());
    }
}
