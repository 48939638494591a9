//! One measurement session end to end: condition, detect, extract, clean, summarize.

use crate::{
    conditioning::condition,
    config::AnalysisConfig,
    detectors::detector_for,
    intervals::{clean_intervals_with_report, extract_intervals, CleaningReport},
    metrics::{evaluate_quality, hrv_time, HrvMetrics, SignalQuality},
    signal::{Beats, RRSeries, TimeSeries},
};
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub sampling_rate: f64,
    pub sample_count: usize,
    pub detector: &'static str,
    pub beats: Beats,
    pub raw_intervals: RRSeries,
    pub clean_intervals: RRSeries,
    pub cleaning: CleaningReport,
    pub hrv: HrvMetrics,
    pub quality: SignalQuality,
}

pub fn analyze_session(ts: &TimeSeries, cfg: &AnalysisConfig) -> SessionResult {
    let conditioned = condition(ts, &cfg.conditioning);
    let detector = detector_for(cfg);
    let beats = detector.detect(&conditioned);
    let raw_intervals = extract_intervals(&beats);
    let (clean_intervals, cleaning) = clean_intervals_with_report(&raw_intervals, &cfg.cleaning);
    let hrv = hrv_time(&clean_intervals);
    let quality = evaluate_quality(&conditioned, &raw_intervals, &clean_intervals);
    info!(
        "session: {} samples, {} beats via {}, {} clean intervals",
        ts.len(),
        beats.len(),
        detector.name(),
        clean_intervals.len()
    );
    SessionResult {
        sampling_rate: ts.fs,
        sample_count: ts.len(),
        detector: detector.name(),
        beats,
        raw_intervals,
        clean_intervals,
        cleaning,
        hrv,
        quality,
    }
}
