//! Offline matched-filter peak detection: Savitzky-Golay smoothing,
//! correlation with a Gaussian pulse template, then thresholded local maxima.

use super::BeatDetector;
use crate::{
    config::MatchedFilterConfig,
    signal::{Beats, TimeSeries},
};
use log::debug;

/// Quadratic, 5-point Savitzky-Golay smoothing coefficients.
const SG_5_2: [f64; 5] = [
    -3.0 / 35.0,
    12.0 / 35.0,
    17.0 / 35.0,
    12.0 / 35.0,
    -3.0 / 35.0,
];

/// Savitzky-Golay (5, 2) smoothing; indices past either edge are clamped.
pub fn savitzky_golay(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    if n == 0 {
        return Vec::new();
    }
    let half = (SG_5_2.len() / 2) as isize;
    (0..n as isize)
        .map(|i| {
            SG_5_2
                .iter()
                .enumerate()
                .map(|(j, c)| {
                    let k = (i + j as isize - half).clamp(0, n as isize - 1) as usize;
                    c * data[k]
                })
                .sum()
        })
        .collect()
}

/// Gaussian-shaped pulse spanning `len` samples.
pub fn gaussian_template(len: usize) -> Vec<f64> {
    let half = len as f64 / 2.0;
    (0..len)
        .map(|i| {
            let x = (i as f64 - half) / half;
            (-x * x * 5.0).exp()
        })
        .collect()
}

/// Cross-correlate with the template centred on each sample; samples outside
/// the signal contribute nothing.
pub fn correlate(signal: &[f64], template: &[f64]) -> Vec<f64> {
    let n = signal.len() as isize;
    let half = (template.len() / 2) as isize;
    (0..n)
        .map(|i| {
            template
                .iter()
                .enumerate()
                .filter_map(|(j, t)| {
                    let k = i + j as isize - half;
                    (k >= 0 && k < n).then(|| signal[k as usize] * t)
                })
                .sum()
        })
        .collect()
}

/// Strict local maxima above `threshold`, at least `min_distance` samples apart.
pub fn pick_peaks(data: &[f64], threshold: f64, min_distance: usize) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }
    let mut last: Option<usize> = None;
    for i in 1..data.len() - 1 {
        let curr = data[i];
        if curr > threshold && curr > data[i - 1] && curr > data[i + 1] {
            if last.map_or(true, |l| i - l >= min_distance) {
                peaks.push(i);
                last = Some(i);
            }
        }
    }
    peaks
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchedFilterDetector {
    cfg: MatchedFilterConfig,
}

impl MatchedFilterDetector {
    pub fn new(cfg: MatchedFilterConfig) -> Self {
        Self { cfg }
    }

    /// Correlation trace the peak picker runs over.
    pub fn response(&self, values: &[f64]) -> Vec<f64> {
        let smoothed = savitzky_golay(values);
        correlate(&smoothed, &gaussian_template(self.cfg.template_len))
    }
}

impl BeatDetector for MatchedFilterDetector {
    fn name(&self) -> &'static str {
        "matched-filter"
    }

    fn detect(&self, ts: &TimeSeries) -> Beats {
        if ts.is_empty() {
            return Beats::default();
        }
        let matched = self.response(&ts.values());
        let n = matched.len() as f64;
        let mean = matched.iter().sum::<f64>() / n;
        let std = (matched.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let threshold = mean + self.cfg.threshold_scale * std;
        let peaks = pick_peaks(&matched, threshold, self.cfg.min_peak_distance.max(1));
        debug!("matched filter: {} peaks in {} samples", peaks.len(), ts.len());
        Beats::from_indices(&ts.points, &peaks)
    }
}
