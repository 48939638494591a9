use crate::signal::{RRSeries, TimeSeries};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Session-level signal quality indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    /// Clean intervals over raw intervals; 0 when nothing was detected.
    pub retained_ratio: f64,
    /// Coefficient of variation of the clean intervals.
    pub rr_cv: f64,
    /// Fraction of sample-to-sample jumps beyond mean + 2 sd.
    pub spike_ratio: f64,
    /// Shannon entropy (bits) of the normalized power spectrum.
    pub spectral_entropy: f64,
}

impl SignalQuality {
    pub fn is_acceptable(&self) -> bool {
        self.retained_ratio >= 0.5 && self.rr_cv <= 0.2
    }
}

pub fn evaluate_quality(conditioned: &TimeSeries, raw: &RRSeries, clean: &RRSeries) -> SignalQuality {
    let values = conditioned.values();
    SignalQuality {
        retained_ratio: retained_ratio(raw, clean),
        rr_cv: compute_rr_cv(clean),
        spike_ratio: compute_spike_ratio(&values),
        spectral_entropy: compute_spectral_entropy(&values),
    }
}

pub fn retained_ratio(raw: &RRSeries, clean: &RRSeries) -> f64 {
    if raw.is_empty() {
        return 0.0;
    }
    clean.len() as f64 / raw.len() as f64
}

pub fn compute_rr_cv(rr: &RRSeries) -> f64 {
    if rr.is_empty() {
        return 0.0;
    }
    let n = rr.len() as f64;
    let mean = rr.rr.iter().map(|&v| v as f64).sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }
    let sd = (rr.rr.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt();
    sd / mean
}

pub fn compute_spectral_entropy(data: &[f64]) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer = data.to_vec();
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buffer, &mut spectrum).is_err() {
        return 0.0;
    }
    let powers: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();
    let total_power: f64 = powers.iter().sum();
    if total_power == 0.0 {
        return 0.0;
    }
    powers
        .into_iter()
        .filter(|&p| p > 0.0)
        .map(|p| {
            let p = p / total_power;
            -p * p.log2()
        })
        .sum()
}

pub fn compute_spike_ratio(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = data.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let sd = (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / diffs.len() as f64).sqrt();
    if sd == 0.0 {
        return 0.0;
    }
    let threshold = mean + 2.0 * sd;
    diffs.iter().filter(|&&d| d > threshold).count() as f64 / diffs.len() as f64
}
