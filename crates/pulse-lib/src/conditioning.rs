//! Smoothing, band-limiting and normalization of the raw optical signal.
//!
//! The band-pass is a cascade of two single-pole IIR sections (high-pass then
//! low-pass), not a flat-passband design.

use crate::{
    config::ConditioningConfig,
    signal::{SampledPoint, TimeSeries},
};
use log::{debug, warn};
use std::f64::consts::PI;

/// Smooth, band-limit and z-score a session. Output has the same length and
/// timestamps as the input. Inputs shorter than `cfg.min_samples` are
/// returned unmodified.
pub fn condition(ts: &TimeSeries, cfg: &ConditioningConfig) -> TimeSeries {
    if ts.len() < cfg.min_samples {
        warn!(
            "skipping conditioning: {} samples, need at least {}",
            ts.len(),
            cfg.min_samples
        );
        return ts.clone();
    }
    let fs = ts.fs.max(1.0);
    let values = ts.values();
    let normalized = if is_flat(&values) {
        warn!("flat input of {} samples; normalizing to zeros", values.len());
        vec![0.0; values.len()]
    } else {
        let smoothed = moving_average(&values, cfg.smoothing_window);
        let filtered = bandpass(&smoothed, fs, cfg.lowcut_hz, cfg.highcut_hz);
        normalize(&filtered)
    };
    debug!(
        "conditioned {} samples at {:.1} Hz ({}-{} Hz band)",
        ts.len(),
        fs,
        cfg.lowcut_hz,
        cfg.highcut_hz
    );
    let points = ts
        .points
        .iter()
        .zip(normalized)
        .map(|(p, value)| SampledPoint::new(value, p.timestamp_ms))
        .collect();
    TimeSeries::new(ts.fs, points)
}

fn is_flat(data: &[f64]) -> bool {
    let (lo, hi) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    hi - lo <= f64::EPSILON * hi.abs().max(lo.abs()).max(1.0)
}

/// Centered moving average; the window shrinks at the edges instead of padding.
pub fn moving_average(data: &[f64], width: usize) -> Vec<f64> {
    if data.is_empty() || width <= 1 {
        return data.to_vec();
    }
    let half = width / 2;
    let mut prefix = Vec::with_capacity(data.len() + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in data {
        acc += x;
        prefix.push(acc);
    }
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(data.len());
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect()
}

/// High-pass at `low` then low-pass at `high`. A cutoff at or beyond Nyquist
/// disables that stage.
pub fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

/// `pi * cutoff / nyquist`, i.e. the sample period over the RC constant.
fn normalized_pole(fs: f64, cutoff: f64) -> f64 {
    let nyquist = fs * 0.5;
    PI * (cutoff.max(0.01) / nyquist)
}

pub fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let alpha = 1.0 / (1.0 + normalized_pole(fs, cutoff));
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

pub fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let w = normalized_pole(fs, cutoff);
    let alpha = w / (1.0 + w);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Z-score the whole window. Zero variance maps every sample to 0.
pub fn normalize(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let std = (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std.is_nan() || std <= f64::EPSILON {
        warn!("zero-variance signal; normalizing to zeros");
        return vec![0.0; data.len()];
    }
    data.iter().map(|x| (x - mean) / std).collect()
}
