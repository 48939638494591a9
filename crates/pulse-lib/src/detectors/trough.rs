//! Adaptive trough detection for optical pulse signals.
//!
//! A sample becomes a trough when it sits below `local_mean - scale * local_std`
//! over a sliding window, is a strict local minimum within a small radius, and
//! lies at least one refractory period past the previously accepted trough.
//! Detection is streaming: each pushed sample costs at most one window scan,
//! and a mark is emitted once enough look-ahead has arrived to judge it.

use super::BeatDetector;
use crate::{
    config::TroughConfig,
    signal::{BeatMark, Beats, SampledPoint, TimeSeries},
};
use log::debug;
use std::collections::VecDeque;

/// Window sizes resolved against a sampling rate.
#[derive(Debug, Clone, Copy)]
struct TroughParams {
    /// Samples skipped at the start while the filters settle.
    settle: usize,
    half_window: usize,
    min_distance: usize,
    min_distance_ms: i64,
    radius: usize,
    lookahead: usize,
    threshold_scale: f64,
}

impl TroughParams {
    fn new(cfg: &TroughConfig, fs: f64) -> Self {
        let fs = fs.max(1.0);
        let window = ((cfg.window_s * fs) as usize).max(2);
        let half_window = window / 2;
        let min_distance = ((cfg.min_distance_s * fs) as usize).max(1);
        let radius = (min_distance / 6).min(cfg.max_search_radius);
        Self {
            settle: window,
            half_window,
            min_distance,
            min_distance_ms: (cfg.min_distance_s * 1000.0).round() as i64,
            radius,
            lookahead: half_window.max(radius),
            threshold_scale: cfg.threshold_scale,
        }
    }
}

/// Incremental trough detector fed one sample at a time.
#[derive(Debug, Clone)]
pub struct TroughStream {
    params: TroughParams,
    buf: VecDeque<SampledPoint>,
    /// Absolute index of `buf[0]`.
    base: usize,
    /// Absolute index the next pushed sample will get.
    next: usize,
    last: Option<BeatMark>,
}

impl TroughStream {
    pub fn new(cfg: &TroughConfig, fs: f64) -> Self {
        let params = TroughParams::new(cfg, fs);
        Self {
            params,
            buf: VecDeque::with_capacity(2 * params.lookahead + 2),
            base: 0,
            next: 0,
            last: None,
        }
    }

    /// Feed the next sample; returns a trough confirmed by this sample's arrival.
    pub fn push(&mut self, point: SampledPoint) -> Option<BeatMark> {
        self.buf.push_back(point);
        self.next += 1;
        let newest = self.next - 1;
        if newest < self.params.lookahead {
            return None;
        }
        let candidate = newest - self.params.lookahead;
        let mark = if candidate >= self.params.settle {
            self.evaluate(candidate)
        } else {
            None
        };
        if let Some(mark) = mark {
            self.last = Some(mark);
        }
        let keep_from = (candidate + 1).saturating_sub(self.params.lookahead);
        while self.base < keep_from && !self.buf.is_empty() {
            self.buf.pop_front();
            self.base += 1;
        }
        mark
    }

    /// Number of samples consumed so far.
    pub fn samples_seen(&self) -> usize {
        self.next
    }

    fn at(&self, index: usize) -> &SampledPoint {
        &self.buf[index - self.base]
    }

    fn evaluate(&self, index: usize) -> Option<BeatMark> {
        let p = self.params;
        let point = *self.at(index);

        let start = index - p.half_window;
        let end = index + p.half_window;
        let count = (end - start) as f64;
        let mean = (start..end).map(|i| self.at(i).value).sum::<f64>() / count;
        let std = ((start..end)
            .map(|i| (self.at(i).value - mean).powi(2))
            .sum::<f64>()
            / count)
            .sqrt();
        if point.value >= mean - p.threshold_scale * std {
            return None;
        }

        let is_local_min = (index - p.radius..=index + p.radius)
            .filter(|&i| i != index)
            .all(|i| self.at(i).value > point.value);
        if !is_local_min {
            return None;
        }

        if let Some(last) = self.last {
            if index - last.index < p.min_distance
                || point.timestamp_ms - last.timestamp_ms < p.min_distance_ms
            {
                return None;
            }
        }
        Some(BeatMark {
            index,
            timestamp_ms: point.timestamp_ms,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveTroughDetector {
    cfg: TroughConfig,
}

impl AdaptiveTroughDetector {
    pub fn new(cfg: TroughConfig) -> Self {
        Self { cfg }
    }
}

impl BeatDetector for AdaptiveTroughDetector {
    fn name(&self) -> &'static str {
        "adaptive-trough"
    }

    fn detect(&self, ts: &TimeSeries) -> Beats {
        let mut stream = TroughStream::new(&self.cfg, ts.fs);
        let marks: Vec<BeatMark> = ts.points.iter().filter_map(|&p| stream.push(p)).collect();
        debug!("adaptive trough: {} marks in {} samples", marks.len(), ts.len());
        Beats::from_marks(marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{conditioning::condition, config::ConditioningConfig};
    use std::f64::consts::PI;

    fn sine_series(fs: f64, hz: f64, seconds: f64) -> TimeSeries {
        let n = (fs * seconds) as usize;
        let data: Vec<f64> = (0..n)
            .map(|i| 76.5 + (2.0 * PI * hz * i as f64 / fs).sin())
            .collect();
        TimeSeries::from_uniform(fs, &data, 0)
    }

    fn assert_spacing(beats: &Beats, min_samples: usize, min_ms: i64) {
        for w in beats.marks.windows(2) {
            assert!(w[1].index - w[0].index >= min_samples, "{:?}", w);
            assert!(w[1].timestamp_ms - w[0].timestamp_ms >= min_ms, "{:?}", w);
        }
    }

    #[test]
    fn finds_one_trough_per_cycle() {
        let ts = condition(&sine_series(30.0, 1.2, 60.0), &ConditioningConfig::default());
        let beats = AdaptiveTroughDetector::default().detect(&ts);
        assert!(beats.len() >= 60, "only {} troughs", beats.len());
        for w in beats.marks.windows(2) {
            let rr = w[1].timestamp_ms - w[0].timestamp_ms;
            assert!((800..=870).contains(&rr), "interval {rr}");
        }
    }

    #[test]
    fn refractory_period_holds_with_noise_spikes() {
        let fs = 30.0;
        let mut ts = sine_series(fs, 1.2, 30.0);
        for (i, p) in ts.points.iter_mut().enumerate() {
            if i % 4 == 0 {
                p.value -= 3.0;
            }
        }
        let beats = AdaptiveTroughDetector::default().detect(&ts);
        assert!(!beats.is_empty());
        assert_spacing(&beats, 12, 400);
    }

    #[test]
    fn refractory_period_holds_with_irregular_timestamps() {
        let fs = 30.0;
        let n = 900;
        let mut t = 0i64;
        let points: Vec<SampledPoint> = (0..n)
            .map(|i| {
                t += if i % 3 == 0 { 5 } else { 40 };
                let v = (2.0 * PI * 2.5 * i as f64 / fs).sin() - 0.4 * (i % 2) as f64;
                SampledPoint::new(v, t)
            })
            .collect();
        let ts = TimeSeries::new(fs, points);
        let beats = AdaptiveTroughDetector::default().detect(&ts);
        assert_spacing(&beats, 12, 400);
    }

    #[test]
    fn stream_matches_batch_detection() {
        let ts = condition(&sine_series(25.0, 1.0, 20.0), &ConditioningConfig::default());
        let batch = AdaptiveTroughDetector::default().detect(&ts);
        let mut stream = TroughStream::new(&TroughConfig::default(), ts.fs);
        let mut streamed = Vec::new();
        for &p in &ts.points {
            if let Some(mark) = stream.push(p) {
                streamed.push(mark);
            }
        }
        assert_eq!(stream.samples_seen(), ts.len());
        assert_eq!(batch.marks, streamed);
    }

    #[test]
    fn stream_buffer_stays_bounded() {
        let cfg = TroughConfig::default();
        let mut stream = TroughStream::new(&cfg, 30.0);
        for i in 0..5_000 {
            stream.push(SampledPoint::new((i as f64 * 0.3).sin(), i * 33));
            assert!(stream.buf.len() <= 2 * 30 + 2);
        }
    }

    #[test]
    fn short_input_yields_nothing() {
        let ts = sine_series(30.0, 1.2, 2.5);
        assert!(AdaptiveTroughDetector::default().detect(&ts).is_empty());
    }
}
