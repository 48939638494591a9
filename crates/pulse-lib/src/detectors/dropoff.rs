//! Threshold-dropoff detection as used by live preview displays.
//!
//! A peak is confirmed once the signal falls more than `dropoff_threshold`
//! below the running maximum; a trough once it climbs more than
//! `gain_threshold` above the running minimum. The two alternate strictly,
//! starting with a peak.

use super::BeatDetector;
use crate::{
    config::{DropoffConfig, Extremum},
    signal::{BeatMark, Beats, SampledPoint, TimeSeries},
};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropoffEvent {
    Peak(BeatMark),
    Trough(BeatMark),
}

impl DropoffEvent {
    pub fn mark(&self) -> BeatMark {
        match self {
            DropoffEvent::Peak(m) | DropoffEvent::Trough(m) => *m,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Tracking the running maximum, waiting for the fall.
    SeekPeak { max: f64, at: BeatMark },
    /// Tracking the running minimum, waiting for the rise.
    SeekTrough { min: f64, at: BeatMark },
}

/// Streaming peak/trough alternation state.
#[derive(Debug, Clone)]
pub struct DropoffTracker {
    cfg: DropoffConfig,
    phase: Option<Phase>,
    next: usize,
    last_peak: Option<BeatMark>,
    last_trough: Option<BeatMark>,
}

impl DropoffTracker {
    pub fn new(cfg: DropoffConfig) -> Self {
        Self {
            cfg,
            phase: None,
            next: 0,
            last_peak: None,
            last_trough: None,
        }
    }

    pub fn push(&mut self, point: SampledPoint) -> Option<DropoffEvent> {
        let here = BeatMark {
            index: self.next,
            timestamp_ms: point.timestamp_ms,
        };
        self.next += 1;
        let v = point.value;
        let phase = match self.phase {
            None => {
                self.phase = Some(Phase::SeekPeak { max: v, at: here });
                return None;
            }
            Some(phase) => phase,
        };
        let (phase, event) = match phase {
            Phase::SeekPeak { max, at } => {
                if v > max {
                    (Phase::SeekPeak { max: v, at: here }, None)
                } else if max - v > self.cfg.dropoff_threshold {
                    if spaced(self.last_peak, at, self.cfg.min_distance_ms) {
                        self.last_peak = Some(at);
                        (Phase::SeekTrough { min: v, at: here }, Some(DropoffEvent::Peak(at)))
                    } else {
                        (Phase::SeekPeak { max: v, at: here }, None)
                    }
                } else {
                    (phase, None)
                }
            }
            Phase::SeekTrough { min, at } => {
                if v < min {
                    (Phase::SeekTrough { min: v, at: here }, None)
                } else if v - min > self.cfg.gain_threshold {
                    if spaced(self.last_trough, at, self.cfg.min_distance_ms) {
                        self.last_trough = Some(at);
                        (Phase::SeekPeak { max: v, at: here }, Some(DropoffEvent::Trough(at)))
                    } else {
                        (Phase::SeekTrough { min: v, at: here }, None)
                    }
                } else {
                    (phase, None)
                }
            }
        };
        self.phase = Some(phase);
        event
    }
}

fn spaced(last: Option<BeatMark>, candidate: BeatMark, min_ms: i64) -> bool {
    last.map_or(true, |l| candidate.timestamp_ms - l.timestamp_ms >= min_ms)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DropoffDetector {
    cfg: DropoffConfig,
}

impl DropoffDetector {
    pub fn new(cfg: DropoffConfig) -> Self {
        Self { cfg }
    }

    /// Every peak and trough in arrival order.
    pub fn events(&self, ts: &TimeSeries) -> Vec<DropoffEvent> {
        let mut tracker = DropoffTracker::new(self.cfg);
        ts.points.iter().filter_map(|&p| tracker.push(p)).collect()
    }
}

impl BeatDetector for DropoffDetector {
    fn name(&self) -> &'static str {
        "dropoff"
    }

    fn detect(&self, ts: &TimeSeries) -> Beats {
        let events = self.events(ts);
        let marks: Vec<BeatMark> = events
            .iter()
            .filter_map(|e| match (e, self.cfg.report) {
                (DropoffEvent::Peak(m), Extremum::Peak) => Some(*m),
                (DropoffEvent::Trough(m), Extremum::Trough) => Some(*m),
                _ => None,
            })
            .collect();
        debug!(
            "dropoff: {} events, {} {:?} marks",
            events.len(),
            marks.len(),
            self.cfg.report
        );
        Beats::from_marks(marks)
    }
}
