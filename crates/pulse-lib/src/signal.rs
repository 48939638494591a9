use serde::{Deserialize, Serialize};

/// One optical sample as delivered by the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledPoint {
    pub value: f64,
    /// Capture time in milliseconds; non-decreasing across a session.
    pub timestamp_ms: i64,
}

impl SampledPoint {
    pub fn new(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            timestamp_ms,
        }
    }
}

/// Time-stamped scalar series with a nominal sampling rate.
///
/// Spacing is not guaranteed to be uniform; `fs` is only the rate the
/// acquisition loop aimed for and is used to size windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Nominal sampling frequency in Hz
    pub fs: f64,
    pub points: Vec<SampledPoint>,
}

impl TimeSeries {
    pub fn new(fs: f64, points: Vec<SampledPoint>) -> Self {
        Self { fs, points }
    }

    /// Build a series from evenly spaced values starting at `start_ms`.
    pub fn from_uniform(fs: f64, data: &[f64], start_ms: i64) -> Self {
        let step_ms = 1000.0 / fs.max(f64::MIN_POSITIVE);
        let points = data
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                SampledPoint::new(value, start_ms + (i as f64 * step_ms).round() as i64)
            })
            .collect();
        Self { fs, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
    /// Span between first and last timestamp in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0,
        }
    }
}

/// A detected trough or peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatMark {
    /// Sample index into the series the detector ran over
    pub index: usize,
    pub timestamp_ms: i64,
}

/// Beat marks in strictly increasing timestamp order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Beats {
    pub marks: Vec<BeatMark>,
}

impl Beats {
    pub fn from_marks(marks: Vec<BeatMark>) -> Self {
        Self { marks }
    }

    /// Resolve sample indices against the series they were detected on.
    /// Out-of-range indices are skipped.
    pub fn from_indices(points: &[SampledPoint], indices: &[usize]) -> Self {
        let marks = indices
            .iter()
            .filter_map(|&index| {
                points.get(index).map(|p| BeatMark {
                    index,
                    timestamp_ms: p.timestamp_ms,
                })
            })
            .collect();
        Self { marks }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
    pub fn timestamps(&self) -> Vec<i64> {
        self.marks.iter().map(|m| m.timestamp_ms).collect()
    }
}

/// Inter-beat intervals in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<i64>,
}

impl RRSeries {
    pub fn new(rr: Vec<i64>) -> Self {
        Self { rr }
    }

    pub fn from_beats(beats: &Beats) -> Self {
        let rr = beats
            .marks
            .windows(2)
            .map(|w| w[1].timestamp_ms - w[0].timestamp_ms)
            .collect();
        Self { rr }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_series_spaces_timestamps_by_rate() {
        let ts = TimeSeries::from_uniform(30.0, &[0.0, 1.0, 2.0, 3.0], 1_000);
        let stamps: Vec<i64> = ts.points.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_000, 1_033, 1_067, 1_100]);
        assert_eq!(ts.duration_ms(), 100);
    }

    #[test]
    fn rr_from_beats_uses_timestamps() {
        let beats = Beats::from_marks(vec![
            BeatMark {
                index: 3,
                timestamp_ms: 100,
            },
            BeatMark {
                index: 30,
                timestamp_ms: 900,
            },
            BeatMark {
                index: 55,
                timestamp_ms: 1_720,
            },
        ]);
        assert_eq!(RRSeries::from_beats(&beats).rr, vec![800, 820]);
    }

    #[test]
    fn from_indices_skips_out_of_range() {
        let points = vec![SampledPoint::new(0.0, 0), SampledPoint::new(1.0, 40)];
        let beats = Beats::from_indices(&points, &[1, 7]);
        assert_eq!(beats.len(), 1);
        assert_eq!(beats.marks[0].timestamp_ms, 40);
    }
}
