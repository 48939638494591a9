use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Time-domain HRV summary of one measurement session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvMetrics {
    /// Mean interval (ms)
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    /// Percentage of successive differences above 50 ms
    pub pnn50: f64,
    /// Beats per minute; `None` when the mean interval is zero.
    pub heart_rate: Option<f64>,
    pub valid_beats: usize,
}

pub fn hrv_time(rr: &RRSeries) -> HrvMetrics {
    let n = rr.len();
    if n == 0 {
        return HrvMetrics::default();
    }
    let values: Vec<f64> = rr.rr.iter().map(|&v| v as f64).collect();
    let mean_rr = values.iter().sum::<f64>() / n as f64;
    let sdnn = (values.iter().map(|x| (x - mean_rr).powi(2)).sum::<f64>() / n as f64).sqrt();

    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let (rmssd, pnn50) = if diffs.is_empty() {
        (0.0, 0.0)
    } else {
        let m = diffs.len() as f64;
        let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / m).sqrt();
        let over = diffs.iter().filter(|d| d.abs() > 50.0).count();
        (rmssd, over as f64 / m * 100.0)
    };
    let heart_rate = (mean_rr != 0.0).then(|| 60_000.0 / mean_rr);

    HrvMetrics {
        mean_rr,
        sdnn,
        rmssd,
        pnn50,
        heart_rate,
        valid_beats: n,
    }
}

/// One day of history: the session summary plus the user's fatigue label.
///
/// Field names follow the camelCase layout of exported history files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyRecord {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(rename = "meanRR")]
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
    pub heart_rate: f64,
    pub valid_beats: usize,
    /// 1 (rested) to 5 (exhausted); 0 while unconfirmed.
    pub fatigue_level: u8,
}

impl DailyRecord {
    pub fn from_metrics(metrics: &HrvMetrics, timestamp_ms: i64, fatigue_level: u8) -> Self {
        Self {
            timestamp_ms,
            mean_rr: metrics.mean_rr,
            sdnn: metrics.sdnn,
            rmssd: metrics.rmssd,
            pnn50: metrics.pnn50,
            heart_rate: metrics.heart_rate.unwrap_or(0.0),
            valid_beats: metrics.valid_beats,
            fatigue_level,
        }
    }

    /// `[sdnn, rmssd, pnn50]`, the order the tree ensemble indexes by.
    pub fn features(&self) -> [f64; 3] {
        [self.sdnn, self.rmssd, self.pnn50]
    }

    pub fn has_confirmed_fatigue(&self) -> bool {
        (1..=5).contains(&self.fatigue_level)
    }
}
