pub mod hrv;
pub mod sqi;

pub use hrv::{hrv_time, DailyRecord, HrvMetrics};
pub use sqi::{evaluate_quality, SignalQuality};
