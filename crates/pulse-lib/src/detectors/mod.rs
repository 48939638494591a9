pub mod dropoff;
pub mod matched;
pub mod trough;

use crate::{
    config::{AnalysisConfig, DetectorKind},
    signal::{Beats, TimeSeries},
};

pub use dropoff::{DropoffDetector, DropoffEvent, DropoffTracker};
pub use matched::MatchedFilterDetector;
pub use trough::{AdaptiveTroughDetector, TroughStream};

/// Locates one periodic extremum per cardiac cycle.
///
/// Implementations report marks in strictly increasing timestamp order;
/// downstream stages do not care which strategy produced them.
pub trait BeatDetector {
    fn name(&self) -> &'static str;
    fn detect(&self, ts: &TimeSeries) -> Beats;
}

/// Build the detector selected by `cfg.detector`.
pub fn detector_for(cfg: &AnalysisConfig) -> Box<dyn BeatDetector> {
    match cfg.detector {
        DetectorKind::AdaptiveTrough => Box::new(AdaptiveTroughDetector::new(cfg.trough)),
        DetectorKind::MatchedFilter => Box::new(MatchedFilterDetector::new(cfg.matched_filter)),
        DetectorKind::Dropoff => Box::new(DropoffDetector::new(cfg.dropoff)),
    }
}
