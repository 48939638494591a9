use crate::error::{HrvError, Result as HrvResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which beat detection strategy the session pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    #[default]
    AdaptiveTrough,
    MatchedFilter,
    Dropoff,
}

/// Smoothing and band-limiting ahead of detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    /// Centered moving-average width (samples).
    pub smoothing_window: usize,
    /// Single-pole high-pass cutoff (Hz).
    pub lowcut_hz: f64,
    /// Single-pole low-pass cutoff (Hz).
    pub highcut_hz: f64,
    /// Shorter inputs are passed through untouched.
    pub min_samples: usize,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            lowcut_hz: 0.5,
            highcut_hz: 4.0,
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TroughConfig {
    /// Sliding window for local mean/std (seconds).
    pub window_s: f64,
    /// Refractory period between accepted troughs (seconds).
    pub min_distance_s: f64,
    /// Candidates must fall below `mean - threshold_scale * std`.
    pub threshold_scale: f64,
    /// Upper bound on the local-minimum search radius (samples).
    pub max_search_radius: usize,
}

impl Default for TroughConfig {
    fn default() -> Self {
        Self {
            window_s: 2.0,
            min_distance_s: 0.4,
            threshold_scale: 0.2,
            max_search_radius: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchedFilterConfig {
    /// Gaussian pulse template length (samples).
    pub template_len: usize,
    /// Peaks must exceed `mean + threshold_scale * std` of the correlation.
    pub threshold_scale: f64,
    /// Minimum spacing between peaks (samples).
    pub min_peak_distance: usize,
}

impl Default for MatchedFilterConfig {
    fn default() -> Self {
        Self {
            template_len: 15,
            threshold_scale: 0.5,
            min_peak_distance: 30,
        }
    }
}

/// Which extremum the dropoff detector reports as beat marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extremum {
    Peak,
    #[default]
    Trough,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropoffConfig {
    /// Drop below the running maximum that confirms a peak (signal units).
    pub dropoff_threshold: f64,
    /// Rise above the running minimum that confirms a trough (signal units).
    pub gain_threshold: f64,
    /// Debounce between marks of the same kind (milliseconds).
    pub min_distance_ms: i64,
    pub report: Extremum,
}

impl Default for DropoffConfig {
    fn default() -> Self {
        Self {
            dropoff_threshold: 1.5,
            gain_threshold: 1.25,
            min_distance_ms: 300,
            report: Extremum::Trough,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub min_rr_ms: i64,
    pub max_rr_ms: i64,
    /// Global outlier cut in standard deviations from the mean.
    pub outlier_sd: f64,
    /// Allowed fractional departure from the neighbor average.
    pub neighbor_tolerance: f64,
    /// Below this many raw intervals cleaning is skipped.
    pub min_intervals: usize,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            min_rr_ms: 300,
            max_rr_ms: 2000,
            outlier_sd: 3.0,
            neighbor_tolerance: 0.5,
            min_intervals: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Trailing window of daily records that defines "normal".
    pub baseline_days: usize,
    /// Recompute after `add_record` whenever history length is a multiple of this.
    pub refresh_every: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            baseline_days: 30,
            refresh_every: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Most recent confirmed days averaged for the trend adjustment.
    pub recent_days: usize,
    /// Labels scoring within this fraction of the best join the range.
    pub range_tolerance: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            recent_days: 7,
            range_tolerance: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    /// Nodes holding this many samples or fewer become leaves.
    pub min_samples: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 50,
            max_depth: 5,
            min_samples: 2,
            seed: 42,
        }
    }
}

/// All tunables of the pipeline, baseline and predictors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub detector: DetectorKind,
    pub conditioning: ConditioningConfig,
    pub trough: TroughConfig,
    pub matched_filter: MatchedFilterConfig,
    pub dropoff: DropoffConfig,
    pub cleaning: CleaningConfig,
    pub baseline: BaselineConfig,
    pub fatigue: FatigueConfig,
    pub forest: ForestConfig,
}

impl AnalysisConfig {
    pub fn validate(&self) -> HrvResult<()> {
        let c = &self.conditioning;
        if c.smoothing_window == 0 {
            return Err(invalid("conditioning.smoothing_window must be >= 1"));
        }
        if !(c.lowcut_hz > 0.0 && c.highcut_hz > c.lowcut_hz) {
            return Err(invalid(
                "conditioning cutoffs must satisfy 0 < lowcut_hz < highcut_hz",
            ));
        }
        let t = &self.trough;
        if !(t.window_s > 0.0 && t.min_distance_s > 0.0) {
            return Err(invalid("trough.window_s and trough.min_distance_s must be > 0"));
        }
        if self.matched_filter.template_len < 3 {
            return Err(invalid("matched_filter.template_len must be >= 3"));
        }
        let d = &self.dropoff;
        if !(d.dropoff_threshold > 0.0 && d.gain_threshold > 0.0) || d.min_distance_ms < 0 {
            return Err(invalid("dropoff thresholds must be > 0 and min_distance_ms >= 0"));
        }
        let cl = &self.cleaning;
        if cl.min_rr_ms >= cl.max_rr_ms || cl.outlier_sd <= 0.0 || cl.neighbor_tolerance <= 0.0 {
            return Err(invalid(
                "cleaning requires min_rr_ms < max_rr_ms and positive tolerances",
            ));
        }
        if self.baseline.baseline_days == 0 || self.baseline.refresh_every == 0 {
            return Err(invalid("baseline days and refresh interval must be >= 1"));
        }
        if self.fatigue.recent_days == 0 || self.fatigue.range_tolerance < 0.0 {
            return Err(invalid(
                "fatigue.recent_days must be >= 1 and range_tolerance >= 0",
            ));
        }
        if self.forest.num_trees == 0 || self.forest.max_depth == 0 {
            return Err(invalid("forest needs at least one tree of depth >= 1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> HrvError {
    HrvError::InvalidConfig(msg.to_string())
}

/// Read a (possibly partial) TOML configuration; missing keys keep defaults.
pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: AnalysisConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}
