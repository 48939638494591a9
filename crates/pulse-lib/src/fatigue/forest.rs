//! Bagged regression trees over `[sdnn, rmssd, pnn50]`.
//!
//! Each tree trains on a bootstrap resample and considers two randomly chosen
//! features per split, picking the threshold that minimises the size-weighted
//! variance of the fatigue label on either side. Training is seeded, so the
//! same history and config always produce the same forest.

use crate::{config::ForestConfig, metrics::DailyRecord};
use anyhow::{Context, Result};
use log::{debug, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const NUM_FEATURES: usize = 3;
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = ["sdnn", "rmssd", "pnn50"];
/// ceil(sqrt(NUM_FEATURES))
const FEATURES_PER_SPLIT: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Sample {
    features: [f64; NUM_FEATURES],
    target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }

    fn count_splits(&self, counts: &mut [usize; NUM_FEATURES]) {
        if let Node::Split {
            feature,
            left,
            right,
            ..
        } = self
        {
            counts[*feature] += 1;
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

struct TreeBuilder<'a> {
    max_depth: usize,
    min_samples: usize,
    rng: &'a mut StdRng,
}

impl TreeBuilder<'_> {
    fn build(&mut self, samples: &[Sample], depth: usize) -> Node {
        if samples.len() <= self.min_samples || depth >= self.max_depth {
            return leaf(samples);
        }
        let Some((feature, threshold)) = self.best_split(samples) else {
            return leaf(samples);
        };
        let (left, right): (Vec<Sample>, Vec<Sample>) = samples
            .iter()
            .partition(|s| s.features[feature] <= threshold);
        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(&left, depth + 1)),
            right: Box::new(self.build(&right, depth + 1)),
        }
    }

    fn best_split(&mut self, samples: &[Sample]) -> Option<(usize, f64)> {
        let mut features: [usize; NUM_FEATURES] = [0, 1, 2];
        features.shuffle(&mut *self.rng);
        let mut best: Option<(usize, f64, f64)> = None;
        for &feature in &features[..FEATURES_PER_SPLIT] {
            let mut thresholds: Vec<f64> = samples.iter().map(|s| s.features[feature]).collect();
            thresholds.sort_by(f64::total_cmp);
            thresholds.dedup();
            for threshold in thresholds {
                let Some(score) = split_score(samples, feature, threshold) else {
                    continue;
                };
                if best.map_or(true, |(_, _, b)| score < b) {
                    best = Some((feature, threshold, score));
                }
            }
        }
        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn leaf(samples: &[Sample]) -> Node {
    let value = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|s| s.target).sum::<f64>() / samples.len() as f64
    };
    Node::Leaf { value }
}

/// Size-weighted target variance of the two sides; `None` if one side is empty.
fn split_score(samples: &[Sample], feature: usize, threshold: f64) -> Option<f64> {
    let (left, right): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .map(|s| (s.features[feature] <= threshold, s.target))
        .fold((Vec::new(), Vec::new()), |(mut l, mut r), (is_left, t)| {
            if is_left {
                l.push(t);
            } else {
                r.push(t);
            }
            (l, r)
        });
    if left.is_empty() || right.is_empty() {
        return None;
    }
    let total = samples.len() as f64;
    Some((left.len() as f64 * variance(&left) + right.len() as f64 * variance(&right)) / total)
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<Node>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Train on every day with a confirmed label, replacing earlier trees.
    /// Returns the number of training samples used.
    pub fn train(&mut self, history: &[DailyRecord]) -> usize {
        let samples: Vec<Sample> = history
            .iter()
            .filter(|r| r.has_confirmed_fatigue())
            .map(|r| Sample {
                features: r.features(),
                target: r.fatigue_level as f64,
            })
            .collect();
        self.trees.clear();
        if samples.is_empty() {
            warn!("no labelled days to train on; forest left empty");
            return 0;
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        for _ in 0..self.config.num_trees {
            let bootstrap: Vec<Sample> = (0..samples.len())
                .map(|_| samples[rng.gen_range(0..samples.len())])
                .collect();
            let mut tree_rng = StdRng::seed_from_u64(rng.gen());
            let mut builder = TreeBuilder {
                max_depth: self.config.max_depth,
                min_samples: self.config.min_samples,
                rng: &mut tree_rng,
            };
            self.trees.push(builder.build(&bootstrap, 0));
        }
        debug!(
            "trained {} trees on {} labelled days",
            self.trees.len(),
            samples.len()
        );
        samples.len()
    }

    /// Mean of all tree predictions; `None` before training.
    pub fn predict(&self, features: [f64; NUM_FEATURES]) -> Option<f64> {
        if self.trees.is_empty() {
            return None;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(&features)).sum();
        Some(sum / self.trees.len() as f64)
    }

    /// Share of splits made on each feature, summing to 1. Uniform when the
    /// forest has no splits at all.
    pub fn feature_importance(&self) -> [f64; NUM_FEATURES] {
        let mut counts = [0usize; NUM_FEATURES];
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        let total: usize = counts.iter().sum();
        if total == 0 {
            return [1.0 / NUM_FEATURES as f64; NUM_FEATURES];
        }
        counts.map(|c| c as f64 / total as f64)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self).context("serializing forest")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing forest {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::synthetic_history;

    /// Three well separated clusters; every feature alone splits them.
    fn clustered_history() -> Vec<DailyRecord> {
        let mut history = Vec::new();
        for level in [1u8, 3, 5] {
            let l = level as f64;
            for i in 0..6 {
                let jitter = i as f64 * 0.3;
                history.push(DailyRecord {
                    timestamp_ms: history.len() as i64,
                    sdnn: 60.0 - 8.0 * l + jitter,
                    rmssd: 55.0 - 8.0 * l + jitter,
                    pnn50: 30.0 - 5.0 * l + jitter,
                    heart_rate: 65.0,
                    fatigue_level: level,
                    ..Default::default()
                });
            }
        }
        history
    }

    #[test]
    fn learns_separated_clusters() {
        let mut forest = RandomForest::new(ForestConfig::default());
        assert_eq!(forest.train(&clustered_history()), 18);
        assert_eq!(forest.num_trees(), 50);
        for level in [1.0, 3.0, 5.0] {
            let features = [60.0 - 8.0 * level, 55.0 - 8.0 * level, 30.0 - 5.0 * level];
            let predicted = forest.predict(features).unwrap();
            assert!((predicted - level).abs() < 0.5, "level {level}: {predicted}");
        }
    }

    #[test]
    fn training_is_deterministic_per_seed() {
        let history = synthetic_history(40, 5);
        let mut a = RandomForest::new(ForestConfig::default());
        let mut b = RandomForest::new(ForestConfig::default());
        a.train(&history);
        b.train(&history);
        assert_eq!(a, b);
        let query = [38.0, 30.0, 12.0];
        assert_eq!(a.predict(query), b.predict(query));
        let p = a.predict(query).unwrap();
        assert!((1.0..=5.0).contains(&p));
    }

    #[test]
    fn untrained_forest_predicts_nothing() {
        let mut forest = RandomForest::new(ForestConfig::default());
        assert_eq!(forest.predict([40.0, 30.0, 10.0]), None);
        let unlabelled = vec![DailyRecord::default(); 4];
        assert_eq!(forest.train(&unlabelled), 0);
        assert!(!forest.is_trained());
        assert_eq!(forest.feature_importance(), [1.0 / 3.0; 3]);
    }

    #[test]
    fn importance_sums_to_one() {
        let mut forest = RandomForest::new(ForestConfig::default());
        forest.train(&clustered_history());
        let importance = forest.feature_importance();
        assert!((importance.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(importance.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn constant_labels_predict_that_label() {
        let history: Vec<DailyRecord> = synthetic_history(15, 9)
            .into_iter()
            .map(|r| DailyRecord {
                fatigue_level: 2,
                ..r
            })
            .collect();
        let mut forest = RandomForest::new(ForestConfig {
            num_trees: 5,
            ..Default::default()
        });
        forest.train(&history);
        assert_eq!(forest.predict([10.0, 90.0, 1.0]), Some(2.0));
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut forest = RandomForest::new(ForestConfig {
            num_trees: 8,
            seed: 3,
            ..Default::default()
        });
        forest.train(&synthetic_history(30, 2));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forest.json");
        forest.save(&path).unwrap();
        let loaded = RandomForest::load(&path).unwrap();
        assert_eq!(loaded, forest);
        assert_eq!(loaded.config().num_trees, 8);
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forest.json");
        fs::write(&path, "{not json").unwrap();
        let err = RandomForest::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing forest"));
        assert!(RandomForest::load(&dir.path().join("missing.json")).is_err());
    }
}
