//! Hyperparameter search space and persisted best parameters.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{ModelConfig, SearchSpaceConfig, TrainingConfig};
use crate::error::{HooplineError, Result};

const DROPOUT_STEP: f64 = 0.05;

/// One sampled configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParams {
    pub hidden: usize,
    pub hidden2: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
}

impl TrialParams {
    /// Overlay onto base configs; everything not searched is kept.
    pub fn apply(&self, model: &ModelConfig, training: &TrainingConfig) -> (ModelConfig, TrainingConfig) {
        (
            ModelConfig {
                hidden: self.hidden,
                hidden2: self.hidden2,
                dropout: self.dropout,
                ..model.clone()
            },
            TrainingConfig {
                learning_rate: self.learning_rate,
                epochs: self.epochs,
                batch_size: self.batch_size,
                ..training.clone()
            },
        )
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HooplineError::ArtifactNotFound(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchSpace {
    config: SearchSpaceConfig,
    batch_sizes: Vec<usize>,
}

impl SearchSpace {
    /// Batch sizes larger than the training set are dropped; if none remain
    /// the whole set is one batch.
    pub fn new(config: &SearchSpaceConfig, train_rows: usize) -> Self {
        let mut batch_sizes: Vec<usize> = config
            .batch_sizes
            .iter()
            .copied()
            .filter(|b| *b > 0 && *b <= train_rows)
            .collect();
        if batch_sizes.is_empty() {
            batch_sizes.push(train_rows.max(1));
        }
        Self {
            config: config.clone(),
            batch_sizes,
        }
    }

    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> TrialParams {
        let c = &self.config;
        let hidden = stepped(rng, c.hidden_min, c.hidden_max, c.hidden_step);
        let hidden2 = stepped(rng, c.hidden2_min.min(hidden), hidden, c.hidden2_step);

        let dropout_steps = (c.dropout_max / DROPOUT_STEP).floor() as usize;
        let dropout = rng.gen_range(0..=dropout_steps) as f64 * DROPOUT_STEP;

        let (lo, hi) = (c.lr_min.ln(), c.lr_max.ln());
        let learning_rate = if hi > lo {
            rng.gen_range(lo..hi).exp().clamp(c.lr_min, c.lr_max)
        } else {
            c.lr_min
        };

        let epochs = rng.gen_range(c.epochs_min..=c.epochs_max.max(c.epochs_min));
        let batch_size = *self.batch_sizes.choose(rng).unwrap_or(&self.batch_sizes[0]);

        TrialParams {
            hidden,
            hidden2,
            dropout,
            learning_rate,
            epochs,
            batch_size,
        }
    }
}

/// Uniform draw from `min, min + step, ...` not exceeding `max`.
fn stepped<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize, step: usize) -> usize {
    let step = step.max(1);
    let max = max.max(min);
    let n = (max - min) / step;
    min + rng.gen_range(0..=n) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn samples_stay_inside_bounds() {
        let cfg = SearchSpaceConfig::default();
        let space = SearchSpace::new(&cfg, 600);
        assert_eq!(space.batch_sizes(), &[256, 512]);

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let p = space.sample(&mut rng);
            assert!(p.hidden >= cfg.hidden_min && p.hidden <= cfg.hidden_max);
            assert_eq!((p.hidden - cfg.hidden_min) % cfg.hidden_step, 0);
            assert!(p.hidden2 <= p.hidden);
            assert!(p.dropout >= 0.0 && p.dropout <= cfg.dropout_max + 1e-12);
            assert!(p.learning_rate >= cfg.lr_min && p.learning_rate <= cfg.lr_max);
            assert!(p.epochs >= cfg.epochs_min && p.epochs <= cfg.epochs_max);
            assert!(p.batch_size <= 600);
        }
    }

    #[test]
    fn tiny_training_set_uses_one_batch() {
        let space = SearchSpace::new(&SearchSpaceConfig::default(), 40);
        assert_eq!(space.batch_sizes(), &[40]);
    }

    #[test]
    fn sampling_is_seeded() {
        let space = SearchSpace::new(&SearchSpaceConfig::default(), 5000);
        let a = space.sample(&mut StdRng::seed_from_u64(9));
        let b = space.sample(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn apply_overrides_only_searched_fields() {
        let p = TrialParams {
            hidden: 64,
            hidden2: 32,
            dropout: 0.1,
            learning_rate: 0.01,
            epochs: 12,
            batch_size: 128,
        };
        let base = TrainingConfig::default();
        let (model, training) = p.apply(&ModelConfig::default(), &base);
        assert_eq!(model.hidden, 64);
        assert_eq!(training.epochs, 12);
        assert_eq!(training.seed, base.seed);
        assert_eq!(training.prefetch_depth, base.prefetch_depth);
    }
}
