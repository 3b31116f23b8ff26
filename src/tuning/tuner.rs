//! Trial loop: sample, train with pruning, score on the validation split.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use super::halving::{RungDecision, SuccessiveHalving};
use super::search::{SearchSpace, TrialParams};
use crate::config::AppConfig;
use crate::data::TrainingFrame;
use crate::error::{HooplineError, Result};
use crate::evaluation::log_loss;
use crate::ml::objective::sigmoid;
use crate::ml::trainer::evaluate;
use crate::ml::{EpochControl, FeatureScaler, Mlp, Objective, Trainer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Margin distribution, scored by validation Gaussian NLL
    Forecast,
    /// Home-win classifier, scored by validation log-loss
    Classifier,
}

impl Task {
    pub fn objective(&self) -> Objective {
        match self {
            Task::Forecast => Objective::GaussianNll,
            Task::Classifier => Objective::BinaryCrossEntropy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Forecast => "forecast",
            Task::Classifier => "classifier",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Complete,
    Pruned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub number: usize,
    pub params: TrialParams,
    pub state: TrialState,
    /// Final validation loss (complete trials) or last rung value (pruned)
    pub value: Option<f64>,
    pub epochs_run: usize,
    /// Re-evaluation of a previously persisted best configuration
    pub seeded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuneReport {
    pub task: Task,
    pub trials: Vec<TrialRecord>,
    pub best: Option<TrialRecord>,
    pub best_path: Option<PathBuf>,
}

impl TuneReport {
    pub fn count(&self, state: TrialState) -> usize {
        self.trials.iter().filter(|t| t.state == state).count()
    }
}

pub struct Tuner {
    config: AppConfig,
}

impl Tuner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn best_path(&self, task: Task) -> PathBuf {
        self.config
            .tuning
            .output_dir
            .join(format!("best_{}.json", task.as_str()))
    }

    /// Persisted best parameters for `task`, if any.
    pub fn load_best(&self, task: Task) -> Result<Option<TrialParams>> {
        match TrialParams::from_file(self.best_path(task)) {
            Ok(p) => Ok(Some(p)),
            Err(HooplineError::ArtifactNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn run(&self, frame: &TrainingFrame, task: Task) -> Result<TuneReport> {
        let tuning = &self.config.tuning;
        let (train, val) = frame.split(tuning.validation_fraction, tuning.seed)?;
        if train.is_empty() || val.is_empty() {
            return Err(HooplineError::Validation(format!(
                "need at least two rows to tune, got {}",
                frame.len()
            )));
        }

        let scaler = FeatureScaler::fit(&train.feature_names, &train.features)?;
        let xt = scaler.transform_rows(&train.features)?;
        let xv = scaler.transform_rows(&val.features)?;
        let objective = task.objective();
        let yt = train.targets(objective);
        let yv = val.targets(objective);

        let space = SearchSpace::new(&tuning.space, train.len());
        let mut rng = StdRng::seed_from_u64(tuning.seed);
        let mut pruner = SuccessiveHalving::new(tuning.min_resource, tuning.reduction_factor);

        let seed_params = if tuning.fresh { None } else { self.load_best(task)? };
        if seed_params.is_some() {
            info!(task = task.as_str(), "Evaluating persisted best parameters first");
        }

        let mut trials = Vec::with_capacity(tuning.n_trials);
        for number in 0..tuning.n_trials {
            let (params, seeded) = match (&seed_params, number) {
                (Some(p), 0) => (p.clone(), true),
                _ => (space.sample(&mut rng), false),
            };
            let record = self.run_trial(number, params, seeded, objective, &xt, yt, &xv, yv, &mut pruner)?;
            info!(
                task = task.as_str(),
                trial = number,
                state = ?record.state,
                value = record.value,
                epochs = record.epochs_run,
                "Trial finished"
            );
            trials.push(record);
        }

        let best = trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .filter_map(|t| t.value.map(|v| (v, t)))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, t)| t.clone());

        let best_path = match &best {
            Some(b) => {
                let path = self.best_path(task);
                b.params.to_file(&path)?;
                info!(task = task.as_str(), value = b.value, path = %path.display(), "Saved best parameters");
                Some(path)
            }
            None => {
                warn!(task = task.as_str(), "No trial completed; nothing persisted");
                None
            }
        };

        Ok(TuneReport {
            task,
            trials,
            best,
            best_path,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_trial(
        &self,
        number: usize,
        params: TrialParams,
        seeded: bool,
        objective: Objective,
        xt: &[Vec<f64>],
        yt: &[f64],
        xv: &[Vec<f64>],
        yv: &[f64],
        pruner: &mut SuccessiveHalving,
    ) -> Result<TrialRecord> {
        let (model, mut training) = params.apply(&self.config.model, &self.config.training);
        training.seed = self.config.tuning.seed.wrapping_add(number as u64);
        let trainer = Trainer::new(model, training);

        let mut pruned_at: Option<f64> = None;
        let mut hook_error: Option<HooplineError> = None;
        let fitted = trainer.fit_with(xt, yt, objective, |epoch, net| {
            let Some(rung) = pruner.rung_for(epoch) else {
                return EpochControl::Continue;
            };
            match evaluate(net, xv, yv, objective) {
                Ok(value) => match pruner.report(rung, value) {
                    RungDecision::Promote => EpochControl::Continue,
                    RungDecision::Prune => {
                        pruned_at = Some(value);
                        EpochControl::Stop
                    }
                },
                Err(e) => {
                    hook_error = Some(e);
                    EpochControl::Stop
                }
            }
        });

        if let Some(e) = hook_error {
            return Err(e);
        }
        let outcome = match fitted {
            Ok(outcome) => outcome,
            Err(HooplineError::NumericDegeneracy(msg)) => {
                warn!(trial = number, error = %msg, "Trial diverged");
                return Ok(TrialRecord {
                    number,
                    params,
                    state: TrialState::Failed,
                    value: None,
                    epochs_run: 0,
                    seeded,
                });
            }
            Err(e) => return Err(e),
        };

        if let Some(value) = pruned_at {
            return Ok(TrialRecord {
                number,
                params,
                state: TrialState::Pruned,
                value: Some(value),
                epochs_run: outcome.epoch_losses.len(),
                seeded,
            });
        }

        let value = validation_score(&outcome.network, xv, yv, objective)?;
        let state = if value.is_finite() {
            TrialState::Complete
        } else {
            TrialState::Failed
        };
        Ok(TrialRecord {
            number,
            params,
            state,
            value: value.is_finite().then_some(value),
            epochs_run: outcome.epoch_losses.len(),
            seeded,
        })
    }
}

/// Validation NLL for the forecast, log-loss of predicted probabilities for
/// the classifier.
fn validation_score(net: &Mlp, xv: &[Vec<f64>], yv: &[f64], objective: Objective) -> Result<f64> {
    match objective {
        Objective::GaussianNll => evaluate(net, xv, yv, objective),
        Objective::BinaryCrossEntropy => {
            let out = net.forward_rows(xv)?;
            let probs: Vec<f64> = out.iter().map(|z| sigmoid(z[0])).collect();
            log_loss(&probs, yv)
        }
    }
}
