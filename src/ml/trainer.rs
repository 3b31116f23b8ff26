//! Training Loop
//!
//! Epoch-based mini-batch training of a `MarginNet` under burn's `Autodiff`
//! backend with Adam. Batches are assembled by a prefetch thread and handed
//! to the training loop through a bounded channel; the loop itself is
//! single-threaded and owns the module.
//!
//! The retained network is the snapshot from the epoch with the lowest
//! training loss.

use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use burn_ndarray::NdArray;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::dense::{init_params, tensor2, MarginNet, Mlp, ParamMap, Precision, Topology};
use super::objective::Objective;
use crate::config::{ModelConfig, TrainingConfig};
use crate::error::{HooplineError, Result};

type FullBackend = Autodiff<NdArray<f64>>;
type MixedBackend = Autodiff<NdArray<f32>>;

const ADAM_EPSILON: f32 = 1e-8;

/// Returned by the per-epoch hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochControl {
    Continue,
    Stop,
}

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Network snapshot from the best training-loss epoch
    pub network: Mlp,
    /// 1-based epoch of the snapshot
    pub best_epoch: usize,
    pub best_loss: f64,
    pub epoch_losses: Vec<f64>,
    pub stopped_early: bool,
}

/// Row-major mini-batch, built off the training thread.
struct Batch {
    rows: usize,
    cols: usize,
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Batch {
    fn assemble(x: &[Vec<f64>], y: &[f64], rows: &[usize]) -> Self {
        let cols = x[rows[0]].len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        let mut targets = Vec::with_capacity(rows.len());
        for r in rows {
            data.extend_from_slice(&x[*r]);
            targets.push(y[*r]);
        }
        Self {
            rows: rows.len(),
            cols,
            x: data,
            y: targets,
        }
    }

    fn tensors<B: Backend>(self, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        (
            tensor2(self.x, self.rows, self.cols, device),
            tensor2(self.y, self.rows, 1, device),
        )
    }
}

pub struct Trainer {
    model: ModelConfig,
    training: TrainingConfig,
}

impl Trainer {
    pub fn new(model: ModelConfig, training: TrainingConfig) -> Self {
        Self { model, training }
    }

    pub fn topology(&self, input_dim: usize, objective: Objective) -> Topology {
        Topology {
            input_dim,
            hidden: self.model.hidden,
            hidden2: self.model.hidden2,
            dropout: self.model.dropout,
            output_dim: objective.output_dim(),
        }
    }

    pub fn fit(&self, x: &[Vec<f64>], y: &[f64], objective: Objective) -> Result<TrainOutcome> {
        self.fit_with(x, y, objective, |_, _| EpochControl::Continue)
    }

    /// Train, calling `on_epoch(epoch, network)` after each epoch (1-based).
    pub fn fit_with<F>(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        objective: Objective,
        on_epoch: F,
    ) -> Result<TrainOutcome>
    where
        F: FnMut(usize, &Mlp) -> EpochControl,
    {
        if x.is_empty() {
            return Err(HooplineError::Validation("no training rows".to_string()));
        }
        if x.len() != y.len() {
            return Err(HooplineError::Validation(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let input_dim = x[0].len();
        if let Some(idx) = x.iter().position(|r| r.len() != input_dim) {
            return Err(HooplineError::SchemaMismatch(format!(
                "training row {idx} has {} features, expected {input_dim}",
                x[idx].len()
            )));
        }

        let topology = self.topology(input_dim, objective);
        topology.validate().map_err(HooplineError::Validation)?;
        let mut rng = StdRng::seed_from_u64(self.training.seed);
        let init = init_params(&topology, &mut rng);

        match self.training.precision {
            Precision::Full => self.fit_on::<FullBackend, F>(topology, init, rng, x, y, objective, on_epoch),
            Precision::Mixed => self.fit_on::<MixedBackend, F>(topology, init, rng, x, y, objective, on_epoch),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fit_on<B, F>(
        &self,
        topology: Topology,
        init: ParamMap,
        mut rng: StdRng,
        x: &[Vec<f64>],
        y: &[f64],
        objective: Objective,
        mut on_epoch: F,
    ) -> Result<TrainOutcome>
    where
        B: AutodiffBackend,
        F: FnMut(usize, &Mlp) -> EpochControl,
    {
        let device = B::Device::default();
        // Dropout masks draw from the backend generator.
        B::seed(self.training.seed);
        let mut net = MarginNet::<B>::from_params(&topology, &init, &device)?;
        let mut optim = AdamConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .init::<B, MarginNet<B>>();
        let batch_size = self.training.batch_size.max(1);

        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut epoch_losses = Vec::with_capacity(self.training.epochs);
        let mut best: Option<(usize, f64, Mlp)> = None;
        let mut stopped_early = false;

        for epoch in 1..=self.training.epochs {
            order.shuffle(&mut rng);
            let (next, loss) = self.run_epoch(net, &mut optim, x, y, &order, batch_size, objective, &device);
            net = next;
            if !loss.is_finite() {
                return Err(HooplineError::NumericDegeneracy(format!(
                    "non-finite {} at epoch {epoch}",
                    objective.name()
                )));
            }
            epoch_losses.push(loss);
            debug!(epoch, loss, objective = objective.name(), "epoch complete");

            // Snapshots are exported values; running statistics keep moving on `net`.
            let snapshot = Mlp::from_params(topology, &net.params()?)?;
            if best.as_ref().map_or(true, |(_, b, _)| loss < *b) {
                best = Some((epoch, loss, snapshot.clone()));
            }
            if on_epoch(epoch, &snapshot) == EpochControl::Stop {
                stopped_early = epoch < self.training.epochs;
                break;
            }
        }

        let (best_epoch, best_loss, network) = match best {
            Some(b) => b,
            None => (0, f64::INFINITY, Mlp::from_params(topology, &init)?),
        };

        info!(
            objective = objective.name(),
            rows = x.len(),
            epochs = epoch_losses.len(),
            best_epoch,
            best_loss,
            "Training finished"
        );

        Ok(TrainOutcome {
            network,
            best_epoch,
            best_loss,
            epoch_losses,
            stopped_early,
        })
    }

    /// One pass over `order`; returns the updated module and the mean batch loss.
    #[allow(clippy::too_many_arguments)]
    fn run_epoch<B, O>(
        &self,
        net: MarginNet<B>,
        optim: &mut O,
        x: &[Vec<f64>],
        y: &[f64],
        order: &[usize],
        batch_size: usize,
        objective: Objective,
        device: &B::Device,
    ) -> (MarginNet<B>, f64)
    where
        B: AutodiffBackend,
        O: Optimizer<MarginNet<B>, B>,
    {
        let lr = self.training.learning_rate;
        let mut total = 0.0;
        let mut batches = 0usize;

        let mut train_step = |net: MarginNet<B>, batch: Batch| -> MarginNet<B> {
            let (bx, by) = batch.tensors::<B>(device);
            let loss = objective.loss(net.forward(bx), by);
            total += loss.clone().into_scalar().elem::<f64>();
            batches += 1;
            let grads = GradientsParams::from_grads(loss.backward(), &net);
            optim.step(lr, net, grads)
        };

        let net = if self.training.prefetch_depth == 0 {
            let mut net = net;
            for chunk in order.chunks(batch_size) {
                net = train_step(net, Batch::assemble(x, y, chunk));
            }
            net
        } else {
            let (tx, mut rx) = mpsc::channel::<Batch>(self.training.prefetch_depth);
            std::thread::scope(|s| {
                s.spawn(move || {
                    for chunk in order.chunks(batch_size) {
                        if tx.blocking_send(Batch::assemble(x, y, chunk)).is_err() {
                            break;
                        }
                    }
                });
                let mut net = net;
                while let Some(batch) = rx.blocking_recv() {
                    net = train_step(net, batch);
                }
                net
            })
        };

        let mean = if batches == 0 {
            0.0
        } else {
            total / batches as f64
        };
        (net, mean)
    }
}

/// Mean objective of `net` (inference mode) over a data set.
pub fn evaluate(net: &Mlp, x: &[Vec<f64>], y: &[f64], objective: Objective) -> Result<f64> {
    net.mean_loss(x, y, objective)
}
