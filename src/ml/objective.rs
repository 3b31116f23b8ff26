//! Training objectives and the sigma output transform.
//!
//! The scale transform lives only here: `sigma_from_raw` for scalar
//! inference and `sigma_tensor` for the differentiable training loss compute
//! the same clamp(softplus(raw) + 1e-3, 0.5, 30.0).

use burn::prelude::*;
use serde::{Deserialize, Serialize};

pub const SIGMA_FLOOR_EPS: f64 = 1e-3;
pub const SIGMA_MIN: f64 = 0.5;
pub const SIGMA_MAX: f64 = 30.0;

/// 0.5 * ln(2π)
const HALF_LN_2PI: f64 = 0.918_938_533_204_672_8;

/// Numerically-stable softplus: ln(1 + e^x).
pub fn softplus(x: f64) -> f64 {
    if x > 30.0 {
        x
    } else if x < -30.0 {
        x.exp()
    } else {
        x.max(0.0) + (-x.abs()).exp().ln_1p()
    }
}

/// Numerically-stable sigmoid.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// sigma = clamp(softplus(raw) + 1e-3, 0.5, 30.0)
pub fn sigma_from_raw(raw: f64) -> f64 {
    (softplus(raw) + SIGMA_FLOOR_EPS).clamp(SIGMA_MIN, SIGMA_MAX)
}

/// max(x, 0) + ln(1 + e^-|x|), elementwise.
fn softplus_tensor<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_min(0.0) + x.abs().neg().exp().add_scalar(1.0).log()
}

/// Tensor form of `sigma_from_raw`; the clamp passes no gradient where active.
pub fn sigma_tensor<B: Backend, const D: usize>(raw: Tensor<B, D>) -> Tensor<B, D> {
    softplus_tensor(raw)
        .add_scalar(SIGMA_FLOOR_EPS)
        .clamp(SIGMA_MIN, SIGMA_MAX)
}

/// Which head/loss pair a network is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Two outputs `[mu, raw_sigma]`, Gaussian NLL on the margin.
    GaussianNll,
    /// One logit, BCE on the home-win label.
    BinaryCrossEntropy,
}

impl Objective {
    pub fn output_dim(&self) -> usize {
        match self {
            Objective::GaussianNll => 2,
            Objective::BinaryCrossEntropy => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Objective::GaussianNll => "gaussian_nll",
            Objective::BinaryCrossEntropy => "log_loss",
        }
    }

    /// Mean loss over the batch. `out` is `[n, output_dim]`, `targets` is `[n, 1]`.
    pub fn loss<B: Backend>(&self, out: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let [n, _] = out.dims();
        match self {
            Objective::GaussianNll => {
                let mu = out.clone().slice([0..n, 0..1]);
                let sigma = sigma_tensor(out.slice([0..n, 1..2]));
                let z = (targets - mu) / sigma.clone();
                (z.powf_scalar(2.0).mul_scalar(0.5) + sigma.log())
                    .add_scalar(HALF_LN_2PI)
                    .mean()
            }
            Objective::BinaryCrossEntropy => {
                let logit = out.slice([0..n, 0..1]);
                (logit.clone().clamp_min(0.0) - logit.clone() * targets
                    + logit.abs().neg().exp().add_scalar(1.0).log())
                .mean()
            }
        }
    }
}
