//! Dense network with two normalized hidden stages, built on burn modules.
//!
//! Layout:
//! - stage1: linear → batch-norm → relu → dropout
//! - stage2: linear → batch-norm → relu → dropout
//! - head:   linear (2 outputs for the margin forecast, 1 logit for the classifier)
//!
//! `MarginNet` is generic over the backend so the trainer can run it under
//! `Autodiff`. `Mlp` wraps the inference copy on `NdArray<f64>`, where
//! batch-norm uses running statistics and dropout is inactive.
//!
//! Parameters cross the backend boundary as a flat `ParamMap` keyed by the
//! persisted tensor names. Linear weights are stored `[out, in]`.

use burn::module::{Param, RunningState};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::{ElementConversion, TensorData};
use burn_ndarray::NdArray;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::objective::Objective;
use crate::error::{HooplineError, Result};

/// Backend for scoring and evaluation.
pub type InferenceBackend = NdArray<f64>;

/// Parameter and buffer values keyed by tensor name.
pub type ParamMap = BTreeMap<String, Vec<f64>>;

/// Float width of the training backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// f64 end to end.
    #[default]
    Full,
    /// f32 training backend; parameters are widened to f64 on export.
    Mixed,
}

/// Shape of an `Mlp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub input_dim: usize,
    pub hidden: usize,
    pub hidden2: usize,
    pub dropout: f64,
    pub output_dim: usize,
}

/// Name and expected shape of one persisted tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

struct Layer {
    linear: &'static str,
    norm: Option<&'static str>,
    in_dim: usize,
    out_dim: usize,
}

impl Topology {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.hidden == 0 || self.hidden2 == 0 {
            return Err(format!(
                "hidden widths must be > 0 (hidden={}, hidden2={})",
                self.hidden, self.hidden2
            ));
        }
        if self.output_dim == 0 {
            return Err("output_dim must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout {} must be in [0, 1)", self.dropout));
        }
        Ok(())
    }

    fn layers(&self) -> [Layer; 3] {
        [
            Layer { linear: "stage1.linear", norm: Some("stage1.norm"), in_dim: self.input_dim, out_dim: self.hidden },
            Layer { linear: "stage2.linear", norm: Some("stage2.norm"), in_dim: self.hidden, out_dim: self.hidden2 },
            Layer { linear: "head", norm: None, in_dim: self.hidden2, out_dim: self.output_dim },
        ]
    }

    /// Every persisted tensor, trainable or buffer, in artifact order.
    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let mut specs = Vec::with_capacity(14);
        for layer in self.layers() {
            let spec = |suffix: &str, shape: Vec<usize>| ParamSpec {
                name: format!("{}.{suffix}", layer.linear),
                shape,
            };
            specs.push(spec("weight", vec![layer.out_dim, layer.in_dim]));
            specs.push(spec("bias", vec![layer.out_dim]));
            if let Some(norm) = layer.norm {
                for stat in ["gamma", "beta", "running_mean", "running_var"] {
                    specs.push(ParamSpec {
                        name: format!("{norm}.{stat}"),
                        shape: vec![layer.out_dim],
                    });
                }
            }
        }
        specs
    }
}

/// Uniform(-1/sqrt(fan_in), 1/sqrt(fan_in)) for linear layers; identity
/// batch-norm with zero mean and unit variance.
pub fn init_params<R: Rng + ?Sized>(topology: &Topology, rng: &mut R) -> ParamMap {
    let mut params = ParamMap::new();
    for layer in topology.layers() {
        let bound = 1.0 / (layer.in_dim as f64).sqrt();
        let weight = (0..layer.in_dim * layer.out_dim)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let bias = (0..layer.out_dim).map(|_| rng.gen_range(-bound..bound)).collect();
        params.insert(format!("{}.weight", layer.linear), weight);
        params.insert(format!("{}.bias", layer.linear), bias);
        if let Some(norm) = layer.norm {
            params.insert(format!("{norm}.gamma"), vec![1.0; layer.out_dim]);
            params.insert(format!("{norm}.beta"), vec![0.0; layer.out_dim]);
            params.insert(format!("{norm}.running_mean"), vec![0.0; layer.out_dim]);
            params.insert(format!("{norm}.running_var"), vec![1.0; layer.out_dim]);
        }
    }
    params
}

pub(crate) fn tensor1<B: Backend>(values: Vec<f64>, device: &B::Device) -> Tensor<B, 1> {
    let len = values.len();
    Tensor::from_data(TensorData::new(values, [len]).convert::<B::FloatElem>(), device)
}

pub(crate) fn tensor2<B: Backend>(values: Vec<f64>, rows: usize, cols: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values, [rows, cols]).convert::<B::FloatElem>(), device)
}

/// Flat row-major copy of a tensor's values.
pub(crate) fn read_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| HooplineError::Internal(format!("tensor readback failed: {e:?}")))
}

fn lookup(params: &ParamMap, name: &str, len: usize) -> Result<Vec<f64>> {
    let values = params
        .get(name)
        .ok_or_else(|| HooplineError::ArchitectureMismatch(format!("no values for {name}")))?;
    if values.len() != len {
        return Err(HooplineError::ArchitectureMismatch(format!(
            "{name} has {} values, expected {len}",
            values.len()
        )));
    }
    Ok(values.clone())
}

/// One hidden stage: linear → norm → relu → dropout.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    linear: Linear<B>,
    norm: BatchNorm<B, 0>,
    activation: Relu,
    dropout: Dropout,
}

impl<B: Backend> Stage<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(self.linear.forward(x));
        self.dropout.forward(self.activation.forward(x))
    }
}

fn linear_from<B: Backend>(layer: &Layer, params: &ParamMap, device: &B::Device) -> Result<Linear<B>> {
    let (name, in_dim, out_dim) = (layer.linear, layer.in_dim, layer.out_dim);
    let mut linear = LinearConfig::new(in_dim, out_dim).init(device);
    let weight = lookup(params, &format!("{name}.weight"), in_dim * out_dim)?;
    // burn keeps linear weights as [in, out]
    linear.weight = Param::from_tensor(tensor2(weight, out_dim, in_dim, device).transpose());
    let bias = lookup(params, &format!("{name}.bias"), out_dim)?;
    linear.bias = Some(Param::from_tensor(tensor1(bias, device)));
    Ok(linear)
}

fn norm_from<B: Backend>(name: &str, dim: usize, params: &ParamMap, device: &B::Device) -> Result<BatchNorm<B, 0>> {
    let mut norm = BatchNormConfig::new(dim).init(device);
    norm.gamma = Param::from_tensor(tensor1(lookup(params, &format!("{name}.gamma"), dim)?, device));
    norm.beta = Param::from_tensor(tensor1(lookup(params, &format!("{name}.beta"), dim)?, device));
    norm.running_mean = RunningState::new(tensor1(lookup(params, &format!("{name}.running_mean"), dim)?, device));
    norm.running_var = RunningState::new(tensor1(lookup(params, &format!("{name}.running_var"), dim)?, device));
    Ok(norm)
}

fn export_linear<B: Backend>(name: &str, linear: &Linear<B>, params: &mut ParamMap) -> Result<()> {
    params.insert(format!("{name}.weight"), read_values(linear.weight.val().transpose())?);
    if let Some(bias) = &linear.bias {
        params.insert(format!("{name}.bias"), read_values(bias.val())?);
    }
    Ok(())
}

fn export_norm<B: Backend>(name: &str, norm: &BatchNorm<B, 0>, params: &mut ParamMap) -> Result<()> {
    params.insert(format!("{name}.gamma"), read_values(norm.gamma.val())?);
    params.insert(format!("{name}.beta"), read_values(norm.beta.val())?);
    params.insert(format!("{name}.running_mean"), read_values(norm.running_mean.value())?);
    params.insert(format!("{name}.running_var"), read_values(norm.running_var.value())?);
    Ok(())
}

#[derive(Module, Debug)]
pub struct MarginNet<B: Backend> {
    stage1: Stage<B>,
    stage2: Stage<B>,
    head: Linear<B>,
}

impl<B: Backend> MarginNet<B> {
    /// Build from a complete parameter map.
    pub fn from_params(topology: &Topology, params: &ParamMap, device: &B::Device) -> Result<Self> {
        let [l1, l2, head] = topology.layers();
        let stage = |layer: &Layer, norm: &str| -> Result<Stage<B>> {
            Ok(Stage {
                linear: linear_from(layer, params, device)?,
                norm: norm_from(norm, layer.out_dim, params, device)?,
                activation: Relu::new(),
                dropout: DropoutConfig::new(topology.dropout).init(),
            })
        };
        Ok(Self {
            stage1: stage(&l1, "stage1.norm")?,
            stage2: stage(&l2, "stage2.norm")?,
            head: linear_from(&head, params, device)?,
        })
    }

    pub fn params(&self) -> Result<ParamMap> {
        let mut params = ParamMap::new();
        export_linear("stage1.linear", &self.stage1.linear, &mut params)?;
        export_norm("stage1.norm", &self.stage1.norm, &mut params)?;
        export_linear("stage2.linear", &self.stage2.linear, &mut params)?;
        export_norm("stage2.norm", &self.stage2.norm, &mut params)?;
        export_linear("head", &self.head, &mut params)?;
        Ok(params)
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.stage1.forward(x);
        let x = self.stage2.forward(x);
        self.head.forward(x)
    }
}

/// Inference network: a `MarginNet` on `InferenceBackend` plus its shape.
#[derive(Debug, Clone)]
pub struct Mlp {
    pub topology: Topology,
    net: MarginNet<InferenceBackend>,
}

impl Mlp {
    pub fn new<R: Rng + ?Sized>(topology: Topology, rng: &mut R) -> Result<Self> {
        topology.validate().map_err(HooplineError::Validation)?;
        Self::from_params(topology, &init_params(&topology, rng))
    }

    pub fn from_params(topology: Topology, params: &ParamMap) -> Result<Self> {
        topology.validate().map_err(HooplineError::Validation)?;
        let net = MarginNet::from_params(&topology, params, &Default::default())?;
        Ok(Self { topology, net })
    }

    pub fn input_dim(&self) -> usize {
        self.topology.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.topology.output_dim
    }

    fn check_width(&self, len: usize, what: &str) -> Result<()> {
        if len != self.topology.input_dim {
            return Err(HooplineError::SchemaMismatch(format!(
                "{what} length {len} != model input width {}",
                self.topology.input_dim
            )));
        }
        Ok(())
    }

    fn rows_tensor(&self, rows: &[Vec<f64>]) -> Result<Tensor<InferenceBackend, 2>> {
        for row in rows {
            self.check_width(row.len(), "feature row")?;
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Ok(tensor2(flat, rows.len(), self.topology.input_dim, &Default::default()))
    }

    /// Inference forward pass over a batch; one output vector per row.
    pub fn forward_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let out = read_values(self.net.forward(self.rows_tensor(rows)?))?;
        Ok(out
            .chunks(self.topology.output_dim)
            .map(<[f64]>::to_vec)
            .collect())
    }

    /// Inference forward pass for one feature vector.
    pub fn forward_row(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.check_width(input.len(), "feature vector")?;
        if let Some(idx) = input.iter().position(|v| !v.is_finite()) {
            return Err(HooplineError::SchemaMismatch(format!(
                "feature[{idx}] is not a finite number"
            )));
        }
        let out = read_values(self.net.forward(self.rows_tensor(&[input.to_vec()])?))?;
        Ok(out)
    }

    /// Mean objective over a data set.
    pub fn mean_loss(&self, rows: &[Vec<f64>], targets: &[f64], objective: Objective) -> Result<f64> {
        if rows.is_empty() {
            return Err(HooplineError::Validation("no evaluation rows".to_string()));
        }
        if rows.len() != targets.len() {
            return Err(HooplineError::Validation(format!(
                "{} feature rows but {} targets",
                rows.len(),
                targets.len()
            )));
        }
        let x = self.rows_tensor(rows)?;
        let y = tensor2(targets.to_vec(), targets.len(), 1, &Default::default());
        let loss = objective.loss(self.net.forward(x), y);
        Ok(loss.into_scalar().elem::<f64>())
    }

    pub fn params(&self) -> Result<ParamMap> {
        self.net.params()
    }

    /// Every persisted tensor as (name, shape, values), in artifact order.
    pub fn named_tensors(&self) -> Result<Vec<(String, Vec<usize>, Vec<f64>)>> {
        let mut params = self.params()?;
        self.topology
            .param_specs()
            .into_iter()
            .map(|spec| {
                let values = params.remove(&spec.name).ok_or_else(|| {
                    HooplineError::Internal(format!("network did not export {}", spec.name))
                })?;
                Ok((spec.name, spec.shape, values))
            })
            .collect()
    }
}

impl PartialEq for Mlp {
    fn eq(&self, other: &Self) -> bool {
        self.topology == other.topology
            && matches!((self.params(), other.params()), (Ok(a), Ok(b)) if a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TrainBackend = Autodiff<NdArray<f64>>;

    fn topology(dropout: f64) -> Topology {
        Topology {
            input_dim: 3,
            hidden: 4,
            hidden2: 3,
            dropout,
            output_dim: 2,
        }
    }

    fn tiny(dropout: f64) -> Mlp {
        let mut rng = StdRng::seed_from_u64(7);
        Mlp::new(topology(dropout), &mut rng).unwrap()
    }

    fn batch() -> Vec<Vec<f64>> {
        vec![
            vec![0.5, -1.0, 2.0],
            vec![1.5, 0.0, -0.5],
            vec![-0.3, 0.7, 0.1],
            vec![2.0, 1.0, 1.0],
        ]
    }

    #[test]
    fn rejects_wrong_input_width() {
        let net = tiny(0.0);
        let err = net.forward_row(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, HooplineError::SchemaMismatch(_)));

        let err = net.forward_row(&[1.0, f64::NAN, 0.0]).unwrap_err();
        assert!(matches!(err, HooplineError::SchemaMismatch(_)));

        let err = net.forward_rows(&[vec![1.0, 2.0, 3.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, HooplineError::SchemaMismatch(_)));
    }

    #[test]
    fn validates_topology() {
        let bad = Topology {
            hidden: 0,
            ..topology(0.1)
        };
        assert!(bad.validate().is_err());
        let bad = Topology {
            dropout: 1.0,
            ..topology(0.1)
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn eval_forward_is_deterministic_and_ignores_dropout() {
        let net = tiny(0.5);
        let a = net.forward_row(&[0.1, 0.2, 0.3]).unwrap();
        let b = net.forward_row(&[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn batch_rows_match_single_rows() {
        let net = tiny(0.0);
        let rows = batch();
        let out = net.forward_rows(&rows).unwrap();
        assert_eq!(out.len(), rows.len());
        for (row, got) in rows.iter().zip(&out) {
            let single = net.forward_row(row).unwrap();
            for (a, b) in single.iter().zip(got) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn params_export_and_reimport_exactly() {
        let net = tiny(0.0);
        let params = net.params().unwrap();
        assert_eq!(params.len(), 14);
        for spec in net.topology.param_specs() {
            let expected: usize = spec.shape.iter().product();
            assert_eq!(params[&spec.name].len(), expected, "{}", spec.name);
        }

        let rebuilt = Mlp::from_params(net.topology, &params).unwrap();
        assert_eq!(rebuilt, net);
        assert_eq!(
            rebuilt.forward_row(&[0.3, -0.2, 1.0]).unwrap(),
            net.forward_row(&[0.3, -0.2, 1.0]).unwrap()
        );
    }

    #[test]
    fn weights_keep_out_by_in_layout() {
        let mut params = init_params(&topology(0.0), &mut StdRng::seed_from_u64(1));
        // Zero everything, then route input 2 to stage1 unit 0 only.
        for values in params.values_mut() {
            values.iter_mut().for_each(|v| *v = 0.0);
        }
        params.get_mut("stage1.norm.running_var").unwrap().fill(1.0);
        params.get_mut("stage2.norm.running_var").unwrap().fill(1.0);
        params.get_mut("stage1.norm.gamma").unwrap().fill(1.0);
        params.get_mut("stage2.norm.gamma").unwrap().fill(1.0);
        // row 0 of [hidden, input] → output unit 0 reads input column 2
        params.get_mut("stage1.linear.weight").unwrap()[2] = 1.0;
        params.get_mut("stage2.linear.weight").unwrap()[0] = 1.0;
        params.get_mut("head.weight").unwrap()[0] = 1.0;

        let net = Mlp::from_params(topology(0.0), &params).unwrap();
        let out = net.forward_row(&[0.0, 0.0, 4.0]).unwrap();
        let bn = |v: f64| v / (1.0 + 1e-5f64).sqrt();
        assert!((out[0] - bn(bn(4.0))).abs() < 1e-9, "{out:?}");
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn incomplete_params_are_rejected() {
        let mut params = init_params(&topology(0.0), &mut StdRng::seed_from_u64(1));
        params.remove("head.bias");
        let err = Mlp::from_params(topology(0.0), &params).unwrap_err();
        assert!(matches!(err, HooplineError::ArchitectureMismatch(_)));
    }

    #[test]
    fn gradients_reach_every_layer() {
        let device = Default::default();
        let params = init_params(&topology(0.0), &mut StdRng::seed_from_u64(3));
        let net = MarginNet::<TrainBackend>::from_params(&topology(0.0), &params, &device).unwrap();
        let flat: Vec<f64> = batch().into_iter().flatten().collect();
        let x = tensor2::<TrainBackend>(flat, 4, 3, &device);
        let grads = net.forward(x).powf_scalar(2.0).sum().backward();

        for weight in [&net.stage1.linear.weight, &net.stage2.linear.weight, &net.head.weight] {
            let grad = weight.val().grad(&grads).expect("gradient present");
            let values = read_values(grad).unwrap();
            assert!(values.iter().all(|v| v.is_finite()));
            assert!(values.iter().any(|v| *v != 0.0));
        }
    }
}
