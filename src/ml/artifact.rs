//! Model artifacts and the on-disk artifact directory.
//!
//! An artifact is a JSON document bundling named weight tensors with the
//! feature order and the hyperparameters needed to rebuild the network.
//! Older artifacts may be a bare `{name: tensor}` map with neither; those are
//! rebuilt with a caller-supplied input width and default hidden sizes.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::dense::{init_params, Mlp, Topology};
use super::objective::Objective;
use super::scaler::FeatureScaler;
use super::schema::FeatureSchema;
use crate::error::{HooplineError, Result};

pub const FORMAT_VERSION: u32 = 1;

const FORECAST_FILE: &str = "forecast.json";
const CLASSIFIER_FILE: &str = "classifier.json";
const FEATURE_ORDER_FILE: &str = "feature_order.json";
const SCALER_FILE: &str = "scaler.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Margin distribution (mu, raw sigma)
    Forecast,
    /// Home-win logit
    Classifier,
}

impl ModelRole {
    pub fn objective(&self) -> Objective {
        match self {
            ModelRole::Forecast => Objective::GaussianNll,
            ModelRole::Classifier => Objective::BinaryCrossEntropy,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ModelRole::Forecast => FORECAST_FILE,
            ModelRole::Classifier => CLASSIFIER_FILE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub input_dim: Option<usize>,
    pub hidden: usize,
    /// Defaults to half of `hidden` when absent
    pub hidden2: Option<usize>,
    pub dropout: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            input_dim: None,
            hidden: 256,
            hidden2: None,
            dropout: 0.3,
        }
    }
}

impl Hyperparameters {
    pub fn from_topology(t: &Topology) -> Self {
        Self {
            input_dim: Some(t.input_dim),
            hidden: t.hidden,
            hidden2: Some(t.hidden2),
            dropout: t.dropout,
        }
    }

    fn topology(&self, input_dim: usize, output_dim: usize) -> Topology {
        Topology {
            input_dim,
            hidden: self.hidden,
            hidden2: self.hidden2.unwrap_or(self.hidden / 2),
            dropout: self.dropout,
            output_dim,
        }
    }
}

/// Serialized model bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub role: ModelRole,
    #[serde(default)]
    pub feature_order: Option<Vec<String>>,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    pub weights: BTreeMap<String, Tensor>,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactFile {
    Bundle(ModelArtifact),
    Legacy(BTreeMap<String, Tensor>),
}

/// A network rebuilt from an artifact.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub role: ModelRole,
    pub network: Mlp,
    pub feature_order: Option<Vec<String>>,
    pub hyperparameters: Hyperparameters,
    /// Parameter names the artifact did not provide
    pub missing: Vec<String>,
    /// Artifact entries with no matching parameter
    pub unexpected: Vec<String>,
}

impl ModelArtifact {
    pub fn from_network(role: ModelRole, network: &Mlp, feature_order: Option<Vec<String>>) -> Result<Self> {
        let weights = network
            .named_tensors()?
            .into_iter()
            .map(|(name, shape, values)| (name, Tensor { shape, values }))
            .collect();
        Ok(Self {
            format_version: FORMAT_VERSION,
            role,
            feature_order,
            hyperparameters: Hyperparameters::from_topology(&network.topology),
            weights,
            trained_at: Some(Utc::now()),
            metadata: serde_json::Value::Null,
        })
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string(self)?)?;
        debug!(path = %path.display(), role = ?self.role, tensors = self.weights.len(), "Saved model artifact");
        Ok(())
    }

    /// Read an artifact file, accepting the legacy bare-weights layout.
    pub fn read<P: AsRef<Path>>(path: P, role: ModelRole) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HooplineError::ArtifactNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<ArtifactFile>(&content)? {
            ArtifactFile::Bundle(artifact) => Ok(artifact),
            ArtifactFile::Legacy(weights) => {
                warn!(path = %path.display(), "Legacy artifact without feature order or hyperparameters");
                Ok(Self {
                    format_version: 0,
                    role,
                    feature_order: None,
                    hyperparameters: Hyperparameters::default(),
                    weights,
                    trained_at: None,
                    metadata: serde_json::Value::Null,
                })
            }
        }
    }

    /// Rebuild the network.
    ///
    /// Input width comes from the recorded feature order, then the recorded
    /// `input_dim`, then `default_input_dim`. Parameter names are matched
    /// leniently; a present tensor with the wrong shape is an error.
    pub fn build(&self, role: ModelRole, default_input_dim: usize) -> Result<LoadedModel> {
        if self.role != role {
            return Err(HooplineError::ArchitectureMismatch(format!(
                "artifact role {:?}, expected {:?}",
                self.role, role
            )));
        }
        let hp = &self.hyperparameters;
        let input_dim = match (&self.feature_order, hp.input_dim) {
            (Some(order), Some(dim)) if order.len() != dim => {
                return Err(HooplineError::ArchitectureMismatch(format!(
                    "feature order has {} names but input_dim is {dim}",
                    order.len()
                )));
            }
            (Some(order), _) => order.len(),
            (None, Some(dim)) => dim,
            (None, None) => default_input_dim,
        };
        let topology = hp.topology(input_dim, role.objective().output_dim());

        topology.validate().map_err(HooplineError::ArchitectureMismatch)?;

        // Parameters the artifact lacks keep their seed-0 initial values.
        let specs = topology.param_specs();
        let mut params = init_params(&topology, &mut StdRng::seed_from_u64(0));
        let mut missing = Vec::new();
        let mut loaded = 0usize;
        for spec in &specs {
            let Some(tensor) = self.weights.get(&spec.name) else {
                missing.push(spec.name.clone());
                continue;
            };
            let expected: usize = spec.shape.iter().product();
            if tensor.shape != spec.shape || tensor.values.len() != expected {
                return Err(HooplineError::ArchitectureMismatch(format!(
                    "{} has shape {:?} ({} values), model expects {:?}",
                    spec.name,
                    tensor.shape,
                    tensor.values.len(),
                    spec.shape
                )));
            }
            if tensor.values.iter().any(|v| !v.is_finite()) {
                return Err(HooplineError::ArchitectureMismatch(format!(
                    "{} contains non-finite values",
                    spec.name
                )));
            }
            params.insert(spec.name.clone(), tensor.values.clone());
            loaded += 1;
        }
        if loaded == 0 {
            return Err(HooplineError::ArchitectureMismatch(
                "no artifact tensor matches the model's parameter names".to_string(),
            ));
        }

        let unexpected: Vec<String> = self
            .weights
            .keys()
            .filter(|k| !specs.iter().any(|spec| &spec.name == *k))
            .cloned()
            .collect();
        let network = Mlp::from_params(topology, &params)?;

        if !missing.is_empty() {
            warn!(role = ?role, missing = %missing.join(","), "Artifact lacks parameters; keeping initial values");
        }
        if !unexpected.is_empty() {
            debug!(role = ?role, unexpected = %unexpected.join(","), "Ignoring unknown artifact tensors");
        }

        Ok(LoadedModel {
            role,
            network,
            feature_order: self.feature_order.clone(),
            hyperparameters: hp.clone(),
            missing,
            unexpected,
        })
    }
}

/// Directory of artifacts produced by one training run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, role: ModelRole) -> PathBuf {
        self.dir.join(role.file_name())
    }

    pub fn feature_order_path(&self) -> PathBuf {
        self.dir.join(FEATURE_ORDER_FILE)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.dir.join(SCALER_FILE)
    }

    pub fn save_model(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.model_path(artifact.role);
        artifact.save(&path)?;
        Ok(path)
    }

    pub fn load_model(&self, role: ModelRole, default_input_dim: usize) -> Result<LoadedModel> {
        let path = self.model_path(role);
        let loaded = ModelArtifact::read(&path, role)?.build(role, default_input_dim)?;
        info!(
            path = %path.display(),
            input_dim = loaded.network.input_dim(),
            missing = loaded.missing.len(),
            "Loaded model artifact"
        );
        Ok(loaded)
    }

    pub fn save_schema(&self, schema: &FeatureSchema) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        schema.to_file(self.feature_order_path())
    }

    pub fn load_schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::from_file(self.feature_order_path())
    }

    pub fn save_scaler(&self, scaler: &FeatureScaler) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        scaler.to_file(self.scaler_path())
    }

    pub fn load_scaler(&self) -> Result<FeatureScaler> {
        FeatureScaler::from_file(self.scaler_path())
    }
}
