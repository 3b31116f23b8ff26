//! Margin network, training loop and model artifacts.
//!
//! Networks are burn modules; training runs under `Autodiff<NdArray>` and
//! scoring runs on the plain `NdArray<f64>` backend.

pub mod artifact;
pub mod dense;
pub mod objective;
pub mod scaler;
pub mod schema;
pub mod trainer;

pub use artifact::{ArtifactStore, Hyperparameters, LoadedModel, ModelArtifact, ModelRole};
pub use dense::{Mlp, ParamMap, Precision, Topology};
pub use objective::{sigma_from_raw, sigmoid, Objective};
pub use scaler::FeatureScaler;
pub use schema::{Alignment, FeatureSchema, FeatureVector, RawFeatures};
pub use trainer::{EpochControl, TrainOutcome, Trainer};
