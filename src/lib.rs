pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod edge;
pub mod error;
pub mod evaluation;
pub mod forecast;
pub mod ml;
pub mod training;
pub mod tuning;

pub use config::AppConfig;
pub use context::RunContext;
pub use edge::{compute_edge, rank_by_ev, EdgeRecord, MarketLine, PickSide};
pub use error::{ErrorKind, HooplineError, Result};
pub use forecast::{BatchReport, ForecastDistribution, GameForecast, GameInput, Predictor};
pub use ml::{ArtifactStore, FeatureSchema, ModelArtifact, ModelRole};
