//! Distributional margin forecast and derived win probability.

pub mod distribution;
pub mod predictor;
pub mod winprob;

pub use distribution::{normal_cdf, ForecastDistribution};
pub use predictor::{BatchReport, ErrorSummary, GameForecast, GameInput, Predictor, RowFailure};
pub use winprob::{ProbSource, WinProbSource, WinProbability};
