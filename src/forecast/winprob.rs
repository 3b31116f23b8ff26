//! Home-win probability, from a trained classifier or from the margin
//! distribution. The source is decided once when the artifacts are loaded.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::distribution::ForecastDistribution;
use crate::error::{HooplineError, Result};
use crate::ml::artifact::{ArtifactStore, ModelRole};
use crate::ml::objective::sigmoid;
use crate::ml::Mlp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbSource {
    Classifier,
    Analytic,
}

impl ProbSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbSource::Classifier => "classifier",
            ProbSource::Analytic => "analytic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinProbability {
    pub value: f64,
    pub source: ProbSource,
}

#[derive(Debug, Clone)]
pub enum WinProbSource {
    Classifier(Mlp),
    /// Φ(mu / sigma)
    Analytic,
}

impl WinProbSource {
    /// Resolve from the store. A missing classifier falls back to the
    /// analytic path unless `require_classifier` is set.
    pub fn resolve(
        store: &ArtifactStore,
        default_input_dim: usize,
        require_classifier: bool,
    ) -> Result<Self> {
        match store.load_model(ModelRole::Classifier, default_input_dim) {
            Ok(loaded) => {
                info!("Win probability from classifier");
                Ok(WinProbSource::Classifier(loaded.network))
            }
            Err(HooplineError::ArtifactNotFound(path)) if require_classifier => {
                Err(HooplineError::MissingArtifact(format!(
                    "classifier required but {} does not exist",
                    path.display()
                )))
            }
            Err(HooplineError::ArtifactNotFound(_)) => {
                info!("No classifier artifact, win probability from forecast distribution");
                Ok(WinProbSource::Analytic)
            }
            Err(e) if require_classifier => Err(e),
            Err(e) => {
                warn!(error = %e, "Classifier artifact unusable, using forecast distribution");
                Ok(WinProbSource::Analytic)
            }
        }
    }

    pub fn kind(&self) -> ProbSource {
        match self {
            WinProbSource::Classifier(_) => ProbSource::Classifier,
            WinProbSource::Analytic => ProbSource::Analytic,
        }
    }

    pub fn input_dim(&self) -> Option<usize> {
        match self {
            WinProbSource::Classifier(net) => Some(net.input_dim()),
            WinProbSource::Analytic => None,
        }
    }

    pub fn win_probability(
        &self,
        features: &[f64],
        forecast: &ForecastDistribution,
    ) -> Result<WinProbability> {
        let value = match self {
            WinProbSource::Classifier(net) => {
                let logit = net.forward_row(features)?;
                sigmoid(logit[0])
            }
            WinProbSource::Analytic => forecast.home_win_prob(),
        };
        if !(0.0..=1.0).contains(&value) {
            return Err(HooplineError::NumericDegeneracy(format!(
                "win probability {value} outside [0, 1]"
            )));
        }
        Ok(WinProbability {
            value,
            source: self.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytic_path_uses_distribution() {
        let dist = ForecastDistribution { mu: 0.0, sigma: 10.0 };
        let p = WinProbSource::Analytic.win_probability(&[], &dist).unwrap();
        assert!((p.value - 0.5).abs() < 1e-7);
        assert_eq!(p.source, ProbSource::Analytic);
    }

    #[test]
    fn missing_classifier_respects_requirement() {
        let store = ArtifactStore::new("/no/such/artifacts");
        assert!(matches!(
            WinProbSource::resolve(&store, 4, false).unwrap(),
            WinProbSource::Analytic
        ));
        assert!(matches!(
            WinProbSource::resolve(&store, 4, true),
            Err(HooplineError::MissingArtifact(_))
        ));
    }
}
