//! Fit the full artifact set from a training frame.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::AppConfig;
use crate::data::TrainingFrame;
use crate::error::{HooplineError, Result};
use crate::evaluation::{brier_score, log_loss};
use crate::ml::artifact::{ArtifactStore, ModelArtifact, ModelRole};
use crate::ml::objective::sigma_from_raw;
use crate::ml::trainer::evaluate;
use crate::ml::{sigmoid, FeatureScaler, FeatureSchema, Objective, Trainer};

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub best_epoch: usize,
    pub best_train_loss: f64,
    pub validation_loss: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainSummary {
    pub train_rows: usize,
    pub validation_rows: usize,
    pub features: usize,
    pub forecast: ModelSummary,
    /// Mean absolute error of mu on the validation split
    pub validation_mae: f64,
    pub mean_sigma: f64,
    pub classifier: Option<ModelSummary>,
    pub classifier_brier: Option<f64>,
}

/// Split, scale, fit and persist. Models train on the training split only.
pub fn train_artifacts(
    frame: &TrainingFrame,
    config: &AppConfig,
    store: &ArtifactStore,
) -> Result<TrainSummary> {
    if frame.len() < 2 {
        return Err(HooplineError::Validation(format!(
            "need at least two training rows, got {}",
            frame.len()
        )));
    }
    let schema = FeatureSchema::new(frame.feature_names.clone())?;
    let (train, val) = frame.split(config.tuning.validation_fraction, config.tuning.seed)?;

    let scaler = FeatureScaler::fit(schema.names(), &train.features)?;
    let xt = scaler.transform_rows(&train.features)?;
    let xv = scaler.transform_rows(&val.features)?;

    let trainer = Trainer::new(config.model.clone(), config.training.clone());

    let objective = Objective::GaussianNll;
    let outcome = trainer.fit(&xt, train.targets(objective), objective)?;
    let val_nll = evaluate(&outcome.network, &xv, val.targets(objective), objective)?;
    let out = outcome.network.forward_rows(&xv)?;
    let (mut abs_err, mut sigma_sum) = (0.0, 0.0);
    for (row, y) in out.iter().zip(&val.margin) {
        abs_err += (row[0] - y).abs();
        sigma_sum += sigma_from_raw(row[1]);
    }
    let n_val = val.len() as f64;
    let forecast = ModelSummary {
        best_epoch: outcome.best_epoch,
        best_train_loss: outcome.best_loss,
        validation_loss: val_nll,
    };

    store.save_schema(&schema)?;
    store.save_scaler(&scaler)?;
    store.save_model(
        &ModelArtifact::from_network(ModelRole::Forecast, &outcome.network, Some(schema.names().to_vec()))?
            .with_metadata(json!({
                "objective": objective.name(),
                "best_epoch": forecast.best_epoch,
                "best_train_loss": forecast.best_train_loss,
                "validation_loss": val_nll,
                "train_rows": train.len(),
            })),
    )?;
    info!(
        best_epoch = forecast.best_epoch,
        train_nll = forecast.best_train_loss,
        val_nll,
        "Forecast model saved"
    );

    let (classifier, classifier_brier) = if config.training.train_classifier {
        let objective = Objective::BinaryCrossEntropy;
        let outcome = trainer.fit(&xt, train.targets(objective), objective)?;
        let logits = outcome.network.forward_rows(&xv)?;
        let probs: Vec<f64> = logits.iter().map(|z| sigmoid(z[0])).collect();
        let val_log_loss = log_loss(&probs, &val.home_win)?;
        let brier = brier_score(&probs, &val.home_win)?;

        let summary = ModelSummary {
            best_epoch: outcome.best_epoch,
            best_train_loss: outcome.best_loss,
            validation_loss: val_log_loss,
        };
        store.save_model(
            &ModelArtifact::from_network(ModelRole::Classifier, &outcome.network, Some(schema.names().to_vec()))?
                .with_metadata(json!({
                    "objective": objective.name(),
                    "best_epoch": summary.best_epoch,
                    "validation_log_loss": val_log_loss,
                    "validation_brier": brier,
                })),
        )?;
        info!(val_log_loss, brier, "Classifier saved");
        (Some(summary), Some(brier))
    } else {
        (None, None)
    };

    Ok(TrainSummary {
        train_rows: train.len(),
        validation_rows: val.len(),
        features: schema.len(),
        forecast,
        validation_mae: abs_err / n_val,
        mean_sigma: sigma_sum / n_val,
        classifier,
        classifier_brier,
    })
}
