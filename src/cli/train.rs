//! `hoopline train`

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::output::{print_item, print_success};
use crate::config::AppConfig;
use crate::data::TrainingFrame;
use crate::ml::ArtifactStore;
use crate::training::train_artifacts;
use crate::tuning::{Task, Tuner};

pub fn run(config: &AppConfig, data: &Path, use_best: bool) -> Result<()> {
    let mut config = config.clone();
    if use_best {
        let tuner = Tuner::new(config.clone());
        match tuner.load_best(Task::Forecast)? {
            Some(best) => {
                info!(?best, "Using persisted best forecast parameters");
                let (model, training) = best.apply(&config.model, &config.training);
                config.model = model;
                config.training = training;
            }
            None => info!("No persisted best parameters, using configured values"),
        }
    }

    let frame = TrainingFrame::from_csv(data)
        .with_context(|| format!("loading training data from {}", data.display()))?;
    let store = ArtifactStore::new(&config.inference.artifact_dir);
    let summary = train_artifacts(&frame, &config, &store).context("training failed")?;

    print_item(&summary)?;
    print_success(&format!(
        "✓ artifacts written to {}",
        store.dir().display()
    ));
    Ok(())
}
