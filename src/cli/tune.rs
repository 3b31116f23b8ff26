//! `hoopline tune`

use anyhow::{Context, Result};
use std::path::Path;

use super::output::{print_kv, print_success, print_warn};
use crate::config::AppConfig;
use crate::data::TrainingFrame;
use crate::tuning::{Task, TrialState, Tuner};

pub fn run(config: AppConfig, data: &Path, task: Task) -> Result<()> {
    let frame = TrainingFrame::from_csv(data)
        .with_context(|| format!("loading training data from {}", data.display()))?;
    let report = Tuner::new(config).run(&frame, task).context("tuning failed")?;

    print_kv("task", task.as_str());
    print_kv("trials", &report.trials.len().to_string());
    print_kv("complete", &report.count(TrialState::Complete).to_string());
    print_kv("pruned", &report.count(TrialState::Pruned).to_string());
    print_kv("failed", &report.count(TrialState::Failed).to_string());

    match (&report.best, &report.best_path) {
        (Some(best), Some(path)) => {
            print_kv("best value", &format!("{:.5}", best.value.unwrap_or(f64::NAN)));
            print_kv("best params", &serde_json::to_string(&best.params)?);
            print_success(&format!("✓ saved to {}", path.display()));
        }
        _ => print_warn("no trial completed"),
    }
    Ok(())
}
