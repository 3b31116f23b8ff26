//! `hoopline predict`

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;

use super::output::{print_item, print_items, print_success, print_warn, OutputMode, PickRow};
use crate::config::AppConfig;
use crate::context::RunContext;
use crate::data::{export_csv, export_json, ResultRow};
use crate::edge::{rank_by_ev, Rankable};
use crate::forecast::{GameForecast, Predictor};
use crate::ml::ArtifactStore;

pub fn run(
    config: &AppConfig,
    games_path: &Path,
    out: Option<&Path>,
    json: bool,
    as_of: Option<NaiveDate>,
) -> Result<()> {
    let ctx = as_of.map(RunContext::new).unwrap_or_else(RunContext::today);

    let content = std::fs::read_to_string(games_path)
        .with_context(|| format!("reading games from {}", games_path.display()))?;
    // Only the array shape is checked here; each game is parsed as it is scored.
    let games: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("parsing games from {}", games_path.display()))?;

    let store = ArtifactStore::new(&config.inference.artifact_dir);
    let predictor = Predictor::from_store(&store, &config.inference)
        .with_context(|| format!("loading artifacts from {}", store.dir().display()))?;

    let report = predictor.score_values(&ctx, &games);

    // Priced games in EV order, then everything else in input order.
    let mut ordered: Vec<&GameForecast> = rank_by_ev(&report.rows);
    ordered.extend(report.rows.iter().filter(|r| r.rank_key().is_none()));

    let results: Vec<ResultRow> = ordered.iter().map(|g| ResultRow::from(*g)).collect();
    if let Some(path) = out {
        let written = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => export_json(path, &results),
            _ => export_csv(path, &results),
        };
        written.with_context(|| format!("writing results to {}", path.display()))?;
    }

    match OutputMode::from_json_flag(json) {
        OutputMode::Json => print_item(&results)?,
        OutputMode::Table => {
            let rows: Vec<PickRow> = ordered.iter().map(|g| PickRow::from(*g)).collect();
            print_items(&rows, OutputMode::Table)?;
        }
    }

    let priced = report
        .rows
        .iter()
        .filter(|r| r.edge.as_ref().is_some_and(|e| e.is_priced()))
        .count();
    if !json {
        print_success(&format!("✓ {} games scored, {} priced", report.rows.len(), priced));
    }

    for failure in &report.failures {
        print_warn(&format!(
            "✗ {} not scored ({}): {}",
            failure.game_id, failure.kind, failure.message
        ));
    }
    if !report.errors.is_empty() {
        let summary: Vec<String> = report
            .errors
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect();
        print_warn(&format!("issues: {}", summary.join(", ")));
    }
    if let Some(path) = out {
        print_success(&format!("✓ {} rows written to {}", results.len(), path.display()));
    }
    Ok(())
}
