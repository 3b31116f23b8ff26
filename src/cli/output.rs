//! Output formatting for `hoopline` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::forecast::GameForecast;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Display row for one scored game.
#[derive(Debug, Serialize, Tabled)]
pub struct PickRow {
    pub game: String,
    pub matchup: String,
    pub mu: String,
    pub sigma: String,
    pub home_win: String,
    pub spread: String,
    pub pick: String,
    pub edge: String,
    pub z: String,
    pub cover: String,
    pub odds: String,
    pub ev: String,
}

fn opt(v: Option<f64>, digits: usize) -> String {
    v.map(|x| format!("{x:.digits$}")).unwrap_or_else(|| "-".to_string())
}

impl From<&GameForecast> for PickRow {
    fn from(g: &GameForecast) -> Self {
        let e = g.edge.as_ref();
        Self {
            game: g.game_id.clone(),
            matchup: format!("{} @ {}", g.away_team, g.home_team),
            mu: format!("{:+.1}", g.forecast.mu),
            sigma: format!("{:.1}", g.forecast.sigma),
            home_win: format!("{:.1}%", g.win_prob.value * 100.0),
            spread: opt(g.market.home_spread_num, 1),
            pick: e.map(|e| e.pick_side.to_string()).unwrap_or_else(|| "-".to_string()),
            edge: opt(e.map(|e| e.edge_points), 2),
            z: opt(e.map(|e| e.edge_z_home), 2),
            cover: opt(e.map(|e| e.pick_cover_prob * 100.0), 1),
            odds: opt(e.and_then(|e| e.pick_spread_odds), 0),
            ev: opt(e.and_then(|e| e.pick_ev_per_1), 3),
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                let table = Table::new(items).to_string();
                println!("{table}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(items)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Print a single Serialize item as pretty JSON.
pub fn print_item<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

/// Print a simple key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("{key}: {value}");
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print a warning message.
pub fn print_warn(msg: &str) {
    println!("\x1b[33m{msg}\x1b[0m");
}
