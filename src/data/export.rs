//! Flat per-game result rows for downstream reporting.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::edge::PickSide;
use crate::error::Result;
use crate::forecast::GameForecast;

const CSV_HEADER: &str = "game_id,date,season,home_team,away_team,pred_margin,pred_sigma,\
pred_home_win_prob,win_prob_source,model_home_ml,model_away_ml,home_spread_num,spread_diff,\
home_winner_odds,away_winner_odds,home_winner_diff,away_winner_diff,\
edge_points,edge_z_home,edge_strength,home_cover_prob,away_cover_prob,pick_side,pick_cover_prob,pick_spread_odds,\
pick_breakeven_prob,pick_prob_edge,pick_ev_per_1,pick_fair_odds";

/// One exported game. Edge fields are `None` when the market was absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub game_id: String,
    pub date: String,
    pub season: i32,
    pub home_team: String,
    pub away_team: String,
    pub pred_margin: f64,
    pub pred_sigma: f64,
    pub pred_home_win_prob: f64,
    pub win_prob_source: String,
    pub model_home_ml: f64,
    pub model_away_ml: f64,
    pub home_spread_num: Option<f64>,
    pub spread_diff: Option<f64>,
    pub home_winner_odds: Option<f64>,
    pub away_winner_odds: Option<f64>,
    pub home_winner_diff: Option<f64>,
    pub away_winner_diff: Option<f64>,
    pub edge_points: Option<f64>,
    pub edge_z_home: Option<f64>,
    pub edge_strength: Option<f64>,
    pub home_cover_prob: Option<f64>,
    pub away_cover_prob: Option<f64>,
    pub pick_side: Option<PickSide>,
    pub pick_cover_prob: Option<f64>,
    pub pick_spread_odds: Option<f64>,
    pub pick_breakeven_prob: Option<f64>,
    pub pick_prob_edge: Option<f64>,
    pub pick_ev_per_1: Option<f64>,
    pub pick_fair_odds: Option<f64>,
}

impl From<&GameForecast> for ResultRow {
    fn from(g: &GameForecast) -> Self {
        let e = g.edge.as_ref();
        Self {
            game_id: g.game_id.clone(),
            date: g.date.format("%Y-%m-%d").to_string(),
            season: g.season,
            home_team: g.home_team.clone(),
            away_team: g.away_team.clone(),
            pred_margin: g.forecast.mu,
            pred_sigma: g.forecast.sigma,
            pred_home_win_prob: g.win_prob.value,
            win_prob_source: g.win_prob.source.as_str().to_string(),
            model_home_ml: g.model_home_ml,
            model_away_ml: g.model_away_ml,
            home_spread_num: g.market.home_spread_num,
            spread_diff: g.spread_diff,
            home_winner_odds: g.market.home_winner_odds,
            away_winner_odds: g.market.away_winner_odds,
            home_winner_diff: g.home_winner_diff,
            away_winner_diff: g.away_winner_diff,
            edge_points: e.map(|e| e.edge_points),
            edge_z_home: e.map(|e| e.edge_z_home),
            edge_strength: e.map(|e| e.edge_strength),
            home_cover_prob: e.map(|e| e.home_cover_prob),
            away_cover_prob: e.map(|e| e.away_cover_prob),
            pick_side: e.map(|e| e.pick_side),
            pick_cover_prob: e.map(|e| e.pick_cover_prob),
            pick_spread_odds: e.and_then(|e| e.pick_spread_odds),
            pick_breakeven_prob: e.and_then(|e| e.pick_breakeven_prob),
            pick_prob_edge: e.and_then(|e| e.pick_prob_edge),
            pick_ev_per_1: e.and_then(|e| e.pick_ev_per_1),
            pick_fair_odds: e.map(|e| e.pick_fair_odds),
        }
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn text(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

impl ResultRow {
    fn csv_line(&self) -> String {
        [
            text(&self.game_id),
            self.date.clone(),
            self.season.to_string(),
            text(&self.home_team),
            text(&self.away_team),
            format!("{:.6}", self.pred_margin),
            format!("{:.6}", self.pred_sigma),
            format!("{:.6}", self.pred_home_win_prob),
            self.win_prob_source.clone(),
            format!("{:.0}", self.model_home_ml),
            format!("{:.0}", self.model_away_ml),
            opt(self.home_spread_num),
            opt(self.spread_diff),
            opt(self.home_winner_odds),
            opt(self.away_winner_odds),
            opt(self.home_winner_diff),
            opt(self.away_winner_diff),
            opt(self.edge_points),
            opt(self.edge_z_home),
            opt(self.edge_strength),
            opt(self.home_cover_prob),
            opt(self.away_cover_prob),
            self.pick_side.map(|s| s.to_string()).unwrap_or_default(),
            opt(self.pick_cover_prob),
            opt(self.pick_spread_odds),
            opt(self.pick_breakeven_prob),
            opt(self.pick_prob_edge),
            opt(self.pick_ev_per_1),
            opt(self.pick_fair_odds),
        ]
        .join(",")
    }
}

/// Write rows as CSV; null fields become empty cells.
pub fn write_csv<W: Write>(mut out: W, rows: &[ResultRow]) -> Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(out, "{}", row.csv_line())?;
    }
    out.flush()?;
    Ok(())
}

pub fn export_csv<P: AsRef<Path>>(path: P, rows: &[ResultRow]) -> Result<()> {
    write_csv(BufWriter::new(File::create(path)?), rows)
}

pub fn export_json<P: AsRef<Path>>(path: P, rows: &[ResultRow]) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::edge::{compute_edge, MarketLine};
    use crate::forecast::{ForecastDistribution, ProbSource, WinProbability};
    use chrono::NaiveDate;

    fn forecast(market: MarketLine) -> GameForecast {
        let ctx = RunContext::new(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap());
        let dist = ForecastDistribution { mu: 5.0, sigma: 10.0 };
        GameForecast {
            game_id: "401".into(),
            home_team: "Duke".into(),
            away_team: "North Carolina, Chapel Hill".into(),
            date: ctx.as_of,
            season: ctx.season,
            forecast: dist,
            win_prob: WinProbability {
                value: 0.69,
                source: ProbSource::Analytic,
            },
            model_home_ml: -223.0,
            model_away_ml: 223.0,
            model_home_spread: -5.0,
            spread_diff: market.home_spread_num.map(|s| -5.0 - s),
            home_winner_diff: market.home_winner_odds.map(|o| o - -223.0),
            away_winner_diff: market.away_winner_odds.map(|o| o + 223.0),
            edge: compute_edge(&dist, &market).ok(),
            market,
            substituted_features: Vec::new(),
        }
    }

    #[test]
    fn null_edge_fields_are_empty_cells() {
        let row = ResultRow::from(&forecast(MarketLine::default()));
        assert!(row.edge_points.is_none());
        assert!(row.pick_side.is_none());

        let mut buf = Vec::new();
        write_csv(&mut buf, &[row]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("401,2025-01-10,2025,Duke,\"North Carolina, Chapel Hill\","));
        assert!(lines[1].ends_with(&",".repeat(18)));
        // the quoted away team carries one extra comma
        assert_eq!(lines[0].split(',').count(), lines[1].matches(',').count());
    }

    #[test]
    fn priced_row_fills_every_column() {
        let market = MarketLine {
            home_spread_num: Some(-3.0),
            away_spread_num: Some(3.0),
            home_spread_odds: Some(-110.0),
            away_spread_odds: Some(-110.0),
            home_winner_odds: Some(-200.0),
            away_winner_odds: Some(170.0),
        };
        let row = ResultRow::from(&forecast(market));
        assert_eq!(row.pick_side, Some(PickSide::Home));
        assert_eq!(row.edge_points, Some(2.0));
        assert!((row.edge_z_home.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(row.edge_strength, row.edge_z_home);
        assert_eq!(row.spread_diff, Some(-2.0));
        assert_eq!(row.home_winner_odds, Some(-200.0));
        assert_eq!(row.home_winner_diff, Some(23.0));

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["pick_side"], "HOME");
        assert!(json["pick_ev_per_1"].is_number());
        assert!(json["edge_strength"].is_number());
        assert!(json["away_winner_diff"].is_number());

        let mut buf = Vec::new();
        write_csv(&mut buf, &[row]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header: Vec<&str> = text.lines().next().unwrap().split(',').collect();
        let z = header.iter().position(|h| *h == "edge_z_home").unwrap();
        assert_eq!(header[z + 1], "edge_strength");
    }
}
