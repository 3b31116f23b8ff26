//! Scoring games against a loaded artifact set.
//!
//! A `Predictor` is built once per process from an artifact directory and is
//! then a pure function of (artifacts, game input). Batch scoring walks games
//! in order; a failure on one game is recorded and the batch moves on.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::distribution::ForecastDistribution;
use super::winprob::{WinProbSource, WinProbability};
use crate::config::InferenceConfig;
use crate::context::{season_for, RunContext};
use crate::edge::odds::{moneyline_diff, moneyline_from_prob};
use crate::edge::ranking::{RankKey, Rankable};
use crate::edge::{compute_edge, EdgeRecord, MarketLine, PickSide};
use crate::error::{ErrorKind, HooplineError, Result};
use crate::ml::artifact::{ArtifactStore, ModelRole};
use crate::ml::{FeatureScaler, FeatureSchema, Mlp, RawFeatures};

/// One game as handed over by the feature provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInput {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub features: RawFeatures,
    #[serde(default)]
    pub market: MarketLine,
}

/// Everything the model says about one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameForecast {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub date: NaiveDate,
    pub season: i32,
    pub forecast: ForecastDistribution,
    pub win_prob: WinProbability,
    pub model_home_ml: f64,
    pub model_away_ml: f64,
    pub model_home_spread: f64,
    /// model_home_spread - home_spread_num
    pub spread_diff: Option<f64>,
    /// `moneyline_diff(home_winner_odds, model_home_ml)`
    pub home_winner_diff: Option<f64>,
    /// `moneyline_diff(away_winner_odds, model_away_ml)`
    pub away_winner_diff: Option<f64>,
    pub market: MarketLine,
    pub edge: Option<EdgeRecord>,
    /// Schema columns absent from the input and scored as 0.0
    pub substituted_features: Vec<String>,
}

impl Rankable for GameForecast {
    fn rank_key(&self) -> Option<RankKey<'_>> {
        let edge = self.edge.as_ref()?;
        Some(RankKey {
            ev_per_1: edge.pick_ev_per_1?,
            edge_points: edge.edge_points,
            game_id: &self.game_id,
        })
    }
}

/// A game that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub game_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-kind error counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorSummary {
    counts: BTreeMap<ErrorKind, usize>,
}

impl ErrorSummary {
    pub fn record(&mut self, kind: ErrorKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ErrorKind, usize)> + '_ {
        self.counts.iter().map(|(k, v)| (*k, *v))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub rows: Vec<GameForecast>,
    pub failures: Vec<RowFailure>,
    /// Includes non-fatal missing market data
    pub errors: ErrorSummary,
}

pub struct Predictor {
    schema: FeatureSchema,
    forecast: Mlp,
    win_prob: WinProbSource,
    scaler: Option<FeatureScaler>,
}

impl Predictor {
    pub fn new(
        schema: FeatureSchema,
        forecast: Mlp,
        win_prob: WinProbSource,
        scaler: Option<FeatureScaler>,
    ) -> Result<Self> {
        if forecast.input_dim() != schema.len() {
            return Err(HooplineError::ArchitectureMismatch(format!(
                "forecast model takes {} inputs, feature order has {}",
                forecast.input_dim(),
                schema.len()
            )));
        }
        if let Some(dim) = win_prob.input_dim() {
            if dim != schema.len() {
                return Err(HooplineError::ArchitectureMismatch(format!(
                    "classifier takes {dim} inputs, feature order has {}",
                    schema.len()
                )));
            }
        }
        if let Some(s) = &scaler {
            if s.feature_order != schema.names() {
                return Err(HooplineError::SchemaMismatch(
                    "scaler feature order differs from the feature-order descriptor".to_string(),
                ));
            }
        }
        Ok(Self {
            schema,
            forecast,
            win_prob,
            scaler,
        })
    }

    /// Load every artifact once from `store`.
    pub fn from_store(store: &ArtifactStore, config: &InferenceConfig) -> Result<Self> {
        let loaded = store.load_model(ModelRole::Forecast, config.default_input_dim)?;

        let schema = match store.load_schema() {
            Ok(schema) => schema,
            Err(HooplineError::ArtifactNotFound(path)) => {
                let order = loaded.feature_order.clone().ok_or(HooplineError::ArtifactNotFound(path))?;
                warn!("No feature-order descriptor, using the order recorded in the forecast artifact");
                FeatureSchema::new(order)?
            }
            Err(e) => return Err(e),
        };
        if let Some(order) = &loaded.feature_order {
            if order.as_slice() != schema.names() {
                return Err(HooplineError::SchemaMismatch(
                    "forecast artifact feature order differs from the descriptor".to_string(),
                ));
            }
        }

        let win_prob = WinProbSource::resolve(
            store,
            config.default_input_dim,
            config.require_classifier,
        )?;

        let scaler = match store.load_scaler() {
            Ok(scaler) => Some(scaler),
            Err(HooplineError::ArtifactNotFound(path)) if config.allow_unscaled_fallback => {
                warn!(path = %path.display(), "Scaler not found, scoring unscaled features");
                None
            }
            Err(e) => return Err(e),
        };

        info!(
            features = schema.len(),
            win_prob = win_prob.kind().as_str(),
            scaled = scaler.is_some(),
            "Predictor ready"
        );
        Self::new(schema, loaded.network, win_prob, scaler)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn win_prob_source(&self) -> &WinProbSource {
        &self.win_prob
    }

    pub fn is_scaled(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn score_game(&self, ctx: &RunContext, game: &GameInput) -> Result<GameForecast> {
        let alignment = self.schema.align(&game.features)?;
        let substituted_features = alignment.missing.clone();
        if !substituted_features.is_empty() {
            warn!(game_id = %game.game_id, "Game is missing feature columns");
        }
        let vector = alignment.fill_missing(0.0);
        self.schema.check(&vector)?;

        let input = match &self.scaler {
            Some(scaler) => scaler.transform(&vector)?,
            None => vector,
        };

        let forecast = ForecastDistribution::from_raw_output(&self.forecast.forward_row(&input.values)?)?;
        let win_prob = self.win_prob.win_probability(&input.values, &forecast)?;

        let edge = match compute_edge(&forecast, &game.market) {
            Ok(edge) => Some(edge),
            Err(HooplineError::MissingMarketData(field)) => {
                debug!(game_id = %game.game_id, field = %field, "No market line, edge fields left empty");
                None
            }
            Err(e) => return Err(e),
        };

        let date = game.date.unwrap_or(ctx.as_of);
        let model_home_ml = moneyline_from_prob(win_prob.value);
        let model_away_ml = moneyline_from_prob(1.0 - win_prob.value);

        Ok(GameForecast {
            game_id: game.game_id.clone(),
            home_team: game.home_team.clone(),
            away_team: game.away_team.clone(),
            date,
            season: season_for(date),
            model_home_ml,
            model_away_ml,
            model_home_spread: forecast.model_home_spread(),
            spread_diff: game
                .market
                .home_spread_num
                .map(|s| forecast.model_home_spread() - s),
            home_winner_diff: game
                .market
                .winner_odds(PickSide::Home)
                .map(|book| moneyline_diff(book, model_home_ml)),
            away_winner_diff: game
                .market
                .winner_odds(PickSide::Away)
                .map(|book| moneyline_diff(book, model_away_ml)),
            forecast,
            win_prob,
            market: game.market,
            edge,
            substituted_features,
        })
    }

    /// Score every game; failures are isolated to their own row.
    pub fn score_batch(&self, ctx: &RunContext, games: &[GameInput]) -> BatchReport {
        let mut report = BatchReport::default();
        for game in games {
            self.score_into(&mut report, ctx, game);
        }
        log_report(games.len(), &report);
        report
    }

    /// Score raw JSON game objects. An element that does not deserialize as
    /// a game becomes a `SchemaMismatch` failure for that row only.
    pub fn score_values(&self, ctx: &RunContext, games: &[Value]) -> BatchReport {
        let mut report = BatchReport::default();
        for (idx, value) in games.iter().enumerate() {
            match GameInput::deserialize(value) {
                Ok(game) => self.score_into(&mut report, ctx, &game),
                Err(e) => {
                    let game_id = value
                        .get("game_id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("#{idx}"));
                    let err = HooplineError::SchemaMismatch(format!("malformed game: {e}"));
                    record_failure(&mut report, game_id, &err);
                }
            }
        }
        log_report(games.len(), &report);
        report
    }

    fn score_into(&self, report: &mut BatchReport, ctx: &RunContext, game: &GameInput) {
        match self.score_game(ctx, game) {
            Ok(row) => {
                if row.edge.is_none() {
                    report.errors.record(ErrorKind::MissingMarketData);
                }
                report.rows.push(row);
            }
            Err(e) => record_failure(report, game.game_id.clone(), &e),
        }
    }
}

fn record_failure(report: &mut BatchReport, game_id: String, err: &HooplineError) {
    warn!(game_id = %game_id, kind = %err.kind(), error = %err, "Game not scored");
    report.errors.record(err.kind());
    report.failures.push(RowFailure {
        game_id,
        kind: err.kind(),
        message: err.to_string(),
    });
}

fn log_report(games: usize, report: &BatchReport) {
    info!(
        games,
        scored = report.rows.len(),
        failed = report.failures.len(),
        issues = report.errors.total(),
        "Batch scored"
    );
    for (kind, count) in report.errors.iter() {
        info!(kind = %kind, count, "Batch error summary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::Topology;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn predictor(win_prob: WinProbSource) -> Predictor {
        let schema = FeatureSchema::new(vec!["f1".into(), "f2".into()]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let net = Mlp::new(
            Topology {
                input_dim: 2,
                hidden: 4,
                hidden2: 3,
                dropout: 0.0,
                output_dim: 2,
            },
            &mut rng,
        )
        .unwrap();
        Predictor::new(schema, net, win_prob, None).unwrap()
    }

    fn game(id: &str, features: serde_json::Value, market: MarketLine) -> GameInput {
        GameInput {
            game_id: id.to_string(),
            home_team: "Home".into(),
            away_team: "Away".into(),
            date: None,
            features: serde_json::from_value(features).unwrap(),
            market,
        }
    }

    fn priced(spread: f64) -> MarketLine {
        MarketLine {
            home_spread_num: Some(spread),
            away_spread_num: Some(-spread),
            home_spread_odds: Some(-110.0),
            away_spread_odds: Some(-110.0),
            ..MarketLine::default()
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
    }

    #[test]
    fn scores_a_game_with_consistent_fields() {
        let p = predictor(WinProbSource::Analytic);
        let row = p
            .score_game(&ctx(), &game("g1", json!({"f1": 1.0, "f2": -2.0}), priced(-3.5)))
            .unwrap();

        assert!((0.5..=30.0).contains(&row.forecast.sigma));
        assert_eq!(row.model_home_spread, -row.forecast.mu);
        assert_eq!(row.spread_diff, Some(-row.forecast.mu + 3.5));
        let edge = row.edge.unwrap();
        assert_eq!(edge.edge_points, row.forecast.mu - 3.5);
        assert!((edge.home_cover_prob + edge.away_cover_prob - 1.0).abs() < 1e-9);
        assert_eq!(row.date, ctx().as_of);
        assert_eq!(row.season, 2025);
        assert!(row.home_winner_diff.is_none() && row.away_winner_diff.is_none());
    }

    #[test]
    fn season_follows_the_game_date() {
        let p = predictor(WinProbSource::Analytic);
        let mut g = game("old", json!({"f1": 1.0, "f2": 0.0}), priced(-1.0));
        g.date = NaiveDate::from_ymd_opt(2023, 11, 20);
        let row = p.score_game(&ctx(), &g).unwrap();
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2023, 11, 20).unwrap());
        assert_eq!(row.season, 2024);
        assert_ne!(row.season, ctx().season);
    }

    #[test]
    fn moneyline_diffs_compare_book_to_model() {
        let p = predictor(WinProbSource::Analytic);
        let market = MarketLine {
            home_winner_odds: Some(-150.0),
            away_winner_odds: Some(130.0),
            ..priced(-3.0)
        };
        let row = p
            .score_game(&ctx(), &game("ml", json!({"f1": 0.3, "f2": 0.4}), market))
            .unwrap();
        assert_eq!(row.home_winner_diff, Some(moneyline_diff(-150.0, row.model_home_ml)));
        assert_eq!(row.away_winner_diff, Some(moneyline_diff(130.0, row.model_away_ml)));

        let no_ml = p
            .score_game(&ctx(), &game("spread", json!({"f1": 0.3, "f2": 0.4}), priced(-3.0)))
            .unwrap();
        assert!(no_ml.home_winner_diff.is_none());
        assert!(no_ml.edge.is_some());
    }

    #[test]
    fn malformed_elements_fail_alone() {
        let p = predictor(WinProbSource::Analytic);
        let games = vec![
            json!({"game_id": "good", "home_team": "H", "away_team": "A",
                   "features": {"f1": 0.5, "f2": 0.1},
                   "market": {"home_spread_num": -2.5, "home_spread_odds": -110, "away_spread_odds": -110}}),
            json!({"game_id": "bad", "home_team": "H", "away_team": "A",
                   "features": {"f1": 0.5, "f2": 0.1},
                   "market": {"home_spread_num": "n/a"}}),
            json!({"home_team": "H", "features": {}}),
            json!({"game_id": "text", "home_team": "H", "away_team": "A",
                   "features": {"f1": 0.5, "f2": 0.1},
                   "market": {"home_spread_num": "-2.5"}}),
        ];
        let report = p.score_values(&ctx(), &games);

        let scored: Vec<&str> = report.rows.iter().map(|r| r.game_id.as_str()).collect();
        assert_eq!(scored, vec!["good", "text"]);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.game_id.as_str()).collect();
        assert_eq!(failed, vec!["bad", "#2"]);
        assert!(report.failures.iter().all(|f| f.kind == ErrorKind::SchemaMismatch));
        assert_eq!(report.errors.count(ErrorKind::SchemaMismatch), 2);
        assert_eq!(report.rows[1].market.home_spread_num, Some(-2.5));
    }

    #[test]
    fn batch_isolates_failures_and_missing_markets() {
        let p = predictor(WinProbSource::Analytic);
        let games = vec![
            game("ok", json!({"f1": 0.5, "f2": 0.1}), priced(2.0)),
            game("no_market", json!({"f1": 0.5, "f2": 0.1}), MarketLine::default()),
            game("bad", json!({"f1": "n/a?", "f2": 0.1}), priced(1.0)),
            game("partial", json!({"f1": 0.2}), priced(-1.0)),
        ];
        let report = p.score_batch(&ctx(), &games);

        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].game_id, "bad");
        assert_eq!(report.errors.count(ErrorKind::SchemaMismatch), 1);
        assert_eq!(report.errors.count(ErrorKind::MissingMarketData), 1);

        let no_market = report.rows.iter().find(|r| r.game_id == "no_market").unwrap();
        assert!(no_market.edge.is_none());
        assert!(no_market.spread_diff.is_none());
        assert!(no_market.rank_key().is_none());

        let partial = report.rows.iter().find(|r| r.game_id == "partial").unwrap();
        assert_eq!(partial.substituted_features, vec!["f2".to_string()]);
        assert!(partial.edge.is_some());
    }

    #[test]
    fn rejects_mismatched_model_width() {
        let schema = FeatureSchema::new(vec!["only".into()]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let net = Mlp::new(
            Topology {
                input_dim: 3,
                hidden: 2,
                hidden2: 2,
                dropout: 0.0,
                output_dim: 2,
            },
            &mut rng,
        )
        .unwrap();
        assert!(matches!(
            Predictor::new(schema, net, WinProbSource::Analytic, None),
            Err(HooplineError::ArchitectureMismatch(_))
        ));
    }
}
