//! Cover probabilities, pick side and EV against a spread market.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use super::odds::{
    american_to_breakeven_prob, expected_value_per_1, is_valid_american, prob_to_american,
    PROB_EPS,
};
use crate::error::{HooplineError, Result};
use crate::forecast::distribution::{normal_cdf, ForecastDistribution};

/// Floor applied to sigma before dividing by it.
pub const SIGMA_FLOOR: f64 = 1e-6;

/// Book lines for one game. Absent fields are a valid state.
///
/// Each field accepts a JSON number, a numeric string or null.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketLine {
    #[serde(default, deserialize_with = "lenient_number")]
    pub home_spread_num: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub away_spread_num: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub home_spread_odds: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub away_spread_odds: Option<f64>,
    /// Book moneyline on the home team
    #[serde(default, deserialize_with = "lenient_number")]
    pub home_winner_odds: Option<f64>,
    /// Book moneyline on the away team
    #[serde(default, deserialize_with = "lenient_number")]
    pub away_winner_odds: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("{s:?} is not a number"))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

impl MarketLine {
    /// Book moneyline for `side`, if quotable.
    pub fn winner_odds(&self, side: PickSide) -> Option<f64> {
        let odds = match side {
            PickSide::Home => self.home_winner_odds,
            PickSide::Away => self.away_winner_odds,
        }?;
        if is_valid_american(odds) {
            Some(odds)
        } else {
            warn!(odds, side = %side, "Ignoring unquotable moneyline");
            None
        }
    }

    fn odds_for(&self, side: PickSide) -> Option<f64> {
        let odds = match side {
            PickSide::Home => self.home_spread_odds,
            PickSide::Away => self.away_spread_odds,
        }?;
        if is_valid_american(odds) {
            Some(odds)
        } else {
            warn!(odds, side = %side, "Ignoring unquotable spread odds");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PickSide {
    Home,
    Away,
}

impl fmt::Display for PickSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickSide::Home => write!(f, "HOME"),
            PickSide::Away => write!(f, "AWAY"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// mu + home_spread_num
    pub edge_points: f64,
    /// edge_points / sigma
    pub edge_z_home: f64,
    /// |edge_z_home|
    pub edge_strength: f64,
    pub home_cover_prob: f64,
    pub away_cover_prob: f64,
    pub pick_side: PickSide,
    pub pick_cover_prob: f64,
    pub pick_fair_odds: f64,
    pub pick_spread_odds: Option<f64>,
    pub pick_breakeven_prob: Option<f64>,
    pub pick_prob_edge: Option<f64>,
    pub pick_ev_per_1: Option<f64>,
}

impl EdgeRecord {
    /// Whether the picked side carries a price, i.e. the game can be ranked.
    pub fn is_priced(&self) -> bool {
        self.pick_ev_per_1.is_some()
    }
}

/// Edge of `forecast` against `market`.
///
/// Fails with `MissingMarketData` when there is no home spread. When the
/// picked side has no usable odds the price-dependent fields are `None`.
pub fn compute_edge(forecast: &ForecastDistribution, market: &MarketLine) -> Result<EdgeRecord> {
    let spread = market
        .home_spread_num
        .filter(|s| s.is_finite())
        .ok_or_else(|| HooplineError::MissingMarketData("home_spread_num".to_string()))?;

    let sigma = forecast.sigma.max(SIGMA_FLOOR);
    let edge_points = forecast.mu + spread;
    let edge_z_home = edge_points / sigma;
    let home_cover_prob = normal_cdf(edge_z_home);
    let away_cover_prob = 1.0 - home_cover_prob;

    let pick_side = if edge_points >= 0.0 {
        PickSide::Home
    } else {
        PickSide::Away
    };
    let pick_cover_prob = match pick_side {
        PickSide::Home => home_cover_prob,
        PickSide::Away => away_cover_prob,
    }
    .clamp(PROB_EPS, 1.0 - PROB_EPS);

    let pick_spread_odds = market.odds_for(pick_side);
    let pick_breakeven_prob = pick_spread_odds.map(american_to_breakeven_prob);

    Ok(EdgeRecord {
        edge_points,
        edge_z_home,
        edge_strength: edge_z_home.abs(),
        home_cover_prob,
        away_cover_prob,
        pick_side,
        pick_cover_prob,
        pick_fair_odds: prob_to_american(pick_cover_prob),
        pick_spread_odds,
        pick_breakeven_prob,
        pick_prob_edge: pick_breakeven_prob.map(|b| pick_cover_prob - b),
        pick_ev_per_1: pick_spread_odds.map(|o| expected_value_per_1(pick_cover_prob, o)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(mu: f64, sigma: f64) -> ForecastDistribution {
        ForecastDistribution { mu, sigma }
    }

    fn market(spread: f64) -> MarketLine {
        MarketLine {
            home_spread_num: Some(spread),
            away_spread_num: Some(-spread),
            home_spread_odds: Some(-110.0),
            away_spread_odds: Some(-110.0),
            ..MarketLine::default()
        }
    }

    #[test]
    fn reference_game() {
        let e = compute_edge(&dist(5.0, 10.0), &market(-3.0)).unwrap();
        assert_eq!(e.edge_points, 2.0);
        assert!((e.edge_z_home - 0.2).abs() < 1e-12);
        assert_eq!(e.edge_strength, e.edge_z_home);
        assert!((e.home_cover_prob - 0.5793).abs() < 1e-4);
        assert_eq!(e.pick_side, PickSide::Home);
        let ev = e.pick_ev_per_1.unwrap();
        assert!((ev - (e.pick_cover_prob * (100.0 / 110.0) - (1.0 - e.pick_cover_prob))).abs() < 1e-12);
        assert!((e.pick_prob_edge.unwrap() - (e.pick_cover_prob - 110.0 / 210.0)).abs() < 1e-12);
    }

    #[test]
    fn cover_probs_sum_to_one() {
        for (mu, sigma, spread) in [(0.0, 0.5, 0.0), (-12.0, 30.0, 7.5), (25.0, 1.0, -3.5), (3.0, 1e-9, -3.0)] {
            let e = compute_edge(&dist(mu, sigma), &market(spread)).unwrap();
            assert!((e.home_cover_prob + e.away_cover_prob - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn pick_is_home_iff_edge_non_negative() {
        let tie = compute_edge(&dist(3.0, 8.0), &market(-3.0)).unwrap();
        assert_eq!(tie.edge_points, 0.0);
        assert_eq!(tie.pick_side, PickSide::Home);

        let away = compute_edge(&dist(1.0, 8.0), &market(-3.0)).unwrap();
        assert_eq!(away.pick_side, PickSide::Away);
        assert_eq!(away.pick_cover_prob, away.away_cover_prob);
        assert_eq!(away.edge_z_home, -0.25);
        assert_eq!(away.edge_strength, 0.25);
    }

    #[test]
    fn market_fields_accept_numeric_strings() {
        let line: MarketLine = serde_json::from_value(serde_json::json!({
            "home_spread_num": "-2.5",
            "home_spread_odds": -110,
            "home_winner_odds": " -140 ",
            "away_winner_odds": null,
            "away_spread_odds": "",
        }))
        .unwrap();
        assert_eq!(line.home_spread_num, Some(-2.5));
        assert_eq!(line.home_spread_odds, Some(-110.0));
        assert_eq!(line.home_winner_odds, Some(-140.0));
        assert_eq!(line.away_winner_odds, None);
        assert_eq!(line.away_spread_odds, None);
        assert_eq!(line.away_spread_num, None);

        let bad = serde_json::from_value::<MarketLine>(serde_json::json!({"home_spread_num": "n/a"}));
        assert!(bad.is_err());
        let bad = serde_json::from_value::<MarketLine>(serde_json::json!({"home_spread_num": [1]}));
        assert!(bad.is_err());
    }

    #[test]
    fn unquotable_moneyline_is_ignored() {
        let line = MarketLine {
            home_winner_odds: Some(-140.0),
            away_winner_odds: Some(50.0),
            ..MarketLine::default()
        };
        assert_eq!(line.winner_odds(PickSide::Home), Some(-140.0));
        assert_eq!(line.winner_odds(PickSide::Away), None);
    }

    #[test]
    fn missing_spread_is_missing_market_data() {
        let err = compute_edge(&dist(1.0, 8.0), &MarketLine::default()).unwrap_err();
        assert!(matches!(err, HooplineError::MissingMarketData(_)));
    }

    #[test]
    fn missing_odds_nulls_price_fields() {
        let line = MarketLine {
            home_spread_num: Some(-3.0),
            ..MarketLine::default()
        };
        let e = compute_edge(&dist(5.0, 10.0), &line).unwrap();
        assert!(e.pick_ev_per_1.is_none());
        assert!(e.pick_breakeven_prob.is_none());
        assert!(e.pick_prob_edge.is_none());
        assert!(!e.is_priced());
        assert!(e.pick_fair_odds < 0.0);
    }
}
