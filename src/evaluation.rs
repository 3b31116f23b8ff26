//! Forecast and betting evaluation metrics.

use serde::{Deserialize, Serialize};

use crate::edge::PickSide;
use crate::error::{HooplineError, Result};

const LOG_LOSS_EPS: f64 = 1e-15;

/// A graded pick: its edge and the outcome (+1 win, -1 loss, 0 push).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradedBet {
    pub edge_points: f64,
    pub bet_result: f64,
}

fn same_len(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(HooplineError::Validation(format!(
            "length mismatch: {a} predictions, {b} targets"
        )));
    }
    if a == 0 {
        return Err(HooplineError::Validation("no rows to evaluate".to_string()));
    }
    Ok(())
}

/// Mean squared error of predicted margins against the market's margins.
pub fn mse_vs_vegas(pred: &[f64], vegas: &[f64]) -> Result<f64> {
    same_len(pred.len(), vegas.len())?;
    let sum: f64 = pred.iter().zip(vegas).map(|(p, v)| (v - p).powi(2)).sum();
    Ok(sum / pred.len() as f64)
}

/// Mean bet result over bets with |edge| >= `threshold`; 0.0 when none qualify.
pub fn roi_at_edge(bets: &[GradedBet], threshold: f64) -> f64 {
    let selected: Vec<f64> = bets
        .iter()
        .filter(|b| b.edge_points.abs() >= threshold)
        .map(|b| b.bet_result)
        .collect();
    if selected.is_empty() {
        0.0
    } else {
        selected.iter().sum::<f64>() / selected.len() as f64
    }
}

/// Grade a spread pick against the final margin.
pub fn grade_spread_pick(side: PickSide, home_spread_num: f64, actual_margin: f64) -> f64 {
    let home_result = actual_margin + home_spread_num;
    let side_result = match side {
        PickSide::Home => home_result,
        PickSide::Away => -home_result,
    };
    if side_result > 0.0 {
        1.0
    } else if side_result < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Binary log loss with probabilities clipped away from 0 and 1.
pub fn log_loss(probs: &[f64], labels: &[f64]) -> Result<f64> {
    same_len(probs.len(), labels.len())?;
    let sum: f64 = probs
        .iter()
        .zip(labels)
        .map(|(p, y)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    Ok(sum / probs.len() as f64)
}

pub fn brier_score(probs: &[f64], labels: &[f64]) -> Result<f64> {
    same_len(probs.len(), labels.len())?;
    let sum: f64 = probs.iter().zip(labels).map(|(p, y)| (p - y).powi(2)).sum();
    Ok(sum / probs.len() as f64)
}
