//! `hoopline odds`

use anyhow::Result;

use super::output::{print_kv, print_warn};
use crate::edge::odds::{expected_value_per_1, is_valid_american};
use crate::edge::{american_profit_per_1, american_to_breakeven_prob, prob_to_american};

pub fn run(odds: f64, prob: Option<f64>) -> Result<()> {
    if !is_valid_american(odds) {
        anyhow::bail!("{odds} is not a valid American price (|odds| must be >= 100)");
    }

    print_kv("odds", &format!("{odds:+.0}"));
    print_kv("breakeven", &format!("{:.4}", american_to_breakeven_prob(odds)));
    print_kv("profit per 1", &format!("{:.4}", american_profit_per_1(odds)));

    if let Some(p) = prob {
        if !(0.0..=1.0).contains(&p) {
            anyhow::bail!("--prob must be in [0, 1], got {p}");
        }
        let ev = expected_value_per_1(p, odds);
        print_kv("fair odds", &format!("{:+.1}", prob_to_american(p)));
        print_kv("edge", &format!("{:+.4}", p - american_to_breakeven_prob(odds)));
        print_kv("ev per 1", &format!("{ev:+.4}"));
        if ev <= 0.0 {
            print_warn("no positive expected value at this price");
        }
    }
    Ok(())
}
