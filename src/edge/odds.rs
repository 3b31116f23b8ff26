//! American odds conversions.

/// Probability clamp applied before inverting to odds.
pub const PROB_EPS: f64 = 1e-9;

/// Odds strictly inside (-100, 100) or non-finite are not quotable.
pub fn is_valid_american(odds: f64) -> bool {
    odds.is_finite() && odds.abs() >= 100.0
}

/// Implied break-even probability of an American price.
pub fn american_to_breakeven_prob(odds: f64) -> f64 {
    if odds < 0.0 {
        (-odds) / ((-odds) + 100.0)
    } else {
        100.0 / (odds + 100.0)
    }
}

/// Profit on a winning one-unit stake.
pub fn american_profit_per_1(odds: f64) -> f64 {
    if odds < 0.0 {
        100.0 / (-odds)
    } else {
        odds / 100.0
    }
}

/// Fair (zero-EV) American odds for a true probability.
pub fn prob_to_american(p: f64) -> f64 {
    let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
    if p >= 0.5 {
        -100.0 * p / (1.0 - p)
    } else {
        100.0 * (1.0 - p) / p
    }
}

/// Fair odds rounded to a whole-number moneyline.
pub fn moneyline_from_prob(p: f64) -> f64 {
    prob_to_american(p).round()
}

/// Book moneyline minus model moneyline.
///
/// When the two prices sit on opposite sides of even money each is first
/// shifted toward zero by 100, which reduces to `book + model`.
pub fn moneyline_diff(book: f64, model: f64) -> f64 {
    if (book > 0.0 && model < 0.0) || (book < 0.0 && model > 0.0) {
        book + model
    } else {
        book - model
    }
}

/// Expected profit per unit staked.
pub fn expected_value_per_1(p_win: f64, odds: f64) -> f64 {
    p_win * american_profit_per_1(odds) - (1.0 - p_win)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moneyline_diff_skips_even_money_band() {
        assert_eq!(moneyline_diff(150.0, 120.0), 30.0);
        assert_eq!(moneyline_diff(-150.0, -180.0), 30.0);
        // (book - 100) + (100 + model)
        assert_eq!(moneyline_diff(110.0, -110.0), 0.0);
        assert_eq!(moneyline_diff(130.0, -110.0), 20.0);
        // (book + 100) + (model - 100)
        assert_eq!(moneyline_diff(-120.0, 105.0), -15.0);
    }

    #[test]
    fn standard_juice() {
        assert!((american_to_breakeven_prob(-110.0) - 0.5238).abs() < 1e-4);
        assert!((american_profit_per_1(-110.0) - 0.9091).abs() < 1e-4);
        assert_eq!(american_profit_per_1(150.0), 1.5);
        assert_eq!(american_to_breakeven_prob(150.0), 0.4);
    }

    #[test]
    fn breakeven_round_trips_to_odds() {
        for odds in [-500.0, -250.0, -110.0, -105.0, 105.0, 120.0, 150.0, 400.0, 1200.0] {
            let back = prob_to_american(american_to_breakeven_prob(odds));
            assert!((back - odds).abs() < 1e-6, "{odds} -> {back}");
        }
    }

    #[test]
    fn extreme_probabilities_are_clamped() {
        assert!(prob_to_american(1.0).is_finite());
        assert!(prob_to_american(0.0).is_finite());
        assert!(prob_to_american(1.0) < 0.0);
        assert!(prob_to_american(0.0) > 0.0);
    }

    #[test]
    fn breakeven_probability_has_zero_ev() {
        for odds in [-110.0, 135.0] {
            let p = american_to_breakeven_prob(odds);
            assert!(expected_value_per_1(p, odds).abs() < 1e-12);
        }
        assert_eq!(moneyline_from_prob(0.6), -150.0);
        assert!(!is_valid_american(50.0));
        assert!(is_valid_american(-100.0));
    }
}
