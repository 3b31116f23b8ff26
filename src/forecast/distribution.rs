//! Normal distribution over the game margin (home points minus away points).

use serde::{Deserialize, Serialize};

use crate::error::{HooplineError, Result};
use crate::ml::objective::{sigma_from_raw, SIGMA_MAX, SIGMA_MIN};

/// Standard normal CDF (Abramowitz & Stegun 7.1.26).
pub fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * z);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

    0.5 * (1.0 + sign * y)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastDistribution {
    pub mu: f64,
    pub sigma: f64,
}

impl ForecastDistribution {
    /// Build from the network head `(mu, raw_sigma)`.
    pub fn from_raw_output(out: &[f64]) -> Result<Self> {
        let [mu, raw_sigma] = out else {
            return Err(HooplineError::NumericDegeneracy(format!(
                "forecast head emitted {} values, expected 2",
                out.len()
            )));
        };
        let dist = Self {
            mu: *mu,
            sigma: sigma_from_raw(*raw_sigma),
        };
        dist.check()?;
        Ok(dist)
    }

    /// Reject values the output transform should have made impossible.
    pub fn check(&self) -> Result<()> {
        if !self.mu.is_finite() {
            return Err(HooplineError::NumericDegeneracy(format!("mu = {}", self.mu)));
        }
        if !(SIGMA_MIN..=SIGMA_MAX).contains(&self.sigma) {
            return Err(HooplineError::NumericDegeneracy(format!(
                "sigma = {} outside [{SIGMA_MIN}, {SIGMA_MAX}]",
                self.sigma
            )));
        }
        Ok(())
    }

    /// P(margin > 0), the analytic home-win probability.
    pub fn home_win_prob(&self) -> f64 {
        normal_cdf(self.mu / self.sigma)
    }

    /// Spread the model would post for the home side.
    pub fn model_home_spread(&self) -> f64 {
        -self.mu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(0.2) - 0.5793).abs() < 1e-4);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((normal_cdf(-1.0) + normal_cdf(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sigma_always_in_bounds() {
        for raw in [-1e6, -50.0, -1.0, 0.0, 1.0, 12.0, 29.0, 50.0, 1e6] {
            let d = ForecastDistribution::from_raw_output(&[3.0, raw]).unwrap();
            assert!((0.5..=30.0).contains(&d.sigma), "raw {raw} -> {}", d.sigma);
        }
    }

    #[test]
    fn degenerate_outputs_are_reported() {
        assert!(matches!(
            ForecastDistribution::from_raw_output(&[f64::NAN, 1.0]),
            Err(HooplineError::NumericDegeneracy(_))
        ));
        assert!(ForecastDistribution::from_raw_output(&[1.0]).is_err());
        let bad = ForecastDistribution { mu: 0.0, sigma: 0.1 };
        assert!(bad.check().is_err());
    }

    #[test]
    fn analytic_win_prob_is_symmetric() {
        let home = ForecastDistribution { mu: 4.0, sigma: 11.0 };
        let away = ForecastDistribution { mu: -4.0, sigma: 11.0 };
        assert!((home.home_win_prob() + away.home_win_prob() - 1.0).abs() < 1e-9);
        assert_eq!(home.model_home_spread(), -4.0);
    }
}
