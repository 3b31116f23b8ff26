//! Per-command run context.
//!
//! Holds the "as of" date a run is evaluated at. It is built once by the
//! command that starts the run and passed down by reference.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// First month that belongs to the following season.
const SEASON_ROLLOVER_MONTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub as_of: NaiveDate,
    pub season: i32,
}

impl RunContext {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            season: season_for(as_of),
        }
    }

    pub fn today() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

/// Season key: calendar year in which the season ends.
pub fn season_for(date: NaiveDate) -> i32 {
    if date.month() >= SEASON_ROLLOVER_MONTH {
        date.year() + 1
    } else {
        date.year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_rolls_over_in_october() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(season_for(d(2025, 3, 15)), 2025);
        assert_eq!(season_for(d(2025, 9, 30)), 2025);
        assert_eq!(season_for(d(2025, 10, 1)), 2026);
        assert_eq!(RunContext::new(d(2024, 11, 20)).season, 2025);
    }
}
