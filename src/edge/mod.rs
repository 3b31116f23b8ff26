//! Edge & EV engine: market spreads against the forecast distribution.

pub mod engine;
pub mod odds;
pub mod ranking;

pub use engine::{compute_edge, EdgeRecord, MarketLine, PickSide};
pub use odds::{american_profit_per_1, american_to_breakeven_prob, prob_to_american};
pub use ranking::{rank_by_ev, RankKey, Rankable};
