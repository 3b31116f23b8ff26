//! Hyperparameter search with successive-halving pruning.

pub mod halving;
pub mod search;
pub mod tuner;

pub use halving::{RungDecision, SuccessiveHalving};
pub use search::{SearchSpace, TrialParams};
pub use tuner::{Task, TrialRecord, TrialState, TuneReport, Tuner};
