//! Successive-halving pruner.
//!
//! Rungs sit at `min_resource * eta^k` epochs. A trial reaching a rung
//! reports its validation loss there and continues only while it ranks in
//! the best `max(1, n / eta)` of the `n` values reported at that rung so far.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RungDecision {
    Promote,
    Prune,
}

#[derive(Debug, Clone)]
pub struct SuccessiveHalving {
    min_resource: usize,
    reduction_factor: usize,
    rungs: BTreeMap<usize, Vec<f64>>,
}

impl SuccessiveHalving {
    pub fn new(min_resource: usize, reduction_factor: usize) -> Self {
        Self {
            min_resource: min_resource.max(1),
            reduction_factor: reduction_factor.max(2),
            rungs: BTreeMap::new(),
        }
    }

    /// Rung index when `epoch` (1-based) is a rung boundary.
    pub fn rung_for(&self, epoch: usize) -> Option<usize> {
        let mut boundary = self.min_resource;
        let mut rung = 0;
        while boundary <= epoch {
            if boundary == epoch {
                return Some(rung);
            }
            boundary = boundary.checked_mul(self.reduction_factor)?;
            rung += 1;
        }
        None
    }

    pub fn report(&mut self, rung: usize, value: f64) -> RungDecision {
        if !value.is_finite() {
            return RungDecision::Prune;
        }
        let values = self.rungs.entry(rung).or_default();
        values.push(value);

        let keep = (values.len() / self.reduction_factor).max(1);
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        if value <= sorted[keep - 1] {
            RungDecision::Promote
        } else {
            RungDecision::Prune
        }
    }

    pub fn reported(&self, rung: usize) -> usize {
        self.rungs.get(&rung).map_or(0, Vec::len)
    }
}
