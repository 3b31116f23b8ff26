//! Deterministic EV ranking.

use std::cmp::Ordering;

/// Sort key of one rankable candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankKey<'a> {
    pub ev_per_1: f64,
    pub edge_points: f64,
    pub game_id: &'a str,
}

/// Anything that may carry a priced edge.
pub trait Rankable {
    /// `None` excludes the item from ranking.
    fn rank_key(&self) -> Option<RankKey<'_>>;
}

/// EV descending, then |edge| descending, then game id ascending.
pub fn compare_keys(a: &RankKey<'_>, b: &RankKey<'_>) -> Ordering {
    b.ev_per_1
        .total_cmp(&a.ev_per_1)
        .then_with(|| b.edge_points.abs().total_cmp(&a.edge_points.abs()))
        .then_with(|| a.game_id.cmp(b.game_id))
}

/// Priced items in ranking order; unpriced items are left out.
pub fn rank_by_ev<T: Rankable>(items: &[T]) -> Vec<&T> {
    let mut keyed: Vec<(RankKey<'_>, &T)> = items
        .iter()
        .filter_map(|item| item.rank_key().map(|k| (k, item)))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    keyed.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Candidate {
        id: &'static str,
        ev: Option<f64>,
        edge: f64,
    }

    impl Rankable for Candidate {
        fn rank_key(&self) -> Option<RankKey<'_>> {
            self.ev.map(|ev_per_1| RankKey {
                ev_per_1,
                edge_points: self.edge,
                game_id: self.id,
            })
        }
    }

    fn c(id: &'static str, ev: Option<f64>, edge: f64) -> Candidate {
        Candidate { id, ev, edge }
    }

    #[test]
    fn orders_by_ev_then_edge_then_id() {
        let items = vec![
            c("d", Some(0.02), 1.0),
            c("b", Some(0.05), -1.0),
            c("a", Some(0.05), 3.0),
            c("x", None, 9.0),
            c("c", Some(0.05), -3.0),
            c("e", Some(-0.1), 0.5),
        ];
        let ids: Vec<&str> = rank_by_ev(&items).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d", "e"]);
    }

    #[test]
    fn ordering_is_independent_of_input_order() {
        let mut items = vec![
            c("g1", Some(0.01), 2.0),
            c("g2", Some(0.01), 2.0),
            c("g3", Some(0.03), 0.0),
        ];
        let forward: Vec<&str> = rank_by_ev(&items).iter().map(|c| c.id).collect();
        items.reverse();
        let backward: Vec<&str> = rank_by_ev(&items).iter().map(|c| c.id).collect();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec!["g3", "g1", "g2"]);
    }
}
