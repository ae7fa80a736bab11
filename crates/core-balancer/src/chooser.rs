//! Seedable weighted random choice

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks keys with probability proportional to their weight.
///
/// Cumulative weights are searched with `partition_point` against one
/// uniform draw per call. Seeding makes a run reproducible.
#[derive(Debug, Clone)]
pub struct WeightedChooser {
    rng: StdRng,
}

impl WeightedChooser {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Choose one key from `pool`.
    ///
    /// Non-positive and non-finite weights are never chosen. Returns `None`
    /// when nothing carries weight.
    pub fn choose<'a, K>(&mut self, pool: &'a [(K, f64)]) -> Option<&'a K> {
        let mut total = 0.0;
        let cumulative: Vec<f64> = pool
            .iter()
            .map(|(_, w)| {
                if w.is_finite() && *w > 0.0 {
                    total += w;
                }
                total
            })
            .collect();

        if total <= 0.0 || !total.is_finite() {
            return None;
        }

        let draw = self.rng.random_range(0.0..total);
        let idx = cumulative
            .partition_point(|&c| c <= draw)
            .min(pool.len() - 1);
        Some(&pool[idx].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_and_weightless_pools() {
        let mut chooser = WeightedChooser::from_seed(1);
        let empty: Vec<(&str, f64)> = vec![];
        assert_eq!(chooser.choose(&empty), None);
        assert_eq!(chooser.choose(&[("a", 0.0), ("b", -2.0)]), None);
        assert_eq!(chooser.choose(&[("a", f64::NAN)]), None);
    }

    #[test]
    fn test_zero_weight_never_chosen() {
        let mut chooser = WeightedChooser::from_seed(7);
        let pool = [("zero", 0.0), ("a", 1.0), ("neg", -1.0), ("b", 2.0), ("tail", 0.0)];
        for _ in 0..2_000 {
            let picked = *chooser.choose(&pool).unwrap();
            assert!(picked == "a" || picked == "b");
        }
    }

    #[test]
    fn test_frequencies_follow_weights() {
        let mut chooser = WeightedChooser::from_seed(42);
        let pool = [("light", 1.0), ("heavy", 3.0)];
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for _ in 0..20_000 {
            *counts.entry(*chooser.choose(&pool).unwrap()).or_default() += 1;
        }
        let heavy_share = counts["heavy"] as f64 / 20_000.0;
        assert!((heavy_share - 0.75).abs() < 0.03, "share {heavy_share}");
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let pool = [("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0)];
        let mut first = WeightedChooser::from_seed(99);
        let mut second = WeightedChooser::from_seed(99);
        let a: Vec<_> = (0..50).map(|_| *first.choose(&pool).unwrap()).collect();
        let b: Vec<_> = (0..50).map(|_| *second.choose(&pool).unwrap()).collect();
        assert_eq!(a, b);
    }
}
