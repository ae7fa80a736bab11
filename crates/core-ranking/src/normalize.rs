//! Popularity to target replica count

use std::collections::BTreeMap;

// Guards the floor against values like 2.9999999 that should be 3
const FLOOR_EPSILON: f64 = 1e-9;

/// Linear coefficients `(n, m)` mapping `[min_p, max_p]` onto `[1, max_replicas]`.
///
/// Equal popularity everywhere (or a ceiling of 1) yields `(0, 1)`.
pub fn coefficients(min_p: f64, max_p: f64, max_replicas: u32) -> (f64, f64) {
    let span = max_p - min_p;
    if max_replicas <= 1 || !span.is_finite() || span <= f64::EPSILON {
        return (0.0, 1.0);
    }
    let n = (max_replicas as f64 - 1.0) / span;
    (n, 1.0 - n * min_p)
}

/// Map each dataset's popularity to a replica target in `[1, max_replicas]`.
///
/// The least popular dataset maps to 1, the most popular to `max_replicas`,
/// and ordering is preserved. Non-finite scores are treated as 0.
pub fn normalize(popularity: &BTreeMap<String, f64>, max_replicas: u32) -> BTreeMap<String, u32> {
    let ceiling = max_replicas.max(1);
    let clean = |p: f64| if p.is_finite() { p } else { 0.0 };

    let mut min_p = f64::INFINITY;
    let mut max_p = f64::NEG_INFINITY;
    for p in popularity.values().copied().map(clean) {
        min_p = min_p.min(p);
        max_p = max_p.max(p);
    }

    let (n, m) = coefficients(min_p, max_p, ceiling);
    popularity
        .iter()
        .map(|(name, p)| {
            let p = clean(*p);
            let target = if n == 0.0 {
                1
            } else if p >= max_p {
                ceiling
            } else if p <= min_p {
                1
            } else {
                let raw = (n * p + m + FLOOR_EPSILON).floor();
                (raw as i64).clamp(1, ceiling as i64) as u32
            };
            (name.clone(), target)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(values: &[(&str, f64)]) -> BTreeMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_three_dataset_scenario() {
        let targets = normalize(&map(&[("ds1", 1.0), ("ds2", 5.0), ("ds3", 10.0)]), 5);
        assert_eq!(targets["ds1"], 1);
        assert_eq!(targets["ds3"], 5);
        assert!(targets["ds2"] > 1 && targets["ds2"] < 5);
    }

    #[test]
    fn test_equal_popularity_all_minimum() {
        let targets = normalize(&map(&[("a", 3.0), ("b", 3.0), ("c", 3.0)]), 7);
        assert!(targets.values().all(|&t| t == 1));
    }

    #[test]
    fn test_bounds_and_monotonic() {
        let values: Vec<(String, f64)> = (0..40)
            .map(|i| (format!("ds{:02}", i), (i as f64 * 0.37).sin() * 5.0 - 1.0))
            .collect();
        let pop: BTreeMap<String, f64> = values.iter().cloned().collect();
        let targets = normalize(&pop, 4);

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut last = 0;
        for (name, _) in &sorted {
            let t = targets[name];
            assert!((1..=4).contains(&t));
            assert!(t >= last);
            last = t;
        }
        assert_eq!(targets[&sorted[0].0], 1);
        assert_eq!(targets[&sorted[sorted.len() - 1].0], 4);
    }

    #[test]
    fn test_zero_minimum_matches_linear_formula() {
        // min 0: n = (max_replicas - 1) / max_p, m = 1
        let (n, m) = coefficients(0.0, 8.0, 5);
        assert_eq!(n, 0.5);
        assert_eq!(m, 1.0);
        let targets = normalize(&map(&[("a", 0.0), ("b", 4.0), ("c", 8.0)]), 5);
        assert_eq!(targets["b"], 3);
    }

    #[test]
    fn test_edge_inputs() {
        assert!(normalize(&BTreeMap::new(), 5).is_empty());
        let single = normalize(&map(&[("only", 9.0)]), 5);
        assert_eq!(single["only"], 1);
        let nan = normalize(&map(&[("a", f64::NAN), ("b", 2.0)]), 3);
        assert_eq!(nan["a"], 1);
        assert_eq!(nan["b"], 3);
        let ceiling_one = normalize(&map(&[("a", 0.0), ("b", 2.0)]), 1);
        assert!(ceiling_one.values().all(|&t| t == 1));
    }
}
