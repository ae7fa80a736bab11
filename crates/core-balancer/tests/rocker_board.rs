//! Randomized universes checked against the balancer's guarantees

use ballast_core_balancer::{CleanInput, NeedTable, ReplicateInput, RockerBoard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

const GB: u64 = 1_000_000_000;

struct Universe {
    needs: NeedTable,
    input: ReplicateInput,
    datasets: usize,
    sites: usize,
    largest: u64,
}

fn universe(seed: u64) -> Universe {
    let mut rng = StdRng::seed_from_u64(seed);
    let sites = rng.random_range(1..8);
    let datasets = rng.random_range(1..25);
    let site_names: Vec<String> = (0..sites).map(|i| format!("T2_{i:02}")).collect();

    let mut needs = NeedTable::new();
    let mut largest = 0;
    for d in 0..datasets {
        let size = rng.random_range(1..50) * GB;
        largest = largest.max(size);
        let holders: Vec<String> = site_names
            .iter()
            .filter(|_| rng.random_bool(0.3))
            .cloned()
            .collect();
        needs.insert(format!("/DS{d:03}"), rng.random_range(-3..5), size, holders);
    }

    let input = ReplicateInput {
        site_ranks: site_names
            .iter()
            .map(|s| (s.clone(), rng.random_range(-0.5..3.0)))
            .collect(),
        available_bytes: site_names
            .iter()
            .map(|s| (s.clone(), rng.random_range(0..400) * GB))
            .collect(),
        max_bytes: rng.random_range(0..600) * GB,
    };

    Universe {
        needs,
        input,
        datasets,
        sites,
        largest,
    }
}

#[test]
fn replicate_respects_budget_and_never_duplicates() {
    for seed in 0..200 {
        let mut u = universe(seed);
        let before = u.needs.clone();
        let out = RockerBoard::seeded(seed).replicate(&mut u.needs, &u.input);

        // bounded iteration count
        assert!(out.subscriptions.len() <= u.datasets * u.sites, "seed {seed}");

        // budget overshoot by at most one dataset
        assert!(
            out.replicated_bytes <= u.input.max_bytes + u.largest,
            "seed {seed}"
        );

        let mut seen = BTreeSet::new();
        for action in &out.subscriptions {
            let entry = before.get(&action.dataset).unwrap();
            assert!(!entry.holders.contains(&action.site), "seed {seed}");
            assert!(seen.insert((action.dataset.clone(), action.site.clone())));
            assert!(u.input.site_ranks[&action.site] > 0.0, "seed {seed}");
        }

        // no site over-committed
        let mut used: BTreeMap<&str, u64> = BTreeMap::new();
        for action in &out.subscriptions {
            *used.entry(action.site.as_str()).or_default() +=
                before.get(&action.dataset).unwrap().size_bytes;
        }
        for (site, bytes) in used {
            assert!(bytes <= u.input.available_bytes[site], "seed {seed}");
        }
    }
}

#[test]
fn clean_reduces_overage_one_unit_at_a_time() {
    for seed in 0..200 {
        let mut u = universe(seed);
        let mut board = RockerBoard::seeded(seed);
        board.replicate(&mut u.needs, &u.input);
        let before = u.needs.clone();

        let overage: BTreeMap<String, i64> = u
            .input
            .site_ranks
            .keys()
            .enumerate()
            .map(|(i, s)| (s.clone(), (i as i64 - 2) * 20 * GB as i64))
            .collect();
        let out = board.clean(&mut u.needs, &CleanInput {
            overage: overage.clone(),
        });

        let mut remaining = overage.clone();
        let mut deletions_per_dataset: BTreeMap<&str, i64> = BTreeMap::new();
        for action in &out.deletions {
            let entry = before.get(&action.dataset).unwrap();
            assert!(entry.holders.contains(&action.site), "seed {seed}");
            assert!(!entry.pending.contains(&action.site), "seed {seed}");

            let o = remaining.get_mut(&action.site).unwrap();
            assert!(*o > 0, "seed {seed}: deleted from a site not over its limit");
            let reduced = *o - entry.size_bytes as i64;
            assert!(reduced < *o);
            *o = reduced;
            *deletions_per_dataset.entry(action.dataset.as_str()).or_default() += 1;
        }

        for (name, count) in deletions_per_dataset {
            assert_eq!(
                u.needs.need(name).unwrap(),
                before.need(name).unwrap() + count,
                "seed {seed}"
            );
        }
    }
}

#[test]
fn same_seed_same_actions() {
    let mut a = universe(77);
    let mut b = universe(77);
    let out_a = RockerBoard::seeded(1).replicate(&mut a.needs, &a.input);
    let out_b = RockerBoard::seeded(1).replicate(&mut b.needs, &b.input);
    assert_eq!(out_a, out_b);
}
