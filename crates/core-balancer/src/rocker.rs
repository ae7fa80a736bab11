//! The Rocker Board: replicate popular datasets, clean over-full sites
//!
//! Both phases are loops over a [`NeedTable`] that end when the budget or
//! the candidates run out. Running out of candidates is a normal outcome,
//! so neither phase can fail.
//!
//! Each iteration selects from a snapshot of the candidate keys and only
//! then mutates the table and the site pool.

use crate::chooser::WeightedChooser;
use crate::need::NeedTable;
use ballast_core_catalog::Action;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Inputs of the replicate phase
#[derive(Debug, Clone, Default)]
pub struct ReplicateInput {
    pub site_ranks: BTreeMap<String, f64>,
    pub available_bytes: BTreeMap<String, u64>,
    /// Replication budget for the cycle
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplicateOutcome {
    pub subscriptions: Vec<Action>,
    pub replicated_bytes: u64,
    /// Datasets no eligible site could take
    pub dropped: Vec<String>,
}

/// Inputs of the clean phase
#[derive(Debug, Clone, Default)]
pub struct CleanInput {
    /// Bytes above the soft limit per site, pending replications included
    pub overage: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanOutcome {
    pub deletions: Vec<Action>,
    pub deleted_bytes: u64,
    /// Datasets with no replica on an over-limit site
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct PoolSite {
    rank: f64,
    available: u64,
}

pub struct RockerBoard {
    chooser: WeightedChooser,
}

impl RockerBoard {
    pub fn new(chooser: WeightedChooser) -> Self {
        Self { chooser }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(WeightedChooser::from_seed(seed))
    }

    /// Propose replications until the budget is spent, the sites are full,
    /// or no dataset needs another copy.
    pub fn replicate(&mut self, needs: &mut NeedTable, input: &ReplicateInput) -> ReplicateOutcome {
        let mut pool: BTreeMap<String, PoolSite> = input
            .site_ranks
            .iter()
            .filter_map(|(site, rank)| {
                let available = input.available_bytes.get(site).copied().unwrap_or(0);
                (available > 0).then(|| {
                    (
                        site.clone(),
                        PoolSite {
                            rank: *rank,
                            available,
                        },
                    )
                })
            })
            .collect();
        let mut candidates: BTreeSet<String> = needs.names().cloned().collect();
        let mut outcome = ReplicateOutcome::default();

        while outcome.replicated_bytes < input.max_bytes && !pool.is_empty() {
            let Some((name, need)) = needs.most_needed(&candidates) else {
                break;
            };
            if need < 1 {
                break;
            }
            let name = name.clone();
            let Some(entry) = needs.get_mut(&name) else {
                break;
            };
            let size = entry.size_bytes;

            let eligible: Vec<(String, f64)> = pool
                .iter()
                .filter(|(site, p)| !entry.covers(site) && p.available >= size && p.rank > 0.0)
                .map(|(site, p)| (site.clone(), p.rank))
                .collect();

            let Some(site) = self.chooser.choose(&eligible).cloned() else {
                debug!(dataset = %name, need, "no eligible site, dropping");
                candidates.remove(&name);
                outcome.dropped.push(name);
                continue;
            };

            entry.need -= 1;
            entry.pending.insert(site.clone());
            if let Some(p) = pool.get_mut(&site) {
                p.available = p.available.saturating_sub(size);
                if p.available == 0 {
                    pool.remove(&site);
                }
            }
            outcome.replicated_bytes += size;
            debug!(dataset = %name, site = %site, size, "replicate");
            outcome.subscriptions.push(Action::replicate(name, site));
        }

        info!(
            subscriptions = outcome.subscriptions.len(),
            replicated_bytes = outcome.replicated_bytes,
            dropped = outcome.dropped.len(),
            "replicate phase finished"
        );
        outcome
    }

    /// Propose deletions from sites above their soft limit, least needed
    /// datasets first, until no site is over.
    pub fn clean(&mut self, needs: &mut NeedTable, input: &CleanInput) -> CleanOutcome {
        let mut overage: BTreeMap<String, i64> = input
            .overage
            .iter()
            .filter(|(_, o)| **o > 0)
            .map(|(s, o)| (s.clone(), *o))
            .collect();
        let mut candidates: BTreeSet<String> = needs
            .iter()
            .filter(|(_, e)| !e.holders.is_empty() && e.size_bytes > 0)
            .map(|(name, _)| name.clone())
            .collect();
        let mut outcome = CleanOutcome::default();

        while !overage.is_empty() {
            let Some((name, need)) = needs.least_needed(&candidates) else {
                break;
            };
            let name = name.clone();
            let Some(entry) = needs.get_mut(&name) else {
                break;
            };
            let size = entry.size_bytes;

            let eligible: Vec<(String, f64)> = entry
                .holders
                .iter()
                .filter_map(|site| overage.get(site).map(|o| (site.clone(), *o as f64)))
                .collect();

            let Some(site) = self.chooser.choose(&eligible).cloned() else {
                candidates.remove(&name);
                outcome.dropped.push(name);
                continue;
            };

            entry.need += 1;
            entry.holders.remove(&site);
            if entry.holders.is_empty() {
                candidates.remove(&name);
            }
            if let Some(o) = overage.get_mut(&site) {
                *o -= size as i64;
                if *o <= 0 {
                    overage.remove(&site);
                }
            }
            outcome.deleted_bytes += size;
            debug!(dataset = %name, site = %site, need, size, "delete");
            outcome.deletions.push(Action::delete(name, site));
        }

        info!(
            deletions = outcome.deletions.len(),
            deleted_bytes = outcome.deleted_bytes,
            dropped = outcome.dropped.len(),
            "clean phase finished"
        );
        outcome
    }
}
