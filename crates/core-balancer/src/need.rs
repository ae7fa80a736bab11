//! Per-dataset replica need, threaded through both balancer phases

use ballast_core_catalog::Dataset;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeedEntry {
    /// Target minus current replicas; positive means under-replicated
    pub need: i64,
    pub size_bytes: u64,
    /// Sites holding a complete replica at cycle start
    pub holders: BTreeSet<String>,
    /// Sites a replication was proposed to during this cycle
    pub pending: BTreeSet<String>,
}

impl NeedEntry {
    /// Holds or is about to hold a copy at `site`
    pub fn covers(&self, site: &str) -> bool {
        self.holders.contains(site) || self.pending.contains(site)
    }
}

/// Mutable need bookkeeping for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeedTable {
    entries: BTreeMap<String, NeedEntry>,
}

impl NeedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `need = target - |replicas|` for every dataset that has a target
    pub fn from_targets<'a, I>(datasets: I, targets: &BTreeMap<String, u32>) -> Self
    where
        I: IntoIterator<Item = &'a Dataset>,
    {
        let mut table = Self::new();
        for ds in datasets {
            if let Some(target) = targets.get(&ds.name) {
                table.insert(
                    ds.name.clone(),
                    *target as i64 - ds.replicas.len() as i64,
                    ds.size_bytes,
                    ds.replicas.iter().cloned(),
                );
            }
        }
        table
    }

    pub fn insert<I, S>(&mut self, name: impl Into<String>, need: i64, size_bytes: u64, holders: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            name.into(),
            NeedEntry {
                need,
                size_bytes,
                holders: holders.into_iter().map(Into::into).collect(),
                pending: BTreeSet::new(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&NeedEntry> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut NeedEntry> {
        self.entries.get_mut(name)
    }

    pub fn need(&self, name: &str) -> Option<i64> {
        self.entries.get(name).map(|e| e.need)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NeedEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest need among `candidates`, ties to the smallest name
    pub(crate) fn most_needed<'a>(&self, candidates: &'a BTreeSet<String>) -> Option<(&'a String, i64)> {
        let mut best: Option<(&String, i64)> = None;
        for name in candidates {
            if let Some(entry) = self.entries.get(name) {
                if best.is_none_or(|(_, need)| entry.need > need) {
                    best = Some((name, entry.need));
                }
            }
        }
        best
    }

    /// Lowest need among `candidates`, ties to the smallest name
    pub(crate) fn least_needed<'a>(
        &self,
        candidates: &'a BTreeSet<String>,
    ) -> Option<(&'a String, i64)> {
        let mut best: Option<(&String, i64)> = None;
        for name in candidates {
            if let Some(entry) = self.entries.get(name) {
                if best.is_none_or(|(_, need)| entry.need < need) {
                    best = Some((name, entry.need));
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_targets() {
        let datasets = vec![
            Dataset::new("/A", 10, 1).with_replicas(["S1", "S2", "S3"]),
            Dataset::new("/B", 20, 1).with_replicas(["S1"]),
            Dataset::new("/untargeted", 5, 1),
        ];
        let targets = BTreeMap::from([("/A".to_string(), 1), ("/B".to_string(), 4)]);
        let table = NeedTable::from_targets(&datasets, &targets);

        assert_eq!(table.len(), 2);
        assert_eq!(table.need("/A"), Some(-2));
        assert_eq!(table.need("/B"), Some(3));
        assert_eq!(table.need("/untargeted"), None);
        assert!(table.get("/A").unwrap().covers("S2"));
    }

    #[test]
    fn test_extremes_break_ties_by_name() {
        let mut table = NeedTable::new();
        table.insert("/b", 2, 1, ["S1"]);
        table.insert("/a", 2, 1, ["S1"]);
        table.insert("/c", -1, 1, ["S1"]);
        table.insert("/d", -1, 1, ["S1"]);
        let all: BTreeSet<String> = table.names().cloned().collect();

        assert_eq!(table.most_needed(&all), Some((&"/a".to_string(), 2)));
        assert_eq!(table.least_needed(&all), Some((&"/c".to_string(), -1)));
        assert_eq!(table.most_needed(&BTreeSet::new()), None);
    }
}
