//! In-memory backend
//!
//! Every operation takes the lock once, so each upsert is a single
//! critical section. Used by tests and by dry runs with `:memory:`.

use crate::{
    Action, CatalogStore, Dataset, PopularityRecord, RankingKind, RankingRecord, Result, Site,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    datasets: BTreeMap<String, Dataset>,
    sites: BTreeMap<String, Site>,
    popularity: BTreeMap<(String, NaiveDate), PopularityRecord>,
    rankings: BTreeMap<(RankingKind, String, NaiveDate, String), RankingRecord>,
}

/// Lock-guarded map store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .datasets
            .insert(dataset.name.clone(), dataset.clone());
        Ok(())
    }

    async fn get_dataset(&self, name: &str) -> Result<Option<Dataset>> {
        Ok(self.tables.read().await.datasets.get(name).cloned())
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        Ok(self.tables.read().await.datasets.values().cloned().collect())
    }

    async fn dataset_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.tables.read().await.datasets.keys().cloned().collect())
    }

    async fn remove_dataset(&self, name: &str) -> Result<bool> {
        Ok(self.tables.write().await.datasets.remove(name).is_some())
    }

    async fn apply_replica_changes(
        &self,
        subscriptions: &[Action],
        deletions: &[Action],
    ) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;

        for action in subscriptions {
            if let Some(ds) = tables.datasets.get_mut(&action.dataset) {
                if ds.replicas.insert(action.site.clone()) {
                    changed += 1;
                }
            }
        }
        for action in deletions {
            if let Some(ds) = tables.datasets.get_mut(&action.dataset) {
                if ds.replicas.remove(&action.site) {
                    changed += 1;
                }
            }
        }

        Ok(changed)
    }

    async fn upsert_site(&self, site: &Site) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.sites.insert(site.name.clone(), site.clone());
        Ok(())
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        Ok(self.tables.read().await.sites.values().cloned().collect())
    }

    async fn set_site_active(&self, name: &str, active: bool) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.sites.get_mut(name) {
            Some(site) => {
                site.active = active;
                Ok(())
            }
            None => Err(crate::CatalogError::UnknownSite(name.to_string())),
        }
    }

    async fn upsert_popularity(&self, record: &PopularityRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .popularity
            .insert((record.dataset.clone(), record.date), record.clone());
        Ok(())
    }

    async fn popularity_range(
        &self,
        dataset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PopularityRecord>> {
        if start > end {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        let lo = (dataset.to_string(), start);
        let hi = (dataset.to_string(), end);
        Ok(tables
            .popularity
            .range(lo..=hi)
            .map(|(_, rec)| rec.clone())
            .collect())
    }

    async fn popularity_since(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PopularityRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .popularity
            .values()
            .filter(|rec| rec.date >= start && rec.date <= end)
            .cloned()
            .collect())
    }

    async fn latest_popularity_date(&self) -> Result<Option<NaiveDate>> {
        let tables = self.tables.read().await;
        Ok(tables.popularity.values().map(|rec| rec.date).max())
    }

    async fn fill_missing_popularity(&self, dataset: &str, dates: &[NaiveDate]) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let mut inserted = 0;
        for date in dates {
            let key = (dataset.to_string(), *date);
            if !tables.popularity.contains_key(&key) {
                tables
                    .popularity
                    .insert(key, PopularityRecord::zero(dataset, *date));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn upsert_ranking(&self, record: &RankingRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.rankings.insert(
            (
                record.kind,
                record.name.clone(),
                record.date,
                record.strategy.clone(),
            ),
            record.clone(),
        );
        Ok(())
    }

    async fn insert_ranking_if_absent(&self, record: &RankingRecord) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let key = (
            record.kind,
            record.name.clone(),
            record.date,
            record.strategy.clone(),
        );
        if tables.rankings.contains_key(&key) {
            return Ok(false);
        }
        tables.rankings.insert(key, record.clone());
        Ok(true)
    }

    async fn rankings(
        &self,
        kind: RankingKind,
        date: NaiveDate,
        strategy: &str,
    ) -> Result<Vec<RankingRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rankings
            .values()
            .filter(|r| r.kind == kind && r.date == date && r.strategy == strategy)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_per_dataset() {
        let store = MemoryStore::new();
        for d in 1..=5 {
            store
                .upsert_popularity(&PopularityRecord::zero("/A", day(d)))
                .await
                .unwrap();
            store
                .upsert_popularity(&PopularityRecord::zero("/B", day(d)))
                .await
                .unwrap();
        }

        let recs = store.popularity_range("/A", day(2), day(4)).await.unwrap();
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.dataset == "/A"));
        assert!(store
            .popularity_range("/A", day(4), day(2))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..32u32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let rec = PopularityRecord {
                    dataset: format!("/DS{}", i % 4),
                    date: day(1 + i / 4),
                    accesses: i as u64,
                    cpu_seconds: 1.0,
                    users: 1,
                };
                store.upsert_popularity(&rec).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let all = store.popularity_since(day(1), day(31)).await.unwrap();
        assert_eq!(all.len(), 32);
    }
}
