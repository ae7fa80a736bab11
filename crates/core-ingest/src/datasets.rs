//! Dataset catalog refresh

use crate::client::{DatasetMetadataClient, ReplicaCatalogClient};
use crate::error::{catalog_to_resilience, IngestError};
use crate::pool::{PoolReport, WorkerPool};
use ballast_core_catalog::{CatalogStore, Dataset};
use ballast_core_resilience::{retry, ResilienceError, RetryPolicy};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Summary of one dataset refresh
#[derive(Debug, Clone)]
pub struct DatasetRefresh {
    /// Datasets the replica catalog reported
    pub listed: usize,
    pub created: usize,
    pub updated: usize,
    /// New datasets skipped for their data tier
    pub filtered: usize,
    /// New datasets already rejected for their tier in an earlier refresh
    pub skipped: usize,
    pub removed: Vec<String>,
    pub pool: PoolReport,
}

/// A dataset seen upstream for the first time
#[derive(Debug, Clone)]
struct NewDataset {
    name: String,
    size_bytes: u64,
    n_files: u64,
    replicas: BTreeSet<String>,
}

impl fmt::Display for NewDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Names of upstream datasets rejected by the tier filter.
///
/// Shared across refreshes so a rejected dataset is not looked up again
/// while it stays listed upstream. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct TierRejections(Arc<Mutex<BTreeSet<String>>>);

impl TierRejections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.0.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.lock().await.is_empty()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.0.lock().await.contains(name)
    }

    async fn insert(&self, name: String) {
        self.0.lock().await.insert(name);
    }

    /// Forget datasets no longer listed upstream and return what is left
    async fn retain_listed(&self, upstream: &BTreeSet<String>) -> BTreeSet<String> {
        let mut rejected = self.0.lock().await;
        rejected.retain(|name| upstream.contains(name));
        rejected.clone()
    }
}

pub struct DatasetIngestor {
    store: Arc<dyn CatalogStore>,
    replicas: Arc<dyn ReplicaCatalogClient>,
    metadata: Arc<dyn DatasetMetadataClient>,
    pool: Arc<WorkerPool>,
    retry: RetryPolicy,
    group: String,
    valid_data_tiers: Arc<Vec<String>>,
    rejections: TierRejections,
}

impl DatasetIngestor {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        replicas: Arc<dyn ReplicaCatalogClient>,
        metadata: Arc<dyn DatasetMetadataClient>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            store,
            replicas,
            metadata,
            pool,
            retry: RetryPolicy::default(),
            group: String::new(),
            valid_data_tiers: Arc::new(Vec::new()),
            rejections: TierRejections::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replica group under management
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Only new datasets in these tiers are admitted; empty admits all
    pub fn with_valid_data_tiers(mut self, tiers: Vec<String>) -> Self {
        self.valid_data_tiers = Arc::new(tiers);
        self
    }

    /// Share the tier rejections remembered by earlier refreshes
    pub fn with_tier_rejections(mut self, rejections: TierRejections) -> Self {
        self.rejections = rejections;
        self
    }

    /// Bring the catalog in line with the replica catalog.
    ///
    /// Known datasets get fresh sizes and replica sets; new ones are looked
    /// up on the worker pool unless their tier was already rejected;
    /// datasets gone upstream are removed.
    pub async fn refresh(&self) -> Result<DatasetRefresh, IngestError> {
        let sites: Vec<String> = self
            .store
            .active_sites()
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();

        let listings = retry(&self.retry, "list_replicas", || {
            self.replicas.list_replicas(&sites, &self.group)
        })
        .await
        .map_err(|e| IngestError::upstream("replica catalog", e))?;

        let mut known: BTreeMap<String, Dataset> = self
            .store
            .list_datasets()
            .await?
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        let upstream: BTreeSet<String> = listings.iter().map(|l| l.dataset.clone()).collect();
        let rejected = self.rejections.retain_listed(&upstream).await;
        let mut fresh = Vec::new();
        let mut updated = 0;
        let mut skipped = 0;

        for listing in &listings {
            let replicas: BTreeSet<String> = listing.complete_sites().into_iter().collect();

            match known.get_mut(&listing.dataset) {
                Some(ds) => {
                    ds.size_bytes = listing.size_bytes();
                    ds.n_files = listing.n_files();
                    ds.replicas = replicas;
                    self.store.upsert_dataset(ds).await?;
                    updated += 1;
                }
                None if rejected.contains(&listing.dataset) => skipped += 1,
                None => fresh.push(NewDataset {
                    name: listing.dataset.clone(),
                    size_bytes: listing.size_bytes(),
                    n_files: listing.n_files(),
                    replicas,
                }),
            }
        }

        let created = Arc::new(AtomicUsize::new(0));
        let filtered = Arc::new(AtomicUsize::new(0));
        let report = {
            let store = self.store.clone();
            let metadata = self.metadata.clone();
            let policy = self.retry.clone();
            let tiers = self.valid_data_tiers.clone();
            let rejections = self.rejections.clone();
            let (created, filtered) = (created.clone(), filtered.clone());

            self.pool
                .run("dataset-metadata", fresh, move |item: NewDataset| {
                    let store = store.clone();
                    let metadata = metadata.clone();
                    let policy = policy.clone();
                    let tiers = tiers.clone();
                    let rejections = rejections.clone();
                    let (created, filtered) = (created.clone(), filtered.clone());
                    async move {
                        let found = retry(&policy, "lookup_dataset", || {
                            metadata.lookup_dataset(&item.name)
                        })
                        .await?;
                        let Some(meta) = found else {
                            return Err(ResilienceError::permanent(format!(
                                "no metadata for {}",
                                item.name
                            )));
                        };

                        if !tiers.is_empty() && !tiers.iter().any(|t| *t == meta.data_tier) {
                            debug!(dataset = %item.name, tier = %meta.data_tier, "tier not managed, skipping");
                            filtered.fetch_add(1, Ordering::Relaxed);
                            rejections.insert(item.name).await;
                            return Ok(());
                        }

                        let dataset = Dataset {
                            name: item.name,
                            size_bytes: item.size_bytes,
                            n_files: item.n_files,
                            data_tier: meta.data_tier,
                            physics_group: meta.physics_group,
                            primary_name: meta.primary_name,
                            ds_type: meta.ds_type,
                            creation_date: meta.creation_date,
                            replicas: item.replicas,
                        };
                        store
                            .upsert_dataset(&dataset)
                            .await
                            .map_err(catalog_to_resilience)?;
                        created.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                })
                .await
        };

        if report.cancelled {
            return Err(IngestError::Cancelled);
        }

        let mut removed = Vec::new();
        if upstream.is_empty() && !known.is_empty() {
            warn!(
                known = known.len(),
                "replica catalog listed no datasets, keeping the catalog as is"
            );
        } else {
            for name in known.keys().filter(|n| !upstream.contains(*n)) {
                if self.store.remove_dataset(name).await? {
                    debug!(dataset = %name, "removed, no longer upstream");
                    removed.push(name.clone());
                }
            }
        }

        let summary = DatasetRefresh {
            listed: listings.len(),
            created: created.load(Ordering::Relaxed),
            updated,
            filtered: filtered.load(Ordering::Relaxed),
            skipped,
            removed,
            pool: report,
        };
        info!(
            listed = summary.listed,
            created = summary.created,
            updated = summary.updated,
            filtered = summary.filtered,
            skipped = summary.skipped,
            removed = summary.removed.len(),
            failed = summary.pool.failed(),
            "dataset catalog refreshed"
        );
        Ok(summary)
    }
}
