//! Upstream catalog interfaces
//!
//! Every call returns [`ResilienceError`] so callers can wrap it in
//! [`retry`](ballast_core_resilience::retry) and let transient failures
//! be retried while permanent ones fail fast.

use async_trait::async_trait;
use ballast_core_catalog::Site;
use ballast_core_resilience::ResilienceError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ClientResult<T> = Result<T, ResilienceError>;

/// Identifier the replica catalog assigns to an accepted request
pub type RequestId = u64;

/// One site's share of a block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockReplica {
    pub site: String,
    pub files: u64,
    /// Owning group; empty matches any group filter
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockListing {
    pub bytes: u64,
    pub files: u64,
    #[serde(default)]
    pub replicas: Vec<BlockReplica>,
}

/// A dataset as reported by the replica catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaListing {
    pub dataset: String,
    #[serde(default)]
    pub blocks: Vec<BlockListing>,
}

impl ReplicaListing {
    pub fn size_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.bytes).sum()
    }

    pub fn n_files(&self) -> u64 {
        self.blocks.iter().map(|b| b.files).sum()
    }

    /// Sites whose files across all blocks add up to the whole dataset
    pub fn complete_sites(&self) -> Vec<String> {
        let total = self.n_files();
        if total == 0 {
            return Vec::new();
        }
        let mut per_site: BTreeMap<&str, u64> = BTreeMap::new();
        for block in &self.blocks {
            for replica in &block.replicas {
                *per_site.entry(replica.site.as_str()).or_default() += replica.files;
            }
        }
        per_site
            .into_iter()
            .filter(|(_, files)| *files == total)
            .map(|(site, _)| site.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DatasetMetadata {
    #[serde(default)]
    pub primary_name: String,
    #[serde(default)]
    pub physics_group: String,
    #[serde(default)]
    pub data_tier: String,
    #[serde(default)]
    pub creation_date: Option<NaiveDate>,
    #[serde(default)]
    pub ds_type: String,
}

/// Access totals for one dataset on one day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessStat {
    pub dataset: String,
    pub accesses: u64,
    pub cpu_seconds: f64,
    pub users: u64,
}

#[async_trait]
pub trait ReplicaCatalogClient: Send + Sync {
    /// Replicas held at `sites` (all sites when empty) by `group`
    async fn list_replicas(&self, sites: &[String], group: &str)
        -> ClientResult<Vec<ReplicaListing>>;

    async fn submit_replication(
        &self,
        site: &str,
        datasets: &[String],
        group: &str,
    ) -> ClientResult<RequestId>;

    async fn submit_deletion(
        &self,
        site: &str,
        datasets: &[String],
        group: &str,
    ) -> ClientResult<RequestId>;
}

#[async_trait]
pub trait DatasetMetadataClient: Send + Sync {
    /// `None` when the catalog has no record of the dataset
    async fn lookup_dataset(&self, name: &str) -> ClientResult<Option<DatasetMetadata>>;
}

#[async_trait]
pub trait PopularityCatalogClient: Send + Sync {
    async fn access_stats(&self, date: NaiveDate) -> ClientResult<Vec<AccessStat>>;
}

#[async_trait]
pub trait SiteRegistryClient: Send + Sync {
    async fn list_sites(&self) -> ClientResult<Vec<Site>>;
}
