//! Catalog entities
//!
//! Sizes are carried in bytes everywhere; [`BYTES_PER_GB`] converts for the
//! size-normalized popularity scores and for human-readable summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Decimal gigabyte, as used by the storage accounting of every site
pub const BYTES_PER_GB: f64 = 1e9;

/// A named collection of files tracked as one replication unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Dataset {
    pub name: String,
    pub size_bytes: u64,
    pub n_files: u64,
    #[serde(default)]
    pub data_tier: String,
    #[serde(default)]
    pub physics_group: String,
    #[serde(default)]
    pub primary_name: String,
    #[serde(default)]
    pub ds_type: String,
    #[serde(default)]
    pub creation_date: Option<NaiveDate>,
    /// Sites holding a complete copy of every block
    #[serde(default)]
    pub replicas: BTreeSet<String>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, size_bytes: u64, n_files: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            n_files,
            ..Default::default()
        }
    }

    /// Builder-style replica set assignment
    pub fn with_replicas<I, S>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replicas = sites.into_iter().map(Into::into).collect();
        self
    }

    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_GB
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}

/// A storage site in the federation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Site {
    pub name: String,
    pub quota_bytes: u64,
    pub used_bytes: u64,
    /// Usage above this makes the site a cleanup candidate
    pub soft_limit_bytes: u64,
    /// Capacity-weighted CPU metric
    pub performance: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Site {
    /// Free space for allocation, never negative
    pub fn available_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_bytes)
    }

    /// Signed distance above the soft limit
    pub fn overage_bytes(&self) -> i64 {
        self.used_bytes as i64 - self.soft_limit_bytes as i64
    }
}

/// Access metrics for one dataset on one day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopularityRecord {
    pub dataset: String,
    pub date: NaiveDate,
    pub accesses: u64,
    pub cpu_seconds: f64,
    pub users: u64,
}

impl PopularityRecord {
    /// Zero-valued record used to fill days with no recorded activity
    pub fn zero(dataset: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            dataset: dataset.into(),
            date,
            accesses: 0,
            cpu_seconds: 0.0,
            users: 0,
        }
    }

    /// Per-day popularity unit: accesses times CPU seconds
    pub fn activity(&self) -> f64 {
        self.accesses as f64 * self.cpu_seconds
    }
}

/// Whether a ranking record describes a dataset or a site
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RankingKind {
    Dataset,
    Site,
}

impl fmt::Display for RankingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingKind::Dataset => write!(f, "dataset"),
            RankingKind::Site => write!(f, "site"),
        }
    }
}

impl std::str::FromStr for RankingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dataset" => Ok(RankingKind::Dataset),
            "site" => Ok(RankingKind::Site),
            other => Err(format!("invalid ranking kind: {}", other)),
        }
    }
}

/// Score produced by one ranking pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingRecord {
    pub name: String,
    pub date: NaiveDate,
    pub strategy: String,
    pub kind: RankingKind,
    pub popularity: f64,
    /// Target replica count for datasets, allocation priority for sites
    pub rank: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Replicate,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Replicate => write!(f, "replicate"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// A replica change proposed by the balancer for one cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Action {
    pub dataset: String,
    pub site: String,
    pub kind: ActionKind,
}

impl Action {
    pub fn replicate(dataset: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            site: site.into(),
            kind: ActionKind::Replicate,
        }
    }

    pub fn delete(dataset: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            site: site.into(),
            kind: ActionKind::Delete,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}", self.kind, self.dataset, self.site)
    }
}
