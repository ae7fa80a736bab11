//! Ballast Catalog: datasets, sites and popularity behind one store trait
//!
//! # Overview
//!
//! The catalog is the only state shared between the ingestion workers and
//! the ranking/balancing passes. Every write goes through an atomic
//! upsert keyed by the entity's natural key, so concurrent workers never
//! lose each other's updates:
//!
//! | Entity | Key |
//! |---|---|
//! | [`Dataset`] | name |
//! | [`Site`] | name |
//! | [`PopularityRecord`] | (dataset, date) |
//! | [`RankingRecord`] | (kind, name, date, strategy) |
//!
//! The catalog exclusively owns replica-set mutation. Outside ingestion,
//! replica sets change only through [`CatalogStore::apply_replica_changes`].
//!
//! # Example
//!
//! ```no_run
//! use ballast_core_catalog::{CatalogStore, Dataset};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ballast_core_catalog::open_store("catalog.db").await?;
//!
//!     store
//!         .upsert_dataset(&Dataset::new("/Alpha/Run1/AOD", 10_000_000_000, 120))
//!         .await?;
//!     assert_eq!(store.list_datasets().await?.len(), 1);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;

pub mod backends;
pub mod error;
pub mod model;

pub use backends::memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use backends::sqlite::SqliteStore;
pub use error::{CatalogError, Result};
pub use model::{
    Action, ActionKind, Dataset, PopularityRecord, RankingKind, RankingRecord, Site, BYTES_PER_GB,
};

/// Core trait for catalog storage backends
///
/// All methods take `&self`: backends synchronize internally so one store
/// can be shared by every ingestion worker.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace a dataset, including its replica set
    async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()>;

    async fn get_dataset(&self, name: &str) -> Result<Option<Dataset>>;

    /// All datasets, ordered by name
    async fn list_datasets(&self) -> Result<Vec<Dataset>>;

    async fn dataset_names(&self) -> Result<BTreeSet<String>>;

    /// Remove a dataset and its replicas. Returns whether it existed.
    async fn remove_dataset(&self, name: &str) -> Result<bool>;

    /// Add subscribed sites to, and remove deleted sites from, replica sets.
    ///
    /// Actions naming unknown datasets are skipped. Returns the number of
    /// replica entries that changed.
    async fn apply_replica_changes(
        &self,
        subscriptions: &[Action],
        deletions: &[Action],
    ) -> Result<usize>;

    async fn upsert_site(&self, site: &Site) -> Result<()>;

    /// All sites, ordered by name
    async fn list_sites(&self) -> Result<Vec<Site>>;

    async fn active_sites(&self) -> Result<Vec<Site>> {
        Ok(self
            .list_sites()
            .await?
            .into_iter()
            .filter(|s| s.active)
            .collect())
    }

    async fn set_site_active(&self, name: &str, active: bool) -> Result<()>;

    /// Insert or replace the record for `(dataset, date)`
    async fn upsert_popularity(&self, record: &PopularityRecord) -> Result<()>;

    /// Records of one dataset with `start <= date <= end`, ordered by date
    async fn popularity_range(
        &self,
        dataset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PopularityRecord>>;

    /// Records of every dataset with `start <= date <= end`
    async fn popularity_since(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PopularityRecord>>;

    async fn latest_popularity_date(&self) -> Result<Option<NaiveDate>>;

    /// Insert zero records for the given days where none exist yet.
    ///
    /// Existing records are never overwritten. Returns the number inserted.
    async fn fill_missing_popularity(&self, dataset: &str, dates: &[NaiveDate]) -> Result<usize>;

    async fn upsert_ranking(&self, record: &RankingRecord) -> Result<()>;

    /// Write a ranking record unless one exists for its kind, name, date
    /// and strategy. Returns whether it was written.
    async fn insert_ranking_if_absent(&self, record: &RankingRecord) -> Result<bool>;

    /// Ranking records of one kind for one date and strategy, ordered by name
    async fn rankings(
        &self,
        kind: RankingKind,
        date: NaiveDate,
        strategy: &str,
    ) -> Result<Vec<RankingRecord>>;
}

/// Open a catalog store at the specified path
///
/// `:memory:` (or an empty path) selects the in-memory store; anything
/// else is treated as a SQLite database file.
#[allow(clippy::needless_return)]
pub async fn open_store(path: &str) -> Result<Arc<dyn CatalogStore>> {
    if path.is_empty() || path == ":memory:" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        let store = SqliteStore::open(path).await?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "sqlite"))]
    Err(CatalogError::NoBackend(path.to_string()))
}
