//! Ballast Core Ingest: concurrent catalog ingestion
//!
//! Pulls site, dataset and popularity state from upstream services into a
//! [`ballast_core_catalog::CatalogStore`]. Per-item work runs on a bounded
//! [`WorkerPool`]; each item is retried with backoff and, if it still
//! fails, dead-lettered without disturbing the rest of the batch.
//!
//! Upstream services sit behind the traits in [`client`]. [`JsonDirClient`]
//! implements all of them over a directory of JSON files, which is what the
//! binary uses for offline runs and what the tests use as fixtures.

pub mod client;
pub mod datasets;
pub mod error;
pub mod json_dir;
pub mod notify;
pub mod pool;
pub mod popularity;
pub mod sites;

pub use client::{
    AccessStat, BlockListing, BlockReplica, ClientResult, DatasetMetadata,
    DatasetMetadataClient, PopularityCatalogClient, ReplicaCatalogClient, ReplicaListing,
    RequestId, SiteRegistryClient,
};
pub use datasets::{DatasetIngestor, DatasetRefresh, TierRejections};
pub use error::IngestError;
pub use json_dir::{JsonDirClient, SubmissionRecord};
pub use notify::{LogNotifier, Notifier};
pub use pool::{PoolReport, WorkerPool};
pub use popularity::{PopularityIngestor, PopularityRefresh, DEFAULT_HISTORY_DAYS};
pub use sites::{SiteIngestor, SiteRefresh};
