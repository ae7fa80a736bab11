//! File-backed upstream catalogs
//!
//! Serves all four client traits from a data directory:
//!
//! ```text
//! <root>/sites.json                  [Site]
//! <root>/replicas.json               [ReplicaListing]
//! <root>/datasets.json               {name: DatasetMetadata}
//! <root>/popularity/YYYY-MM-DD.json  [AccessStat]
//! <root>/rejections.json             [site]   (optional)
//! <root>/requests.jsonl              submissions, appended
//! ```
//!
//! A missing popularity file means no recorded access that day. Sites
//! listed in `rejections.json` have their submissions refused.

use crate::client::{
    AccessStat, ClientResult, DatasetMetadata, DatasetMetadataClient, PopularityCatalogClient,
    ReplicaCatalogClient, ReplicaListing, RequestId, SiteRegistryClient,
};
use async_trait::async_trait;
use ballast_core_catalog::{ActionKind, Site};
use ballast_core_resilience::ResilienceError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// One line of `requests.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionRecord {
    pub request_id: RequestId,
    pub kind: ActionKind,
    pub site: String,
    pub datasets: Vec<String>,
    pub group: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct JsonDirClient {
    root: PathBuf,
    next_request: AtomicU64,
    append_lock: Mutex<()>,
}

impl JsonDirClient {
    pub const SITES_FILE: &'static str = "sites.json";
    pub const REPLICAS_FILE: &'static str = "replicas.json";
    pub const DATASETS_FILE: &'static str = "datasets.json";
    pub const POPULARITY_DIR: &'static str = "popularity";
    pub const REJECTIONS_FILE: &'static str = "rejections.json";
    pub const REQUESTS_FILE: &'static str = "requests.jsonl";

    /// Open a data directory; request ids continue after any earlier run
    pub async fn open(root: impl Into<PathBuf>) -> ClientResult<Self> {
        let root = root.into();
        let existing = match tokio::fs::read_to_string(root.join(Self::REQUESTS_FILE)).await {
            Ok(text) => text.lines().filter(|l| !l.trim().is_empty()).count() as u64,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root,
            next_request: AtomicU64::new(existing + 1),
            append_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn popularity_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(Self::POPULARITY_DIR)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// All submissions recorded so far
    pub async fn submissions(&self) -> ClientResult<Vec<SubmissionRecord>> {
        let text = match tokio::fs::read_to_string(self.root.join(Self::REQUESTS_FILE)).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| ResilienceError::permanent(e.to_string())))
            .collect()
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> ClientResult<Option<T>> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map(Some).map_err(|e| {
            ResilienceError::permanent(format!("malformed {}: {}", path.display(), e))
        })
    }

    async fn read_required<T: DeserializeOwned>(&self, name: &str) -> ClientResult<T> {
        let path = self.root.join(name);
        self.read_json(&path).await?.ok_or_else(|| {
            ResilienceError::permanent(format!("missing {}", path.display()))
        })
    }

    async fn submit(
        &self,
        kind: ActionKind,
        site: &str,
        datasets: &[String],
        group: &str,
    ) -> ClientResult<RequestId> {
        let rejected: Vec<String> = self
            .read_json(&self.root.join(Self::REJECTIONS_FILE))
            .await?
            .unwrap_or_default();
        if rejected.iter().any(|s| s == site) {
            return Err(ResilienceError::permanent(format!(
                "{} request refused for site {}",
                kind, site
            )));
        }

        let _guard = self.append_lock.lock().await;
        let record = SubmissionRecord {
            request_id: self.next_request.fetch_add(1, Ordering::SeqCst),
            kind,
            site: site.to_string(),
            datasets: datasets.to_vec(),
            group: group.to_string(),
            submitted_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| ResilienceError::permanent(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(Self::REQUESTS_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(request_id = record.request_id, kind = %kind, site, datasets = datasets.len(), "request recorded");
        Ok(record.request_id)
    }
}

#[async_trait]
impl ReplicaCatalogClient for JsonDirClient {
    async fn list_replicas(
        &self,
        sites: &[String],
        group: &str,
    ) -> ClientResult<Vec<ReplicaListing>> {
        let listings: Vec<ReplicaListing> = self.read_required(Self::REPLICAS_FILE).await?;

        let wanted = |site: &str| sites.is_empty() || sites.iter().any(|s| s == site);
        let owned = |g: &str| g.is_empty() || group.is_empty() || g == group;

        Ok(listings
            .into_iter()
            .filter_map(|mut listing| {
                for block in &mut listing.blocks {
                    block
                        .replicas
                        .retain(|r| wanted(&r.site) && owned(&r.group));
                }
                listing
                    .blocks
                    .iter()
                    .any(|b| !b.replicas.is_empty())
                    .then_some(listing)
            })
            .collect())
    }

    async fn submit_replication(
        &self,
        site: &str,
        datasets: &[String],
        group: &str,
    ) -> ClientResult<RequestId> {
        self.submit(ActionKind::Replicate, site, datasets, group).await
    }

    async fn submit_deletion(
        &self,
        site: &str,
        datasets: &[String],
        group: &str,
    ) -> ClientResult<RequestId> {
        self.submit(ActionKind::Delete, site, datasets, group).await
    }
}

#[async_trait]
impl DatasetMetadataClient for JsonDirClient {
    async fn lookup_dataset(&self, name: &str) -> ClientResult<Option<DatasetMetadata>> {
        let mut all: BTreeMap<String, DatasetMetadata> =
            self.read_required(Self::DATASETS_FILE).await?;
        Ok(all.remove(name))
    }
}

#[async_trait]
impl PopularityCatalogClient for JsonDirClient {
    async fn access_stats(&self, date: NaiveDate) -> ClientResult<Vec<AccessStat>> {
        Ok(self
            .read_json(&self.popularity_path(date))
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl SiteRegistryClient for JsonDirClient {
    async fn list_sites(&self) -> ClientResult<Vec<Site>> {
        self.read_required(Self::SITES_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            JsonDirClient::REPLICAS_FILE,
            serde_json::json!([
                {
                    "dataset": "/A/raw/AOD",
                    "blocks": [
                        { "bytes": 100, "files": 2, "replicas": [
                            { "site": "T2_X", "files": 2, "group": "analysis" },
                            { "site": "T2_Y", "files": 2, "group": "ops" }
                        ]}
                    ]
                },
                {
                    "dataset": "/B/raw/AOD",
                    "blocks": [
                        { "bytes": 50, "files": 1, "replicas": [
                            { "site": "T2_Y", "files": 1, "group": "ops" }
                        ]}
                    ]
                }
            ]),
        );
        dir
    }

    #[tokio::test]
    async fn test_list_replicas_filters_site_and_group() {
        let dir = fixture();
        let client = JsonDirClient::open(dir.path()).await.unwrap();

        let all = client.list_replicas(&[], "").await.unwrap();
        assert_eq!(all.len(), 2);

        let analysis = client.list_replicas(&[], "analysis").await.unwrap();
        assert_eq!(analysis.len(), 1);
        assert_eq!(analysis[0].complete_sites(), vec!["T2_X".to_string()]);

        let at_x = client.list_replicas(&["T2_X".to_string()], "").await.unwrap();
        assert_eq!(at_x.len(), 1);
        assert_eq!(at_x[0].dataset, "/A/raw/AOD");
    }

    #[tokio::test]
    async fn test_missing_required_file_is_permanent() {
        let dir = TempDir::new().unwrap();
        let client = JsonDirClient::open(dir.path()).await.unwrap();
        let err = client.list_sites().await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_missing_popularity_day_is_empty() {
        let dir = TempDir::new().unwrap();
        let client = JsonDirClient::open(dir.path()).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(client.access_stats(day).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submissions_append_and_ids_resume() {
        let dir = TempDir::new().unwrap();
        let client = JsonDirClient::open(dir.path()).await.unwrap();
        let first = client
            .submit_replication("T2_X", &["/A/raw/AOD".into()], "analysis")
            .await
            .unwrap();
        let second = client
            .submit_deletion("T2_Y", &["/B/raw/AOD".into()], "analysis")
            .await
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let reopened = JsonDirClient::open(dir.path()).await.unwrap();
        let third = reopened
            .submit_replication("T2_Z", &["/C/raw/AOD".into()], "analysis")
            .await
            .unwrap();
        assert_eq!(third, 3);

        let recorded = reopened.submissions().await.unwrap();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[1].kind, ActionKind::Delete);
        assert_eq!(recorded[1].site, "T2_Y");
    }

    #[tokio::test]
    async fn test_rejected_site_refuses_submission() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), JsonDirClient::REJECTIONS_FILE, serde_json::json!(["T2_BAD"]));
        let client = JsonDirClient::open(dir.path()).await.unwrap();

        let err = client
            .submit_replication("T2_BAD", &["/A/raw/AOD".into()], "")
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert!(client.submissions().await.unwrap().is_empty());
    }
}
