//! Daily popularity ingestion
//!
//! Each missing day between the newest stored record and yesterday is one
//! pool item. Days that fail are dead-lettered; the next refresh starts
//! after the newest day that did land, so a failed day that is followed by
//! a successful one stays absent (scored as zero activity).

use crate::client::PopularityCatalogClient;
use crate::error::{catalog_to_resilience, IngestError};
use crate::pool::{PoolReport, WorkerPool};
use ballast_core_catalog::{CatalogStore, PopularityRecord};
use ballast_core_resilience::{retry, RetryPolicy};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Days fetched when the catalog holds no popularity at all
pub const DEFAULT_HISTORY_DAYS: u32 = 90;

#[derive(Debug, Clone)]
pub struct PopularityRefresh {
    /// First and last day requested; `None` when already up to date
    pub range: Option<(NaiveDate, NaiveDate)>,
    pub records: usize,
    pub zero_filled: usize,
    pub pool: PoolReport,
}

pub struct PopularityIngestor {
    store: Arc<dyn CatalogStore>,
    client: Arc<dyn PopularityCatalogClient>,
    pool: Arc<WorkerPool>,
    retry: RetryPolicy,
    history_days: u32,
    fill_missing_days: bool,
}

impl PopularityIngestor {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        client: Arc<dyn PopularityCatalogClient>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            store,
            client,
            pool,
            retry: RetryPolicy::default(),
            history_days: DEFAULT_HISTORY_DAYS,
            fill_missing_days: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history_days(mut self, days: u32) -> Self {
        self.history_days = days;
        self
    }

    /// Write zero records for known datasets with no activity on a fetched day
    pub fn with_fill_missing_days(mut self, fill: bool) -> Self {
        self.fill_missing_days = fill;
        self
    }

    /// Days to fetch so the catalog covers everything before `today`
    pub async fn pending_range(
        &self,
        today: NaiveDate,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, IngestError> {
        let end = today - Duration::days(1);
        let start = match self.store.latest_popularity_date().await? {
            Some(latest) => latest + Duration::days(1),
            None => today - Duration::days(i64::from(self.history_days)),
        };
        Ok((start <= end).then_some((start, end)))
    }

    pub async fn refresh(&self, today: NaiveDate) -> Result<PopularityRefresh, IngestError> {
        let range = self.pending_range(today).await?;
        let days: Vec<NaiveDate> = match range {
            Some((start, end)) => start.iter_days().take_while(|d| *d <= end).collect(),
            None => Vec::new(),
        };
        if days.is_empty() {
            debug!(%today, "popularity already up to date");
        }

        let records = Arc::new(AtomicUsize::new(0));
        let report = {
            let store = self.store.clone();
            let client = self.client.clone();
            let policy = self.retry.clone();
            let records = records.clone();

            self.pool
                .run("popularity", days.clone(), move |date: NaiveDate| {
                    let store = store.clone();
                    let client = client.clone();
                    let policy = policy.clone();
                    let records = records.clone();
                    async move {
                        let stats =
                            retry(&policy, "access_stats", || client.access_stats(date)).await?;
                        for stat in stats {
                            let record = PopularityRecord {
                                dataset: stat.dataset,
                                date,
                                accesses: stat.accesses,
                                cpu_seconds: stat.cpu_seconds,
                                users: stat.users,
                            };
                            store
                                .upsert_popularity(&record)
                                .await
                                .map_err(catalog_to_resilience)?;
                            records.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(())
                    }
                })
                .await
        };

        if report.cancelled {
            return Err(IngestError::Cancelled);
        }

        let mut zero_filled = 0;
        if self.fill_missing_days && !days.is_empty() {
            let failed: BTreeSet<&str> = report
                .dead_letters
                .iter()
                .map(|e| e.item_key.as_str())
                .collect();
            let landed: Vec<NaiveDate> = days
                .iter()
                .copied()
                .filter(|d| !failed.contains(d.to_string().as_str()))
                .collect();
            for name in self.store.dataset_names().await? {
                zero_filled += self.store.fill_missing_popularity(&name, &landed).await?;
            }
        }

        let summary = PopularityRefresh {
            range,
            records: records.load(Ordering::Relaxed),
            zero_filled,
            pool: report,
        };
        info!(
            days = days.len(),
            records = summary.records,
            zero_filled,
            failed = summary.pool.failed(),
            "popularity refreshed"
        );
        Ok(summary)
    }
}
