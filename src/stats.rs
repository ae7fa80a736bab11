/*!
 * Per-cycle statistics
 */

use ballast_core_catalog::{Action, BYTES_PER_GB};
use ballast_core_resilience::DeadLetterEntry;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{EXIT_PARTIAL, EXIT_SUCCESS};

/// Flat counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleStats {
    pub sites_listed: usize,
    pub sites_deactivated: usize,
    pub datasets_created: usize,
    pub datasets_updated: usize,
    pub datasets_removed: usize,
    /// New datasets outside the managed tiers, looked up or remembered
    pub datasets_filtered: usize,
    pub popularity_records: usize,
    /// Items dead-lettered by any ingestion stage
    pub ingest_failures: usize,

    pub datasets_ranked: usize,
    pub sites_ranked: usize,

    pub subscriptions: usize,
    pub replicated_bytes: u64,
    /// Datasets the replicate phase found no site for
    pub unplaced: usize,
    pub deletions: usize,
    pub deleted_bytes: u64,

    pub submitted_batches: usize,
    pub rejected_batches: usize,
    /// Replica-set changes written back to the catalog
    pub applied_actions: usize,

    pub duration_ms: u64,
}

impl CycleStats {
    /// No dead letters and no refused submissions
    pub fn is_clean(&self) -> bool {
        self.ingest_failures == 0 && self.rejected_batches == 0
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} replications ({}), {} deletions ({}), {} unplaced, {} batches submitted, {} rejected, {} ingest failures in {:.1}s",
            self.subscriptions,
            format_gb(self.replicated_bytes),
            self.deletions,
            format_gb(self.deleted_bytes),
            self.unplaced,
            self.submitted_batches,
            self.rejected_batches,
            self.ingest_failures,
            self.duration_ms as f64 / 1000.0,
        )
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub date: NaiveDate,
    pub strategy: String,
    pub dry_run: bool,
    pub stats: CycleStats,
    pub subscriptions: Vec<Action>,
    pub deletions: Vec<Action>,
    pub dead_letters: Vec<DeadLetterEntry>,
}

impl CycleReport {
    pub fn new(date: NaiveDate, strategy: impl Into<String>, dry_run: bool) -> Self {
        Self {
            date,
            strategy: strategy.into(),
            dry_run,
            stats: CycleStats::default(),
            subscriptions: Vec::new(),
            deletions: Vec::new(),
            dead_letters: Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.stats.is_clean() {
            EXIT_SUCCESS
        } else {
            EXIT_PARTIAL
        }
    }
}

/// Decimal gigabytes with two decimals
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / BYTES_PER_GB)
}
