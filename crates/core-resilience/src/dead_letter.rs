//! Dead-Letter Queue: bounded quarantine for items that could not be processed
//!
//! When an ingestion item exhausts its retries, it is routed here instead
//! of failing the whole pass. The cycle keeps going with the items that
//! succeeded and reports the dead-lettered keys at the end.
//!
//! # Example
//!
//! ```
//! use ballast_core_resilience::dead_letter::{DeadLetterQueue, DeadLetterEntry, FailureReason};
//!
//! let mut dlq = DeadLetterQueue::new(1000);
//!
//! dlq.push(DeadLetterEntry::new(
//!     "/Alpha/Run1/AOD",
//!     "dataset-metadata",
//!     FailureReason::RetriesExhausted { attempts: 3 },
//!     "connection refused",
//! ));
//!
//! assert_eq!(dlq.len(), 1);
//! let entries = dlq.drain();
//! assert_eq!(entries.len(), 1);
//! ```

use crate::error::ResilienceError;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Reason an item was sent to the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Maximum retry count exceeded
    RetriesExhausted { attempts: u32 },

    /// Permanent error (non-transient, should not retry)
    PermanentError,

    /// The pass was cancelled before the item finished
    Cancelled,
}

impl FailureReason {
    /// Classify the error that ended an item's processing
    pub fn from_error(err: &ResilienceError) -> Self {
        match err {
            ResilienceError::MaxRetriesExceeded { attempts, .. } => {
                FailureReason::RetriesExhausted {
                    attempts: *attempts,
                }
            }
            ResilienceError::Cancelled => FailureReason::Cancelled,
            _ => FailureReason::PermanentError,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::RetriesExhausted { attempts } => {
                write!(f, "retries exhausted after {} attempts", attempts)
            }
            FailureReason::PermanentError => write!(f, "permanent error"),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single dead-letter entry
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    /// Unique key for this item (dataset name, date, site)
    pub item_key: String,

    /// Ingestion stage the item failed in
    pub stage: String,

    /// Why this item was dead-lettered
    pub failure_reason: FailureReason,

    /// Last error message
    pub last_error: String,

    /// When this item first failed
    pub first_failed_at: SystemTime,

    /// When this item was last attempted
    pub last_failed_at: SystemTime,
}

impl DeadLetterEntry {
    pub fn new(
        item_key: impl Into<String>,
        stage: impl Into<String>,
        failure_reason: FailureReason,
        last_error: impl Into<String>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            item_key: item_key.into(),
            stage: stage.into(),
            failure_reason,
            last_error: last_error.into(),
            first_failed_at: now,
            last_failed_at: now,
        }
    }
}

/// In-memory dead-letter queue with bounded capacity.
///
/// Items that exceed the capacity are dropped (oldest first) to prevent
/// unbounded memory growth.
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: VecDeque<DeadLetterEntry>,
    max_capacity: usize,
    total_received: u64,
    total_dropped: u64,
}

impl DeadLetterQueue {
    /// Create a new dead-letter queue with the given maximum capacity
    pub fn new(max_capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_capacity.min(1024)),
            max_capacity,
            total_received: 0,
            total_dropped: 0,
        }
    }

    /// Push an entry into the dead-letter queue.
    ///
    /// If the queue is at capacity, the oldest entry is dropped.
    pub fn push(&mut self, entry: DeadLetterEntry) {
        self.total_received += 1;

        if self.max_capacity == 0 {
            self.total_dropped += 1;
            return;
        }

        if self.entries.len() >= self.max_capacity {
            self.entries.pop_front();
            self.total_dropped += 1;
        }

        self.entries.push_back(entry);
    }

    /// Drain all entries from the queue
    pub fn drain(&mut self) -> Vec<DeadLetterEntry> {
        self.entries.drain(..).collect()
    }

    /// Peek at all entries without removing them
    pub fn entries(&self) -> &VecDeque<DeadLetterEntry> {
        &self.entries
    }

    /// Get entries for a specific ingestion stage
    pub fn entries_for_stage(&self, stage: &str) -> Vec<&DeadLetterEntry> {
        self.entries.iter().filter(|e| e.stage == stage).collect()
    }

    /// Number of entries currently in the queue
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> DeadLetterStats {
        DeadLetterStats {
            current_count: self.entries.len(),
            max_capacity: self.max_capacity,
            total_received: self.total_received,
            total_dropped: self.total_dropped,
        }
    }
}

/// Statistics for the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterStats {
    /// Current number of entries
    pub current_count: usize,
    /// Maximum capacity
    pub max_capacity: usize,
    /// Total entries ever received
    pub total_received: u64,
    /// Total entries dropped due to capacity overflow
    pub total_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(key: &str, stage: &str) -> DeadLetterEntry {
        DeadLetterEntry::new(
            key,
            stage,
            FailureReason::RetriesExhausted { attempts: 3 },
            "timeout",
        )
    }

    #[test]
    fn test_push_and_drain() {
        let mut dlq = DeadLetterQueue::new(100);

        dlq.push(make_entry("ds-1", "dataset-metadata"));
        dlq.push(make_entry("ds-2", "dataset-metadata"));
        assert_eq!(dlq.len(), 2);

        let entries = dlq.drain();
        assert_eq!(entries.len(), 2);
        assert!(dlq.is_empty());
    }

    #[test]
    fn test_capacity_overflow_drops_oldest() {
        let mut dlq = DeadLetterQueue::new(2);

        dlq.push(make_entry("ds-1", "popularity"));
        dlq.push(make_entry("ds-2", "popularity"));
        dlq.push(make_entry("ds-3", "popularity")); // Drops ds-1

        assert_eq!(dlq.len(), 2);
        let entries = dlq.drain();
        assert_eq!(entries[0].item_key, "ds-2");
        assert_eq!(entries[1].item_key, "ds-3");
    }

    #[test]
    fn test_zero_capacity_counts_drops() {
        let mut dlq = DeadLetterQueue::new(0);
        dlq.push(make_entry("a", "x"));
        assert!(dlq.is_empty());
        assert_eq!(dlq.stats().total_dropped, 1);
    }

    #[test]
    fn test_entries_for_stage() {
        let mut dlq = DeadLetterQueue::new(100);

        dlq.push(make_entry("ds-1", "dataset-metadata"));
        dlq.push(make_entry("2026-10-01", "popularity"));
        dlq.push(make_entry("ds-3", "dataset-metadata"));

        assert_eq!(dlq.entries_for_stage("dataset-metadata").len(), 2);
        assert!(dlq.entries_for_stage("sites").is_empty());
        // Peek does not drain
        assert_eq!(dlq.len(), 3);
    }

    #[test]
    fn test_stats_after_many_overflows() {
        let mut dlq = DeadLetterQueue::new(2);

        for i in 0..50 {
            dlq.push(make_entry(&format!("ds-{}", i), "popularity"));
        }

        let stats = dlq.stats();
        assert_eq!(stats.current_count, 2);
        assert_eq!(stats.max_capacity, 2);
        assert_eq!(stats.total_received, 50);
        assert_eq!(stats.total_dropped, 48);
    }

    #[test]
    fn test_failure_reason_display() {
        let r = FailureReason::RetriesExhausted { attempts: 5 };
        assert_eq!(r.to_string(), "retries exhausted after 5 attempts");
        assert_eq!(FailureReason::PermanentError.to_string(), "permanent error");
        assert_eq!(FailureReason::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_reason_from_error() {
        let exhausted = ResilienceError::MaxRetriesExceeded {
            attempts: 3,
            last_error: "x".into(),
        };
        assert_eq!(
            FailureReason::from_error(&exhausted),
            FailureReason::RetriesExhausted { attempts: 3 }
        );
        assert_eq!(
            FailureReason::from_error(&ResilienceError::Cancelled),
            FailureReason::Cancelled
        );
        assert_eq!(
            FailureReason::from_error(&ResilienceError::permanent("bad")),
            FailureReason::PermanentError
        );
    }
}
