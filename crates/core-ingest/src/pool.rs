//! Bounded worker pool with a completion barrier
//!
//! # Concurrency Model
//!
//! - The producer loads every item into an `mpsc` queue up front, then
//!   closes it
//! - `size` tokio tasks in a `JoinSet` share the receiver and take one item
//!   at a time
//! - Joining the set is the barrier: [`WorkerPool::run`] returns only after
//!   every item was processed, failed, or abandoned on cancellation
//!
//! A failing item never stops the others. It is logged, sent to the
//! operator channel, and recorded in the run's dead-letter queue.

use crate::notify::Notifier;
use ballast_core_resilience::{
    DeadLetterEntry, DeadLetterQueue, DeadLetterStats, FailureReason, ResilienceError,
};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one pool run
#[derive(Debug, Clone)]
pub struct PoolReport {
    pub stage: String,
    pub total: usize,
    pub processed: usize,
    pub dead_letters: Vec<DeadLetterEntry>,
    pub dead_letter_stats: DeadLetterStats,
    pub cancelled: bool,
    pub duration: Duration,
}

impl PoolReport {
    pub fn failed(&self) -> usize {
        self.total - self.processed
    }

    pub fn is_clean(&self) -> bool {
        self.processed == self.total
    }
}

#[derive(Debug, Default)]
struct WorkerTally {
    processed: usize,
    failures: Vec<DeadLetterEntry>,
}

pub struct WorkerPool {
    size: usize,
    cancel: CancellationToken,
    notifier: Arc<dyn Notifier>,
}

impl WorkerPool {
    /// Dead-letter capacity per run
    const DEAD_LETTER_CAPACITY: usize = 10_000;

    pub fn new(size: usize, cancel: CancellationToken, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            size: size.max(1),
            cancel,
            notifier,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Process `items` with `handler` on `size` workers and wait for all.
    ///
    /// `stage` labels log lines and dead-letter entries; an item's
    /// `Display` form is its dead-letter key.
    pub async fn run<T, F, Fut>(&self, stage: &str, items: Vec<T>, handler: F) -> PoolReport
    where
        T: Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ResilienceError>> + Send + 'static,
    {
        let start = Instant::now();
        let total = items.len();
        let mut dlq = DeadLetterQueue::new(Self::DEAD_LETTER_CAPACITY);

        let (tx, rx) = mpsc::channel(total.max(1));
        for item in items {
            // Capacity covers every item, so this never waits
            if tx.send(item).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);
        let workers = self.size.min(total.max(1));
        let mut set = JoinSet::new();

        for worker_id in 0..workers {
            let rx = rx.clone();
            let handler = handler.clone();
            let cancel = self.cancel.clone();
            let notifier = self.notifier.clone();
            let stage = stage.to_string();

            set.spawn(async move {
                let mut tally = WorkerTally::default();
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        item = async { rx.lock().await.recv().await } => item,
                    };
                    let Some(item) = next else {
                        break;
                    };

                    let key = item.to_string();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(ResilienceError::Cancelled),
                        r = handler(item) => r,
                    };

                    match result {
                        Ok(()) => tally.processed += 1,
                        Err(e) => {
                            let reason = FailureReason::from_error(&e);
                            if matches!(e, ResilienceError::Cancelled) {
                                warn!(stage = %stage, item = %key, "item abandoned on cancellation");
                            } else {
                                error!(stage = %stage, item = %key, worker_id, error = %e, "item failed");
                                notifier.notify(
                                    &format!("{} ingestion failed", stage),
                                    &format!("{}: {} ({})", key, e, reason),
                                );
                            }
                            tally
                                .failures
                                .push(DeadLetterEntry::new(key, stage.clone(), reason, e.to_string()));
                        }
                    }
                }
                debug!(stage = %stage, worker_id, processed = tally.processed, "worker done");
                tally
            });
        }

        let mut processed = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(tally) => {
                    processed += tally.processed;
                    for entry in tally.failures {
                        dlq.push(entry);
                    }
                }
                Err(e) => error!(stage = %stage, error = %e, "worker task panicked"),
            }
        }

        // Items never taken because the run was cancelled
        {
            let mut rx = rx.lock().await;
            while let Ok(item) = rx.try_recv() {
                dlq.push(DeadLetterEntry::new(
                    item.to_string(),
                    stage,
                    FailureReason::Cancelled,
                    "not started before cancellation",
                ));
            }
        }

        let report = PoolReport {
            stage: stage.to_string(),
            total,
            processed,
            dead_letter_stats: dlq.stats(),
            dead_letters: dlq.drain(),
            cancelled: self.cancel.is_cancelled(),
            duration: start.elapsed(),
        };

        info!(
            stage = %stage,
            total,
            processed,
            failed = report.failed(),
            workers,
            duration_ms = report.duration.as_millis() as u64,
            "worker pool finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(size: usize) -> WorkerPool {
        WorkerPool::new(size, CancellationToken::new(), Arc::new(LogNotifier))
    }

    #[tokio::test]
    async fn test_every_item_processed_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let report = pool(4)
            .run("numbers", (0..100u32).collect(), move |n| {
                let sink = sink.clone();
                async move {
                    sink.lock().await.push(n);
                    Ok(())
                }
            })
            .await;

        assert_eq!(report.total, 100);
        assert_eq!(report.processed, 100);
        assert!(report.is_clean());
        let seen = seen.lock().await;
        let unique: BTreeSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 100);
        assert_eq!(unique.len(), 100);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_dead_lettered() {
        let report = pool(3)
            .run("numbers", (0..10u32).collect(), |n| async move {
                if n % 4 == 0 {
                    Err(ResilienceError::permanent("bad"))
                } else {
                    Ok(())
                }
            })
            .await;

        assert_eq!(report.processed, 7);
        assert_eq!(report.failed(), 3);
        let keys: BTreeSet<_> = report.dead_letters.iter().map(|e| e.item_key.clone()).collect();
        assert_eq!(keys, BTreeSet::from(["0".to_string(), "4".to_string(), "8".to_string()]));
        assert!(report.dead_letters.iter().all(|e| e.stage == "numbers"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());

        pool(3)
            .run("bounded", (0..30u32).collect(), move |_| {
                let (a, p) = (a.clone(), p.clone());
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_empty_run() {
        let report = pool(5)
            .run("nothing", Vec::<u32>::new(), |_| async { Ok(()) })
            .await;
        assert_eq!(report.total, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_cancellation_abandons_remaining_items() {
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(2, cancel.clone(), Arc::new(LogNotifier));
        let trigger = cancel.clone();

        let report = pool
            .run("slow", (0..20u32).collect(), move |n| {
                let trigger = trigger.clone();
                async move {
                    if n == 3 {
                        trigger.cancel();
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                }
            })
            .await;

        assert!(report.cancelled);
        assert_eq!(report.total, 20);
        assert_eq!(report.processed + report.dead_letters.len(), 20);
        assert!(report.processed < 20);
        assert!(report
            .dead_letters
            .iter()
            .all(|e| e.failure_reason == FailureReason::Cancelled));
    }
}
