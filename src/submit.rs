/*!
 * Submission of balancer actions to the replica catalog
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use ballast_core_catalog::{Action, ActionKind};
use ballast_core_ingest::{ReplicaCatalogClient, RequestId};
use tracing::{info, warn};

/// What happened to one per-site batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    Submitted(RequestId),
    Rejected(String),
    /// Dry run
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub kind: ActionKind,
    pub site: String,
    pub datasets: Vec<String>,
    pub status: BatchStatus,
}

impl BatchResult {
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.datasets.iter().map(move |ds| Action {
            dataset: ds.clone(),
            site: self.site.clone(),
            kind: self.kind,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionOutcome {
    pub batches: Vec<BatchResult>,
}

impl SubmissionOutcome {
    /// Actions of accepted batches, split into (subscriptions, deletions)
    pub fn accepted(&self) -> (Vec<Action>, Vec<Action>) {
        let mut subscriptions = Vec::new();
        let mut deletions = Vec::new();
        for batch in &self.batches {
            if !matches!(batch.status, BatchStatus::Submitted(_)) {
                continue;
            }
            match batch.kind {
                ActionKind::Replicate => subscriptions.extend(batch.actions()),
                ActionKind::Delete => deletions.extend(batch.actions()),
            }
        }
        (subscriptions, deletions)
    }

    pub fn submitted_batches(&self) -> usize {
        self.count(|s| matches!(s, BatchStatus::Submitted(_)))
    }

    pub fn rejected_batches(&self) -> usize {
        self.count(|s| matches!(s, BatchStatus::Rejected(_)))
    }

    fn count(&self, pred: impl Fn(&BatchStatus) -> bool) -> usize {
        self.batches.iter().filter(|b| pred(&b.status)).count()
    }
}

/// Hands actions to the replica catalog, one request per site and kind.
///
/// A refused batch is dropped with a warning; the other batches stand.
pub struct Submitter {
    client: Arc<dyn ReplicaCatalogClient>,
    group: String,
    dry_run: bool,
}

impl Submitter {
    pub fn new(client: Arc<dyn ReplicaCatalogClient>, group: impl Into<String>) -> Self {
        Self {
            client,
            group: group.into(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn submit(&self, actions: &[Action]) -> SubmissionOutcome {
        let mut grouped: BTreeMap<(ActionKind, &str), Vec<String>> = BTreeMap::new();
        for action in actions {
            grouped
                .entry((action.kind, action.site.as_str()))
                .or_default()
                .push(action.dataset.clone());
        }

        let mut outcome = SubmissionOutcome::default();
        for ((kind, site), datasets) in grouped {
            let status = if self.dry_run {
                BatchStatus::Skipped
            } else {
                let result = match kind {
                    ActionKind::Replicate => {
                        self.client
                            .submit_replication(site, &datasets, &self.group)
                            .await
                    }
                    ActionKind::Delete => {
                        self.client.submit_deletion(site, &datasets, &self.group).await
                    }
                };
                match result {
                    Ok(id) => {
                        info!(%kind, site, datasets = datasets.len(), request_id = id, "request accepted");
                        BatchStatus::Submitted(id)
                    }
                    Err(e) => {
                        warn!(%kind, site, datasets = datasets.len(), error = %e, "request rejected, dropping batch");
                        BatchStatus::Rejected(e.to_string())
                    }
                }
            };
            outcome.batches.push(BatchResult {
                kind,
                site: site.to_string(),
                datasets,
                status,
            });
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ballast_core_ingest::ClientResult;
    use ballast_core_ingest::ReplicaListing;
    use ballast_core_resilience::ResilienceError;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        refused_site: Option<String>,
        calls: Mutex<Vec<(ActionKind, String, Vec<String>)>>,
    }

    impl Recorder {
        async fn record(&self, kind: ActionKind, site: &str, datasets: &[String]) -> ClientResult<RequestId> {
            if self.refused_site.as_deref() == Some(site) {
                return Err(ResilienceError::permanent("site frozen"));
            }
            let mut calls = self.calls.lock().await;
            calls.push((kind, site.to_string(), datasets.to_vec()));
            Ok(calls.len() as RequestId)
        }
    }

    #[async_trait]
    impl ReplicaCatalogClient for Recorder {
        async fn list_replicas(&self, _: &[String], _: &str) -> ClientResult<Vec<ReplicaListing>> {
            Ok(Vec::new())
        }

        async fn submit_replication(&self, site: &str, datasets: &[String], _: &str) -> ClientResult<RequestId> {
            self.record(ActionKind::Replicate, site, datasets).await
        }

        async fn submit_deletion(&self, site: &str, datasets: &[String], _: &str) -> ClientResult<RequestId> {
            self.record(ActionKind::Delete, site, datasets).await
        }
    }

    fn actions() -> Vec<Action> {
        vec![
            Action::replicate("/A", "T2_X"),
            Action::replicate("/B", "T2_X"),
            Action::replicate("/C", "T2_Y"),
            Action::delete("/D", "T2_X"),
        ]
    }

    #[tokio::test]
    async fn test_actions_grouped_per_site_and_kind() {
        let recorder = Arc::new(Recorder::default());
        let outcome = Submitter::new(recorder.clone(), "analysis").submit(&actions()).await;

        assert_eq!(outcome.batches.len(), 3);
        assert_eq!(outcome.submitted_batches(), 3);
        let calls = recorder.calls.lock().await;
        assert!(calls.contains(&(
            ActionKind::Replicate,
            "T2_X".to_string(),
            vec!["/A".to_string(), "/B".to_string()]
        )));

        let (subs, dels) = outcome.accepted();
        assert_eq!(subs.len(), 3);
        assert_eq!(dels, vec![Action::delete("/D", "T2_X")]);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_dropped_alone() {
        let recorder = Arc::new(Recorder {
            refused_site: Some("T2_X".to_string()),
            ..Default::default()
        });
        let outcome = Submitter::new(recorder, "analysis").submit(&actions()).await;

        assert_eq!(outcome.rejected_batches(), 2);
        assert_eq!(outcome.submitted_batches(), 1);
        let (subs, dels) = outcome.accepted();
        assert_eq!(subs, vec![Action::replicate("/C", "T2_Y")]);
        assert!(dels.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_submits_nothing() {
        let recorder = Arc::new(Recorder::default());
        let outcome = Submitter::new(recorder.clone(), "analysis")
            .with_dry_run(true)
            .submit(&actions())
            .await;

        assert!(outcome.batches.iter().all(|b| b.status == BatchStatus::Skipped));
        assert!(recorder.calls.lock().await.is_empty());
        let (subs, dels) = outcome.accepted();
        assert!(subs.is_empty() && dels.is_empty());
    }
}
