/*!
 * The balancing cycle
 *
 * One cycle refreshes the catalog from upstream, scores datasets and
 * sites for the run date, runs the Rocker Board replicate and clean
 * phases, submits the resulting actions and writes the accepted ones back
 * to the catalog. The whole cycle runs under one deadline; when it expires
 * the shared cancellation token stops in-flight ingestion workers.
 */

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ballast_core_balancer::{
    CleanInput, CleanOutcome, NeedTable, ReplicateInput, ReplicateOutcome, RockerBoard,
    WeightedChooser,
};
use ballast_core_catalog::{Action, CatalogStore};
use ballast_core_ingest::{
    DatasetIngestor, DatasetMetadataClient, DatasetRefresh, LogNotifier, Notifier,
    PopularityCatalogClient, PopularityIngestor, PopularityRefresh, ReplicaCatalogClient,
    SiteIngestor, SiteRefresh, SiteRegistryClient, TierRejections, WorkerPool,
};
use ballast_core_ranking::{DatasetScores, RankingEngine};
use ballast_core_resilience::retry;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::{ActionStatus, AuditLog, AuditRecord};
use crate::config::BallastConfig;
use crate::error::{BallastError, Result};
use crate::stats::CycleReport;
use crate::submit::{BatchStatus, Submitter};

/// The four upstream services a cycle talks to
#[derive(Clone)]
pub struct Upstream {
    pub replicas: Arc<dyn ReplicaCatalogClient>,
    pub metadata: Arc<dyn DatasetMetadataClient>,
    pub popularity: Arc<dyn PopularityCatalogClient>,
    pub sites: Arc<dyn SiteRegistryClient>,
}

impl Upstream {
    /// Serve every service from one client
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: ReplicaCatalogClient
            + DatasetMetadataClient
            + PopularityCatalogClient
            + SiteRegistryClient
            + 'static,
    {
        Self {
            replicas: client.clone(),
            metadata: client.clone(),
            popularity: client.clone(),
            sites: client,
        }
    }
}

/// Results of the three ingestion stages
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub sites: SiteRefresh,
    pub datasets: DatasetRefresh,
    pub popularity: PopularityRefresh,
}

impl IngestSummary {
    pub fn failed(&self) -> usize {
        self.datasets.pool.failed() + self.popularity.pool.failed()
    }
}

/// Scores and proposed actions for one date
#[derive(Debug, Clone)]
pub struct BalancePlan {
    pub scores: DatasetScores,
    pub site_ranks: BTreeMap<String, f64>,
    pub replicate: ReplicateOutcome,
    pub clean: CleanOutcome,
}

impl BalancePlan {
    /// Subscriptions followed by deletions
    pub fn actions(&self) -> Vec<Action> {
        self.replicate
            .subscriptions
            .iter()
            .chain(self.clean.deletions.iter())
            .cloned()
            .collect()
    }
}

pub struct Cycle {
    config: Arc<BallastConfig>,
    store: Arc<dyn CatalogStore>,
    upstream: Upstream,
    engine: RankingEngine,
    rejections: TierRejections,
    notifier: Arc<dyn Notifier>,
    audit: Option<AuditLog>,
    cancel: CancellationToken,
}

impl Cycle {
    pub fn new(config: Arc<BallastConfig>, store: Arc<dyn CatalogStore>, upstream: Upstream) -> Self {
        let engine = RankingEngine::new(
            store.clone(),
            config.ranking.strategy.build(),
            config.balancer.max_replicas,
        )
        .with_soft_limits(config.balancer.soft_storage_limit.clone());
        Self {
            config,
            store,
            upstream,
            engine,
            rejections: TierRejections::new(),
            notifier: Arc::new(LogNotifier),
            audit: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share a token the caller can cancel (e.g. on Ctrl-C)
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Confirm the site registry answers before doing any work.
    ///
    /// Losing the registry is fatal to the run: the operator is alerted and
    /// [`BallastError::Connectivity`] is returned.
    pub async fn probe(&self) -> Result<usize> {
        let policy = self.config.retry.policy();
        match retry(&policy, "probe_site_registry", || self.upstream.sites.list_sites()).await {
            Ok(sites) => {
                info!(sites = sites.len(), "site registry reachable");
                Ok(sites.len())
            }
            Err(e) => {
                error!(error = %e, "site registry unreachable");
                self.notifier
                    .notify("ballast cannot reach the site registry", &e.to_string());
                Err(BallastError::Connectivity {
                    service: "site registry".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Refresh sites, datasets and popularity, in that order
    pub async fn ingest(&self, today: NaiveDate) -> Result<IngestSummary> {
        let policy = self.config.retry.policy();
        let settings = &self.config.ingest;

        let sites = SiteIngestor::new(self.store.clone(), self.upstream.sites.clone())
            .with_retry(policy.clone())
            .refresh()
            .await?;
        self.checkpoint()?;

        let pool = Arc::new(WorkerPool::new(
            settings.worker_pool_size,
            self.cancel.child_token(),
            self.notifier.clone(),
        ));

        let datasets = DatasetIngestor::new(
            self.store.clone(),
            self.upstream.replicas.clone(),
            self.upstream.metadata.clone(),
            pool.clone(),
        )
        .with_retry(policy.clone())
        .with_group(&settings.group)
        .with_valid_data_tiers(settings.valid_data_tiers.clone())
        .with_tier_rejections(self.rejections.clone())
        .refresh()
        .await?;
        self.checkpoint()?;

        let popularity =
            PopularityIngestor::new(self.store.clone(), self.upstream.popularity.clone(), pool)
                .with_retry(policy)
                .with_history_days(settings.history_days)
                .with_fill_missing_days(settings.fill_missing_days)
                .refresh(today)
                .await?;

        Ok(IngestSummary {
            sites,
            datasets,
            popularity,
        })
    }

    /// Score datasets, then rank sites against the resulting targets
    pub async fn rank(&self, date: NaiveDate) -> Result<(DatasetScores, BTreeMap<String, f64>)> {
        let scores = self.engine.score_datasets(date).await?;
        let site_ranks = self.engine.score_sites(date, &scores.targets).await?;
        Ok((scores, site_ranks))
    }

    /// Rank and run both Rocker Board phases without submitting anything
    pub async fn plan(&self, date: NaiveDate) -> Result<BalancePlan> {
        let (scores, site_ranks) = self.rank(date).await?;
        self.checkpoint()?;

        let datasets = self.store.list_datasets().await?;
        let mut needs = NeedTable::from_targets(&datasets, &scores.targets);
        let available_bytes = self
            .store
            .active_sites()
            .await?
            .into_iter()
            .map(|s| {
                let available = s.available_bytes();
                (s.name, available)
            })
            .collect();

        let mut board = match self.config.balancer.seed {
            Some(seed) => RockerBoard::seeded(seed),
            None => RockerBoard::new(WeightedChooser::from_entropy()),
        };

        let replicate = board.replicate(
            &mut needs,
            &ReplicateInput {
                site_ranks: site_ranks.clone(),
                available_bytes,
                max_bytes: self.config.balancer.max_bytes(),
            },
        );
        let overage = self.engine.storage_overage(&replicate.subscriptions).await?;
        let clean = board.clean(&mut needs, &CleanInput { overage });

        Ok(BalancePlan {
            scores,
            site_ranks,
            replicate,
            clean,
        })
    }

    /// Full cycle: ingest, rank, balance, submit
    pub async fn run(&self, date: NaiveDate) -> Result<CycleReport> {
        self.with_deadline(self.stages(date, true)).await
    }

    /// Cycle over the catalog as it stands, without ingestion
    pub async fn rebalance(&self, date: NaiveDate) -> Result<CycleReport> {
        self.with_deadline(self.stages(date, false)).await
    }

    async fn with_deadline<F>(&self, work: F) -> Result<CycleReport>
    where
        F: std::future::Future<Output = Result<CycleReport>>,
    {
        let limit = self.config.cycle_timeout();
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel.cancel();
                error!(limit_secs = limit.as_secs(), "cycle deadline exceeded, cancelling");
                self.notifier.notify(
                    "ballast cycle timed out",
                    &format!("no result after {}s", limit.as_secs()),
                );
                Err(BallastError::Timeout(limit))
            }
        }
    }

    async fn stages(&self, date: NaiveDate, ingest: bool) -> Result<CycleReport> {
        let start = Instant::now();
        let mut report = CycleReport::new(date, self.engine.strategy_name(), self.config.dry_run);
        info!(%date, strategy = %report.strategy, dry_run = report.dry_run, "cycle started");

        if ingest {
            let summary = self.ingest(date).await?;
            absorb_ingest(&mut report, summary);
        }
        self.checkpoint()?;

        let plan = self.plan(date).await?;
        let stats = &mut report.stats;
        stats.datasets_ranked = plan.scores.targets.len();
        stats.sites_ranked = plan.site_ranks.len();
        stats.subscriptions = plan.replicate.subscriptions.len();
        stats.replicated_bytes = plan.replicate.replicated_bytes;
        stats.unplaced = plan.replicate.dropped.len();
        stats.deletions = plan.clean.deletions.len();
        stats.deleted_bytes = plan.clean.deleted_bytes;
        self.checkpoint()?;

        self.execute(date, &plan, &mut report).await?;
        report.subscriptions = plan.replicate.subscriptions;
        report.deletions = plan.clean.deletions;
        report.stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(%date, "cycle finished: {}", report.stats.summary());
        Ok(report)
    }

    /// Audit, submit and write back the accepted actions
    async fn execute(
        &self,
        date: NaiveDate,
        plan: &BalancePlan,
        report: &mut CycleReport,
    ) -> Result<()> {
        let actions = plan.actions();

        // Nothing is submitted unless its proposal was recorded
        if let Some(audit) = &self.audit {
            let proposed: Vec<AuditRecord> = actions
                .iter()
                .map(|a| AuditRecord::new(date, a, ActionStatus::Proposed))
                .collect();
            audit.record_all(&proposed)?;
        }

        let outcome = Submitter::new(self.upstream.replicas.clone(), &self.config.ingest.group)
            .with_dry_run(self.config.dry_run)
            .submit(&actions)
            .await;

        if let Some(audit) = &self.audit {
            let mut results = Vec::new();
            for batch in &outcome.batches {
                for action in batch.actions() {
                    let record = match &batch.status {
                        BatchStatus::Submitted(id) => {
                            AuditRecord::new(date, &action, ActionStatus::Submitted)
                                .with_request_id(*id)
                        }
                        BatchStatus::Rejected(e) => {
                            AuditRecord::new(date, &action, ActionStatus::Rejected).with_error(e)
                        }
                        BatchStatus::Skipped => {
                            AuditRecord::new(date, &action, ActionStatus::Skipped)
                        }
                    };
                    results.push(record);
                }
            }
            if let Err(e) = audit.record_all(&results) {
                error!(error = %e, "failed to audit submission results");
            }
        }

        let (subscriptions, deletions) = outcome.accepted();
        let applied = if subscriptions.is_empty() && deletions.is_empty() {
            0
        } else {
            self.store
                .apply_replica_changes(&subscriptions, &deletions)
                .await?
        };

        let rejected = outcome.rejected_batches();
        if rejected > 0 {
            warn!(rejected, "some submission batches were refused");
        }

        let stats = &mut report.stats;
        stats.submitted_batches = outcome.submitted_batches();
        stats.rejected_batches = rejected;
        stats.applied_actions = applied;

        info!(
            replicate = subscriptions.len(),
            delete = deletions.len(),
            applied,
            "replica changes written back"
        );
        Ok(())
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(BallastError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn absorb_ingest(report: &mut CycleReport, summary: IngestSummary) {
    let stats = &mut report.stats;
    stats.sites_listed = summary.sites.listed;
    stats.sites_deactivated = summary.sites.deactivated.len();
    stats.datasets_created = summary.datasets.created;
    stats.datasets_updated = summary.datasets.updated;
    stats.datasets_removed = summary.datasets.removed.len();
    stats.datasets_filtered = summary.datasets.filtered + summary.datasets.skipped;
    stats.popularity_records = summary.popularity.records;
    stats.ingest_failures = summary.failed();

    report.dead_letters.extend(summary.datasets.pool.dead_letters);
    report.dead_letters.extend(summary.popularity.pool.dead_letters);
}
