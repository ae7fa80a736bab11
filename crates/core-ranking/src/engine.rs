//! Ranking passes over the catalog

use crate::context::ScoringContext;
use crate::normalize::normalize;
use crate::strategy::PopularityStrategy;
use crate::RankingError;
use ballast_core_catalog::{
    Action, ActionKind, CatalogStore, RankingKind, RankingRecord, Site,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Output of a dataset scoring pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetScores {
    /// Raw strategy score per dataset
    pub popularity: BTreeMap<String, f64>,
    /// Normalized replica target per dataset
    pub targets: BTreeMap<String, u32>,
}

/// Configured soft storage limits, in bytes, taking precedence over the
/// site registry's `soft_limit_bytes`.
///
/// A per-site entry wins over `default`; sites with neither keep the
/// registry value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<u64>,

    #[serde(flatten)]
    pub sites: BTreeMap<String, u64>,
}

impl SoftLimits {
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.sites.is_empty()
    }

    /// Soft limit in force for `site`
    pub fn limit_for(&self, site: &Site) -> u64 {
        self.sites
            .get(&site.name)
            .copied()
            .or(self.default)
            .unwrap_or(site.soft_limit_bytes)
    }

    /// Signed distance above the soft limit in force
    pub fn overage(&self, site: &Site) -> i64 {
        site.used_bytes as i64 - self.limit_for(site) as i64
    }
}

/// Scores datasets and sites for a run date and records the results.
///
/// Passes only read the catalog; the ranking records they write are their
/// sole side effect. Records for days before `today` are history and are
/// only written where none exist yet.
pub struct RankingEngine {
    store: Arc<dyn CatalogStore>,
    strategy: Arc<dyn PopularityStrategy>,
    max_replicas: u32,
    soft_limits: SoftLimits,
    today: NaiveDate,
}

impl RankingEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        strategy: Arc<dyn PopularityStrategy>,
        max_replicas: u32,
    ) -> Self {
        Self {
            store,
            strategy,
            max_replicas,
            soft_limits: SoftLimits::default(),
            today: Utc::now().date_naive(),
        }
    }

    pub fn with_soft_limits(mut self, soft_limits: SoftLimits) -> Self {
        self.soft_limits = soft_limits;
        self
    }

    /// Day whose rankings may still be rewritten; earlier days are kept
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Load the snapshot a pass for `date` scores against
    pub async fn context(&self, date: NaiveDate) -> Result<ScoringContext, RankingError> {
        let datasets = self.store.list_datasets().await?;
        let records = self
            .store
            .popularity_since(ScoringContext::window_start(date), date - Duration::days(1))
            .await?;
        Ok(ScoringContext::new(datasets, records))
    }

    /// Popularity and replica target for every catalogued dataset
    pub async fn score_datasets(&self, date: NaiveDate) -> Result<DatasetScores, RankingError> {
        let ctx = self.context(date).await?;

        let popularity: BTreeMap<String, f64> = ctx
            .datasets()
            .map(|ds| {
                let score = self.strategy.popularity(&ctx, &ds.name, date);
                (ds.name.clone(), score)
            })
            .collect();
        let targets = normalize(&popularity, self.max_replicas);

        for (name, score) in &popularity {
            let target = targets.get(name).copied().unwrap_or(1);
            self.record(RankingRecord {
                name: name.clone(),
                date,
                strategy: self.strategy.name().to_string(),
                kind: RankingKind::Dataset,
                popularity: *score,
                rank: target as f64,
            })
            .await?;
        }

        info!(
            date = %date,
            strategy = self.strategy.name(),
            datasets = popularity.len(),
            "scored datasets"
        );
        Ok(DatasetScores {
            popularity,
            targets,
        })
    }

    /// Allocation rank for every active site.
    ///
    /// `performance * [available > 0] / sum(targets of resident datasets)`,
    /// with 0 when the site hosts nothing or the sum is zero.
    pub async fn score_sites(
        &self,
        date: NaiveDate,
        dataset_targets: &BTreeMap<String, u32>,
    ) -> Result<BTreeMap<String, f64>, RankingError> {
        let sites = self.store.active_sites().await?;
        let datasets = self.store.list_datasets().await?;

        let mut resident: BTreeMap<&str, f64> = BTreeMap::new();
        for ds in &datasets {
            let target = dataset_targets.get(&ds.name).copied().unwrap_or(0) as f64;
            for site in &ds.replicas {
                *resident.entry(site.as_str()).or_default() += target;
            }
        }

        let mut ranks = BTreeMap::new();
        for site in &sites {
            let aggregate = resident.get(site.name.as_str()).copied().unwrap_or(0.0);
            let rank = site_rank(site, aggregate);
            self.record(RankingRecord {
                name: site.name.clone(),
                date,
                strategy: self.strategy.name().to_string(),
                kind: RankingKind::Site,
                popularity: aggregate,
                rank,
            })
            .await?;
            debug!(site = %site.name, aggregate, rank, "ranked site");
            ranks.insert(site.name.clone(), rank);
        }

        info!(date = %date, sites = ranks.len(), "scored sites");
        Ok(ranks)
    }

    /// Bytes each active site sits above its soft limit once `pending`
    /// replicate actions land. Only sites with a positive overage are
    /// returned.
    pub async fn storage_overage(
        &self,
        pending: &[Action],
    ) -> Result<BTreeMap<String, i64>, RankingError> {
        let sizes: BTreeMap<String, u64> = self
            .store
            .list_datasets()
            .await?
            .into_iter()
            .map(|d| (d.name, d.size_bytes))
            .collect();

        let mut overage: BTreeMap<String, i64> = self
            .store
            .active_sites()
            .await?
            .into_iter()
            .map(|s| {
                let o = self.soft_limits.overage(&s);
                (s.name, o)
            })
            .collect();

        for action in pending.iter().filter(|a| a.kind == ActionKind::Replicate) {
            let size = sizes.get(&action.dataset).copied().unwrap_or(0) as i64;
            if let Some(o) = overage.get_mut(&action.site) {
                *o += size;
            }
        }

        overage.retain(|_, o| *o > 0);
        Ok(overage)
    }

    async fn record(&self, record: RankingRecord) -> Result<(), RankingError> {
        if record.date >= self.today {
            self.store.upsert_ranking(&record).await?;
        } else if !self.store.insert_ranking_if_absent(&record).await? {
            debug!(name = %record.name, date = %record.date, "past ranking kept");
        }
        Ok(())
    }
}

fn site_rank(site: &Site, aggregate: f64) -> f64 {
    let indicator = if site.available_bytes() > 0 { 1.0 } else { 0.0 };
    if aggregate <= 0.0 {
        return 0.0;
    }
    let rank = site.performance * indicator / aggregate;
    if rank.is_finite() {
        rank
    } else {
        0.0
    }
}
