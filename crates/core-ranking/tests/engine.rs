use ballast_core_catalog::{
    Action, CatalogStore, Dataset, MemoryStore, PopularityRecord, RankingKind, Site,
};
use ballast_core_ranking::{
    PopularityStrategy, RankingEngine, ScoringContext, SoftLimits, StrategyKind, Trend,
};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;

const GB: u64 = 1_000_000_000;
const TB: u64 = 1_000 * GB;

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

/// Returns a fixed score per dataset
struct Table(BTreeMap<String, f64>);

impl PopularityStrategy for Table {
    fn name(&self) -> &str {
        "table"
    }

    fn popularity(&self, _: &ScoringContext, dataset: &str, _: NaiveDate) -> f64 {
        self.0.get(dataset).copied().unwrap_or(0.0)
    }

    fn trend(&self, _: &ScoringContext, _: &str, _: NaiveDate) -> Trend {
        Trend::Unchanged
    }
}

fn site(name: &str, quota: u64, used: u64, soft: u64, performance: f64) -> Site {
    Site {
        name: name.into(),
        quota_bytes: quota,
        used_bytes: used,
        soft_limit_bytes: soft,
        performance,
        active: true,
    }
}

async fn seeded_store() -> Arc<dyn CatalogStore> {
    let store: Arc<dyn CatalogStore> = Arc::new(MemoryStore::new());
    store
        .upsert_dataset(&Dataset::new("ds1", 10 * GB, 10).with_replicas(["S1"]))
        .await
        .unwrap();
    store
        .upsert_dataset(&Dataset::new("ds2", 5 * GB, 5).with_replicas(["S1", "S2"]))
        .await
        .unwrap();
    store
        .upsert_dataset(&Dataset::new("ds3", 2 * GB, 2).with_replicas(["S2"]))
        .await
        .unwrap();
    store
        .upsert_site(&site("S1", 100 * TB, 50 * TB, 90 * TB, 4.0))
        .await
        .unwrap();
    store
        .upsert_site(&site("S2", 100 * TB, 95 * TB, 90 * TB, 9.0))
        .await
        .unwrap();
    store
        .upsert_site(&site("S3", 100 * TB, 10 * TB, 90 * TB, 3.0))
        .await
        .unwrap();
    store
}

fn table_engine(store: Arc<dyn CatalogStore>) -> RankingEngine {
    let scores = [("ds1", 1.0), ("ds2", 5.0), ("ds3", 10.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    RankingEngine::new(store, Arc::new(Table(scores)), 5)
}

#[tokio::test]
async fn dataset_targets_are_normalized_and_persisted() {
    let store = seeded_store().await;
    let engine = table_engine(store.clone());

    let scores = engine.score_datasets(run_date()).await.unwrap();
    assert_eq!(scores.targets["ds1"], 1);
    assert_eq!(scores.targets["ds3"], 5);
    assert!(scores.targets["ds2"] > 1 && scores.targets["ds2"] < 5);

    let records = store
        .rankings(RankingKind::Dataset, run_date(), "table")
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].name, "ds3");
    assert_eq!(records[2].rank, 5.0);
    assert_eq!(records[2].popularity, 10.0);
}

#[tokio::test]
async fn site_rank_divides_performance_by_resident_targets() {
    let store = seeded_store().await;
    let engine = table_engine(store.clone());
    let scores = engine.score_datasets(run_date()).await.unwrap();
    let ranks = engine
        .score_sites(run_date(), &scores.targets)
        .await
        .unwrap();

    let t = &scores.targets;
    let s1 = 4.0 / (t["ds1"] + t["ds2"]) as f64;
    let s2 = 9.0 / (t["ds2"] + t["ds3"]) as f64;
    assert!((ranks["S1"] - s1).abs() < 1e-12);
    assert!((ranks["S2"] - s2).abs() < 1e-12);
    // S3 hosts nothing
    assert_eq!(ranks["S3"], 0.0);

    let records = store
        .rankings(RankingKind::Site, run_date(), "table")
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test]
async fn scoring_is_repeatable_for_a_date() {
    let store = seeded_store().await;
    for d in 1..=14 {
        store
            .upsert_popularity(&PopularityRecord {
                dataset: "ds2".into(),
                date: NaiveDate::from_ymd_opt(2026, 10, d).unwrap(),
                accesses: d as u64 * 3,
                cpu_seconds: 100.0,
                users: 2,
            })
            .await
            .unwrap();
    }
    let engine = RankingEngine::new(store.clone(), StrategyKind::Delta.build(), 4);

    let first = engine.score_datasets(run_date()).await.unwrap();
    let second = engine.score_datasets(run_date()).await.unwrap();
    assert_eq!(first, second);
    assert!(first.popularity["ds2"] > 0.0);
    assert_eq!(first.targets["ds2"], 4);
    assert_eq!(
        store
            .rankings(RankingKind::Dataset, run_date(), "delta")
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn overage_includes_pending_replications() {
    let store = seeded_store().await;
    let engine = table_engine(store.clone());

    let overage = engine.storage_overage(&[]).await.unwrap();
    assert_eq!(overage.len(), 1);
    assert_eq!(overage["S2"], (5 * TB) as i64);

    // S1 sits 40TB under its soft limit; 10GB of pending work keeps it there
    let pending = vec![Action::replicate("ds1", "S2"), Action::replicate("ds3", "S1")];
    let overage = engine.storage_overage(&pending).await.unwrap();
    assert_eq!(overage["S2"], (5 * TB + 10 * GB) as i64);
    assert!(!overage.contains_key("S1"));
}

fn stored(records: &[ballast_core_catalog::RankingRecord]) -> Vec<(String, f64, f64)> {
    records
        .iter()
        .map(|r| (r.name.clone(), r.popularity, r.rank))
        .collect()
}

#[tokio::test]
async fn past_rankings_are_kept_as_history() {
    let store = seeded_store().await;
    let past = run_date();
    let engine = RankingEngine::new(store.clone(), StrategyKind::Delta.build(), 5)
        .with_today(past + Duration::days(10));

    // No popularity yet: every dataset scores zero
    engine.score_datasets(past).await.unwrap();
    let before = store
        .rankings(RankingKind::Dataset, past, "delta")
        .await
        .unwrap();
    assert!(before.iter().all(|r| r.popularity == 0.0 && r.rank == 1.0));

    store
        .upsert_popularity(&PopularityRecord {
            dataset: "ds1".into(),
            date: past - Duration::days(3),
            accesses: 100,
            cpu_seconds: 100.0,
            users: 3,
        })
        .await
        .unwrap();
    let rescored = engine.score_datasets(past).await.unwrap();
    assert!(rescored.popularity["ds1"] > 0.0);

    let after = store
        .rankings(RankingKind::Dataset, past, "delta")
        .await
        .unwrap();
    assert_eq!(stored(&after), stored(&before));
}

#[tokio::test]
async fn current_day_rankings_are_refreshed() {
    let store = seeded_store().await;
    let engine = RankingEngine::new(store.clone(), StrategyKind::Delta.build(), 5)
        .with_today(run_date());

    engine.score_datasets(run_date()).await.unwrap();
    store
        .upsert_popularity(&PopularityRecord {
            dataset: "ds1".into(),
            date: run_date() - Duration::days(1),
            accesses: 100,
            cpu_seconds: 100.0,
            users: 3,
        })
        .await
        .unwrap();
    engine.score_datasets(run_date()).await.unwrap();

    let records = store
        .rankings(RankingKind::Dataset, run_date(), "delta")
        .await
        .unwrap();
    let ds1 = records.iter().find(|r| r.name == "ds1").unwrap();
    assert!(ds1.popularity > 0.0);
    assert_eq!(ds1.rank, 5.0);
}

#[tokio::test]
async fn configured_soft_limit_overrides_registry() {
    let store = seeded_store().await;
    // S1 holds 50TB against a 90TB registry limit
    let limits = SoftLimits {
        default: None,
        sites: BTreeMap::from([("S1".to_string(), 40 * TB)]),
    };
    let engine = table_engine(store.clone()).with_soft_limits(limits);

    let overage = engine.storage_overage(&[]).await.unwrap();
    assert_eq!(overage["S1"], (10 * TB) as i64);
    assert_eq!(overage["S2"], (5 * TB) as i64);

    // A default applies to every site without its own entry
    let limits = SoftLimits {
        default: Some(5 * TB),
        sites: BTreeMap::from([("S2".to_string(), 100 * TB)]),
    };
    let engine = table_engine(store.clone()).with_soft_limits(limits);
    let overage = engine.storage_overage(&[]).await.unwrap();
    assert_eq!(overage["S1"], (45 * TB) as i64);
    assert_eq!(overage["S3"], (5 * TB) as i64);
    assert!(!overage.contains_key("S2"));
}

#[tokio::test]
async fn departed_sites_are_not_cleanup_candidates() {
    let store = seeded_store().await;
    store.set_site_active("S2", false).await.unwrap();
    let engine = table_engine(store.clone());

    let overage = engine.storage_overage(&[]).await.unwrap();
    assert!(overage.is_empty());
}
