//! Immutable snapshot the strategies score against

use ballast_core_catalog::{Dataset, PopularityRecord};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Days of history a scoring pass needs before the run date
pub const LOOKBACK_DAYS: i64 = 14;

/// Datasets plus their popularity series over the lookback window.
///
/// Built once per pass so every strategy call is a pure function of it.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    datasets: BTreeMap<String, Dataset>,
    series: BTreeMap<String, BTreeMap<NaiveDate, PopularityRecord>>,
}

impl ScoringContext {
    pub fn new(datasets: Vec<Dataset>, records: Vec<PopularityRecord>) -> Self {
        let datasets = datasets
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        let mut series: BTreeMap<String, BTreeMap<NaiveDate, PopularityRecord>> = BTreeMap::new();
        for rec in records {
            series
                .entry(rec.dataset.clone())
                .or_default()
                .insert(rec.date, rec);
        }
        Self { datasets, series }
    }

    /// First day of history needed to score `date`
    pub fn window_start(date: NaiveDate) -> NaiveDate {
        date - Duration::days(LOOKBACK_DAYS)
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn record(&self, dataset: &str, date: NaiveDate) -> Option<&PopularityRecord> {
        self.series.get(dataset).and_then(|s| s.get(&date))
    }

    /// Activity on one day; a day with no record counts as zero
    pub fn activity(&self, dataset: &str, date: NaiveDate) -> f64 {
        match self.record(dataset, date) {
            Some(rec) => rec.activity(),
            None => 0.0,
        }
    }

    /// Summed activity over `start..=end`
    pub fn window_activity(&self, dataset: &str, start: NaiveDate, end: NaiveDate) -> f64 {
        let Some(series) = self.series.get(dataset) else {
            return 0.0;
        };
        if start > end {
            return 0.0;
        }
        series
            .range(start..=end)
            .map(|(_, rec)| rec.activity())
            .sum()
    }
}
