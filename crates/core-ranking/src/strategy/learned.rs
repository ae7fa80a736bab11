//! Model-backed strategy
//!
//! A classifier decides whether a dataset's popularity is moving; when it
//! is not, the recent average is used directly, otherwise a regressor
//! predicts the coming level. Both models are opaque behind traits.

use super::{PopularityStrategy, Trend};
use crate::context::ScoringContext;
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

/// Days of history fed to the models
pub const FEATURE_DAYS: usize = 7;

/// One value per day, oldest first
pub type Features = [f64; FEATURE_DAYS];

pub trait TrendClassifier: Send + Sync {
    fn classify(&self, features: &Features, data_tier: &str) -> Trend;
}

pub trait PopularityRegressor: Send + Sync {
    fn predict(&self, features: &Features, data_tier: &str) -> f64;
}

/// Daily `ln(accesses) * ln(cpu_seconds)` over `[date-7, date-1]`.
///
/// Days without a record, or with either value at or below 1, contribute 0.
pub fn features(ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> Features {
    let mut out = [0.0; FEATURE_DAYS];
    for (i, slot) in out.iter_mut().enumerate() {
        let day = date - Duration::days((FEATURE_DAYS - i) as i64);
        *slot = match ctx.record(dataset, day) {
            Some(rec) if rec.accesses > 1 && rec.cpu_seconds > 1.0 => {
                (rec.accesses as f64).ln() * rec.cpu_seconds.ln()
            }
            _ => 0.0,
        };
    }
    out
}

/// Least-squares line through the feature days.
///
/// Serves as both classifier (sign of the slope beyond a dead band) and
/// regressor (the line evaluated at the middle of the next window).
#[derive(Debug, Clone, Copy)]
pub struct LinearTrendModel {
    /// Slopes within `±threshold` classify as unchanged
    pub threshold: f64,
}

impl Default for LinearTrendModel {
    fn default() -> Self {
        Self { threshold: 0.05 }
    }
}

impl LinearTrendModel {
    fn fit(features: &Features) -> (f64, f64) {
        let n = FEATURE_DAYS as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = features.iter().sum::<f64>() / n;

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in features.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (y - mean_y);
            den += dx * dx;
        }
        let slope = num / den;
        (slope, mean_y - slope * mean_x)
    }
}

impl TrendClassifier for LinearTrendModel {
    fn classify(&self, features: &Features, _data_tier: &str) -> Trend {
        let (slope, _) = Self::fit(features);
        if slope > self.threshold {
            Trend::Increasing
        } else if slope < -self.threshold {
            Trend::Decreasing
        } else {
            Trend::Unchanged
        }
    }
}

impl PopularityRegressor for LinearTrendModel {
    fn predict(&self, features: &Features, _data_tier: &str) -> f64 {
        let (slope, intercept) = Self::fit(features);
        // Middle of the following seven days
        let x = FEATURE_DAYS as f64 + (FEATURE_DAYS as f64 - 1.0) / 2.0;
        (intercept + slope * x).max(0.0)
    }
}

/// Trend classification plus regression of the expected level
pub struct LearnedStrategy {
    classifier: Arc<dyn TrendClassifier>,
    regressor: Arc<dyn PopularityRegressor>,
}

impl LearnedStrategy {
    pub fn new(
        classifier: Arc<dyn TrendClassifier>,
        regressor: Arc<dyn PopularityRegressor>,
    ) -> Self {
        Self {
            classifier,
            regressor,
        }
    }

    /// Both roles served by the built-in [`LinearTrendModel`]
    pub fn linear() -> Self {
        let model = Arc::new(LinearTrendModel::default());
        Self::new(model.clone(), model)
    }

    /// Log of the mean daily activity over the feature window
    fn average_popularity(ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> f64 {
        let start = date - Duration::days(FEATURE_DAYS as i64);
        let end = date - Duration::days(1);
        let avg = ctx.window_activity(dataset, start, end) / FEATURE_DAYS as f64;
        if avg < 1.0 {
            0.0
        } else {
            avg.ln()
        }
    }

    fn tier<'a>(ctx: &'a ScoringContext, dataset: &str) -> &'a str {
        ctx.dataset(dataset)
            .map(|d| d.data_tier.as_str())
            .unwrap_or("")
    }
}

impl PopularityStrategy for LearnedStrategy {
    fn name(&self) -> &str {
        "learned"
    }

    fn popularity(&self, ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> f64 {
        let f = features(ctx, dataset, date);
        let tier = Self::tier(ctx, dataset);
        match self.classifier.classify(&f, tier) {
            Trend::Unchanged => Self::average_popularity(ctx, dataset, date),
            _ => {
                let predicted = self.regressor.predict(&f, tier);
                if predicted.is_finite() {
                    predicted
                } else {
                    0.0
                }
            }
        }
    }

    fn trend(&self, ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> Trend {
        let f = features(ctx, dataset, date);
        self.classifier.classify(&f, Self::tier(ctx, dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_core_catalog::{Dataset, PopularityRecord};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn rec(d: u32, accesses: u64, cpu: f64) -> PopularityRecord {
        PopularityRecord {
            dataset: "/A".into(),
            date: date(d),
            accesses,
            cpu_seconds: cpu,
            users: 1,
        }
    }

    struct Fixed(Trend, f64);

    impl TrendClassifier for Fixed {
        fn classify(&self, _: &Features, _: &str) -> Trend {
            self.0
        }
    }

    impl PopularityRegressor for Fixed {
        fn predict(&self, _: &Features, _: &str) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_features_cover_previous_week() {
        let ctx = ScoringContext::new(vec![], vec![rec(3, 10, 10.0), rec(9, 1, 50.0)]);
        let f = features(&ctx, "/A", date(10));
        // Index 0 is the 3rd, index 6 is the 9th
        assert!((f[0] - 10f64.ln() * 10f64.ln()).abs() < 1e-12);
        assert_eq!(f[6], 0.0);
        assert_eq!(f[1..6], [0.0; 5]);
    }

    #[test]
    fn test_unchanged_trend_uses_average() {
        let ctx = ScoringContext::new(
            vec![Dataset::new("/A", 1, 1)],
            (3..=9).map(|d| rec(d, 2, 3.5)).collect(),
        );
        let fixed = Arc::new(Fixed(Trend::Unchanged, 99.0));
        let strategy = LearnedStrategy::new(fixed.clone(), fixed);
        let pop = strategy.popularity(&ctx, "/A", date(10));
        assert!((pop - 7f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_moving_trend_uses_regressor() {
        let ctx = ScoringContext::new(vec![Dataset::new("/A", 1, 1)], vec![]);
        let fixed = Arc::new(Fixed(Trend::Increasing, 4.5));
        let strategy = LearnedStrategy::new(fixed.clone(), fixed);
        assert_eq!(strategy.popularity(&ctx, "/A", date(10)), 4.5);
        assert_eq!(strategy.trend(&ctx, "/A", date(10)), Trend::Increasing);
    }

    #[test]
    fn test_linear_model_classifies_slope() {
        let model = LinearTrendModel::default();
        let rising = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(model.classify(&rising, "AOD"), Trend::Increasing);
        assert!((model.predict(&rising, "AOD") - 10.0).abs() < 1e-9);

        let falling = [6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0];
        assert_eq!(model.classify(&falling, "AOD"), Trend::Decreasing);
        assert_eq!(model.predict(&falling, "AOD"), 0.0);

        let flat = [2.0; FEATURE_DAYS];
        assert_eq!(model.classify(&flat, "AOD"), Trend::Unchanged);
    }

    #[test]
    fn test_quiet_dataset_scores_zero() {
        let ctx = ScoringContext::new(vec![Dataset::new("/A", 1, 1)], vec![]);
        assert_eq!(LearnedStrategy::linear().popularity(&ctx, "/A", date(10)), 0.0);
    }
}
