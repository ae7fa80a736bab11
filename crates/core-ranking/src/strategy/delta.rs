use super::{PopularityStrategy, Trend};
use crate::context::ScoringContext;
use chrono::{Duration, NaiveDate};

/// Difference of two consecutive 7-day activity windows.
///
/// The window ending the day before `date` is compared with the one
/// before it; a growth above 1 is log-compressed and divided by the
/// dataset size in GB so small hot datasets outrank large lukewarm ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaStrategy;

impl DeltaStrategy {
    fn windows(ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> (f64, f64) {
        let new = ctx.window_activity(dataset, date - Duration::days(7), date - Duration::days(1));
        let old = ctx.window_activity(dataset, date - Duration::days(14), date - Duration::days(8));
        (new, old)
    }
}

impl PopularityStrategy for DeltaStrategy {
    fn name(&self) -> &str {
        "delta"
    }

    fn popularity(&self, ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> f64 {
        let size_gb = match ctx.dataset(dataset) {
            Some(ds) if ds.size_bytes > 0 => ds.size_gb(),
            _ => return 0.0,
        };

        let (new, old) = Self::windows(ctx, dataset, date);
        let delta = new - old;
        let compressed = if delta > 1.0 { delta.ln() } else { 0.0 };
        compressed / size_gb
    }

    fn trend(&self, ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> Trend {
        let (new, old) = Self::windows(ctx, dataset, date);
        if new > old {
            Trend::Increasing
        } else if new < old {
            Trend::Decreasing
        } else {
            Trend::Unchanged
        }
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

    #[test]
    fn test_growth_is_log_compressed_per_gb() {
        // Run date 15th: new window 8..=14, old window 1..=7
        let ctx = ScoringContext::new(
            vec![Dataset::new("/A", 2_000_000_000, 10)],
            vec![rec(2, 1, 10.0), rec(9, 10, 11.0)],
        );
        let pop = DeltaStrategy.popularity(&ctx, "/A", date(15));
        let expected = (110.0_f64 - 10.0).ln() / 2.0;
        assert!((pop - expected).abs() < 1e-12);
        assert_eq!(DeltaStrategy.trend(&ctx, "/A", date(15)), Trend::Increasing);
    }

    #[test]
    fn test_shrinking_or_flat_activity_scores_zero() {
        let ctx = ScoringContext::new(
            vec![Dataset::new("/A", 1_000_000_000, 10)],
            vec![rec(3, 50, 2.0), rec(10, 10, 2.0)],
        );
        assert_eq!(DeltaStrategy.popularity(&ctx, "/A", date(15)), 0.0);
        assert_eq!(DeltaStrategy.trend(&ctx, "/A", date(15)), Trend::Decreasing);

        let empty = ScoringContext::new(vec![Dataset::new("/A", 1_000_000_000, 1)], vec![]);
        assert_eq!(DeltaStrategy.popularity(&empty, "/A", date(15)), 0.0);
        assert_eq!(DeltaStrategy.trend(&empty, "/A", date(15)), Trend::Unchanged);
    }

    #[test]
    fn test_zero_size_or_unknown_dataset() {
        let ctx = ScoringContext::new(vec![Dataset::new("/A", 0, 0)], vec![rec(9, 100, 100.0)]);
        assert_eq!(DeltaStrategy.popularity(&ctx, "/A", date(15)), 0.0);
        assert_eq!(DeltaStrategy.popularity(&ctx, "/nope", date(15)), 0.0);
    }
}
