//! Ballast Ranking: popularity scoring and replica targets
//!
//! A [`RankingEngine`] pass scores every dataset with the configured
//! [`PopularityStrategy`], normalizes the scores into replica targets in
//! `[1, max_replicas]`, then ranks sites by performance against the
//! popularity already resident on them. Both passes persist their results
//! as ranking records and are re-runnable for any past date; records
//! already stored for a past date are kept as history.

pub mod context;
pub mod engine;
pub mod normalize;
pub mod strategy;

pub use context::{ScoringContext, LOOKBACK_DAYS};
pub use engine::{DatasetScores, RankingEngine, SoftLimits};
pub use normalize::{coefficients, normalize};
pub use strategy::{
    DeltaStrategy, LearnedStrategy, LinearTrendModel, PopularityRegressor, PopularityStrategy,
    StrategyKind, Trend, TrendClassifier,
};

use ballast_core_catalog::CatalogError;
use thiserror::Error;

/// Errors raised by a ranking pass
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}
