//! Popularity scoring strategies
//!
//! A strategy turns a dataset's recent access history into one popularity
//! value and a trend. Strategies are selected from configuration through
//! [`StrategyKind`] and must be deterministic given their context.

mod delta;
mod learned;

pub use delta::DeltaStrategy;
pub use learned::{
    features, Features, LearnedStrategy, LinearTrendModel, PopularityRegressor, TrendClassifier,
    FEATURE_DAYS,
};

use crate::context::ScoringContext;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Direction of a dataset's recent popularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Unchanged,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Capability shared by every scoring strategy
pub trait PopularityStrategy: Send + Sync {
    /// Name stored on ranking records
    fn name(&self) -> &str;

    fn popularity(&self, ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> f64;

    fn trend(&self, ctx: &ScoringContext, dataset: &str, date: NaiveDate) -> Trend;
}

/// Strategy selection from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Delta,
    Learned,
}

impl StrategyKind {
    pub fn build(self) -> Arc<dyn PopularityStrategy> {
        match self {
            StrategyKind::Delta => Arc::new(DeltaStrategy),
            StrategyKind::Learned => Arc::new(LearnedStrategy::linear()),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Delta => write!(f, "delta"),
            StrategyKind::Learned => write!(f, "learned"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delta" => Ok(StrategyKind::Delta),
            "learned" => Ok(StrategyKind::Learned),
            other => Err(format!("unknown ranking strategy: {}", other)),
        }
    }
}
