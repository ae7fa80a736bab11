/*!
 * Ballast - popularity-driven replica placement
 *
 * Keeps dataset replicas spread across a federation of storage sites in
 * proportion to how much each dataset is used:
 * - Concurrent ingestion of sites, datasets and daily popularity
 * - Pluggable popularity strategies normalized to replica targets
 * - Rocker Board replicate and clean phases under a storage budget
 * - Per-site batch submission with audit logging
 *
 * The building blocks live in the `ballast-core-*` crates; this crate
 * wires them into a [`cycle::Cycle`] driven by one [`BallastConfig`].
 */

pub mod audit;
pub mod config;
pub mod cycle;
pub mod error;
pub mod logging;
pub mod stats;
pub mod submit;

// Re-export commonly used types
pub use config::BallastConfig;
pub use cycle::{BalancePlan, Cycle, IngestSummary, Upstream};
pub use error::{BallastError, Result};
pub use stats::{CycleReport, CycleStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
