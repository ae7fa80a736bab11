//! Ballast Balancer: the Rocker Board control loop
//!
//! Turns replica targets and site ranks into concrete replicate and delete
//! actions under a per-cycle byte budget. The balancer never touches the
//! catalog; it returns [`Action`](ballast_core_catalog::Action)s and the
//! caller decides what to submit and write back.
//!
//! ```
//! use ballast_core_balancer::{NeedTable, ReplicateInput, RockerBoard};
//! use std::collections::BTreeMap;
//!
//! let mut needs = NeedTable::new();
//! needs.insert("/Alpha/Run1/AOD", 1, 10, ["T1_US"]);
//!
//! let input = ReplicateInput {
//!     site_ranks: BTreeMap::from([("T2_DE".to_string(), 0.5)]),
//!     available_bytes: BTreeMap::from([("T2_DE".to_string(), 100)]),
//!     max_bytes: 1_000,
//! };
//! let outcome = RockerBoard::seeded(7).replicate(&mut needs, &input);
//! assert_eq!(outcome.subscriptions.len(), 1);
//! ```

pub mod chooser;
pub mod need;
pub mod rocker;

pub use chooser::WeightedChooser;
pub use need::{NeedEntry, NeedTable};
pub use rocker::{CleanInput, CleanOutcome, ReplicateInput, ReplicateOutcome, RockerBoard};
