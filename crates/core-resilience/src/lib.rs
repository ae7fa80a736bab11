//! Ballast Core Resilience: pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! Upstream catalogs fail in two ways: briefly (timeouts, resets) and for
//! good (bad requests, missing records). This crate gives the ingestion
//! pipeline the pieces it needs to tell those apart:
//!
//! - **Retry**: bounded attempts with fixed, linear or exponential backoff
//! - **Dead-Letter Queue**: bounded quarantine for items that still failed
//!
//! The crate has no knowledge of catalogs, stores or the network.

pub mod dead_letter;
pub mod error;
pub mod retry;

pub use dead_letter::{DeadLetterEntry, DeadLetterQueue, DeadLetterStats, FailureReason};
pub use error::ResilienceError;
pub use retry::{retry, BackoffStrategy, RetryPolicy};

/// Result type for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;
