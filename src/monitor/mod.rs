//! Concurrent observation of the cluster while suites run.

pub mod eviction;

pub use eviction::{EvictionMonitor, EvictionSummary, EvictionTracker, eviction_rate};
