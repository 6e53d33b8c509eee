//! Cluster Command Adapter: subprocess plumbing, the adapter contract, and its
//! CLI-backed and in-memory implementations.

pub mod adapter;
pub mod exec;
pub mod kubectl;
pub mod memory;
pub mod snapshot;

pub use adapter::{ClusterAdapter, ClusterEvent, NodeInfo, PodInfo, ScaleSetInstance};
pub use kubectl::CliClusterAdapter;
pub use memory::InMemoryCluster;
pub use snapshot::capture_snapshot;
