//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use spot_test_orchestrator::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::env_file::EnvOverlay;
pub use crate::core::errors::{Result, StoError};

// Cluster
pub use crate::cluster::{
    CliClusterAdapter, ClusterAdapter, ClusterEvent, InMemoryCluster, NodeInfo, PodInfo,
    ScaleSetInstance, capture_snapshot,
};

// Model
pub use crate::model::{
    ClusterSnapshot, EvictionEvent, Framework, RemediationAction, RemediationKind, TestReport,
    TestResult, TestStatus,
};

// Monitor
pub use crate::monitor::{EvictionMonitor, EvictionSummary};

// Runners and remediators
pub use crate::remediation::{Remediator, default_remediators};
pub use crate::runners::{SuiteInvocation, SuiteOutcome, SuiteRunner};

// Orchestration and reporting
pub use crate::orchestrator::RunController;
pub use crate::report::{ReportFormat, write_reports};
