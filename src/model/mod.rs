//! Result and report data model shared by runners, remediators, and reporters.

pub mod report;
pub mod result;

pub use report::{
    Aggregate, ClusterSnapshot, EvictionEvent, RemediationAction, RemediationKind, StatusCounts,
    TestReport,
};
pub use result::{Assertion, Framework, TestResult, TestStatus};
