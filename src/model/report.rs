//! Run-scoped report aggregate and the pure summary derivation over it.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::result::{TestResult, TestStatus};

/// Number of failures surfaced as "top failures".
pub const TOP_FAILURE_COUNT: usize = 5;

/// Failure-pattern keys are the first line of the error, cut to this many chars.
pub const FAILURE_PATTERN_LEN: usize = 50;

/// Four counters kept per framework, per category, and overall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TestStatus) {
        self.total += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
        }
    }

    /// Percentage of passes; 0 when nothing ran.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total as f64 * 100.0
    }
}

/// Point-in-time cluster counts captured before and after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_nodes: usize,
    pub ready_nodes: usize,
    pub spot_nodes: usize,
    pub total_pods: usize,
    pub pending_pods: usize,
    #[serde(default)]
    pub node_pool_counts: BTreeMap<String, usize>,
}

impl ClusterSnapshot {
    /// Placeholder used when the cluster could not be listed.
    #[must_use]
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total_nodes: 0,
            ready_nodes: 0,
            spot_nodes: 0,
            total_pods: 0,
            pending_pods: 0,
            node_pool_counts: BTreeMap::new(),
        }
    }
}

/// Corrective operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    GhostInstanceDelete,
    StuckNodeDelete,
}

impl RemediationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GhostInstanceDelete => "ghost_instance_delete",
            Self::StuckNodeDelete => "stuck_node_delete",
        }
    }
}

/// One attempted corrective operation, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub timestamp: DateTime<Utc>,
    pub action_type: RemediationKind,
    pub target: String,
    pub success: bool,
    pub details: String,
}

/// Node-level eviction observed while suites ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionEvent {
    /// Source-provided identity used for dedup across polls.
    pub uid: String,
    pub timestamp: DateTime<Utc>,
    pub node: String,
    pub reason: String,
    pub message: String,
}

/// Everything derivable from the flat result list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub overall: StatusCounts,
    pub by_framework: BTreeMap<String, StatusCounts>,
    pub by_category: BTreeMap<String, StatusCounts>,
    pub top_failures: Vec<TestResult>,
    pub failure_patterns: BTreeMap<String, usize>,
}

impl Aggregate {
    /// Pure, deterministic rollup of a result list.
    #[must_use]
    pub fn compute(results: &[TestResult]) -> Self {
        let mut aggregate = Self::default();
        for result in results {
            aggregate.overall.record(result.status);
            aggregate
                .by_framework
                .entry(result.framework.to_string())
                .or_default()
                .record(result.status);
            aggregate
                .by_category
                .entry(result.category.clone())
                .or_default()
                .record(result.status);
        }

        let mut failures: Vec<&TestResult> = results
            .iter()
            .filter(|r| r.status == TestStatus::Fail)
            .collect();
        failures.sort_by(|a, b| a.test_id.cmp(&b.test_id));
        aggregate.top_failures = failures
            .iter()
            .take(TOP_FAILURE_COUNT)
            .map(|r| (*r).clone())
            .collect();

        for failure in &failures {
            if let Some(message) = failure.error_message.as_deref() {
                *aggregate
                    .failure_patterns
                    .entry(failure_pattern(message))
                    .or_default() += 1;
            }
        }

        aggregate
    }
}

/// First line of an error message, truncated on a char boundary.
#[must_use]
pub fn failure_pattern(message: &str) -> String {
    message
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(FAILURE_PATTERN_LEN)
        .collect()
}

/// The run-scoped aggregate root.
///
/// Counter, summary, and failure-analysis fields are derived: they are only
/// written by [`TestReport::calculate_summary`] and exposed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub cluster_name: String,
    pub duration_seconds: f64,

    total_tests: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    pass_rate: f64,

    test_results: Vec<TestResult>,
    framework_summary: BTreeMap<String, StatusCounts>,
    category_summary: BTreeMap<String, StatusCounts>,

    pub initial_state: Option<ClusterSnapshot>,
    pub final_state: Option<ClusterSnapshot>,
    pub eviction_events: Vec<EvictionEvent>,
    pub eviction_rate_per_hour: f64,
    pub remediation_actions: Vec<RemediationAction>,

    top_failures: Vec<TestResult>,
    failure_patterns: BTreeMap<String, usize>,

    /// Set when preflight failed fatally and no suite ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl Default for TestReport {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TestReport {
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id: new_run_id(),
            timestamp,
            cluster_name: String::new(),
            duration_seconds: 0.0,
            total_tests: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            pass_rate: 0.0,
            test_results: Vec::new(),
            framework_summary: BTreeMap::new(),
            category_summary: BTreeMap::new(),
            initial_state: None,
            final_state: None,
            eviction_events: Vec::new(),
            eviction_rate_per_hour: 0.0,
            remediation_actions: Vec::new(),
            top_failures: Vec::new(),
            failure_patterns: BTreeMap::new(),
            abort_reason: None,
        }
    }

    /// Append results from one suite. Appended results are never modified.
    pub fn extend_results(&mut self, results: impl IntoIterator<Item = TestResult>) {
        self.test_results.extend(results);
    }

    /// Recompute every derived field from `test_results`. Idempotent.
    pub fn calculate_summary(&mut self) {
        let aggregate = Aggregate::compute(&self.test_results);
        self.total_tests = aggregate.overall.total;
        self.passed = aggregate.overall.passed;
        self.failed = aggregate.overall.failed;
        self.skipped = aggregate.overall.skipped;
        self.pass_rate = aggregate.overall.pass_rate();
        self.framework_summary = aggregate.by_framework;
        self.category_summary = aggregate.by_category;
        self.top_failures = aggregate.top_failures;
        self.failure_patterns = aggregate.failure_patterns;
    }

    /// Process exit code: non-zero on any failure or an aborted run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.abort_reason.is_some() || self.failed > 0)
    }

    #[must_use]
    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    #[must_use]
    pub fn total_tests(&self) -> usize {
        self.total_tests
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.passed
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        self.pass_rate
    }

    #[must_use]
    pub fn framework_summary(&self) -> &BTreeMap<String, StatusCounts> {
        &self.framework_summary
    }

    #[must_use]
    pub fn category_summary(&self) -> &BTreeMap<String, StatusCounts> {
        &self.category_summary
    }

    #[must_use]
    pub fn top_failures(&self) -> &[TestResult] {
        &self.top_failures
    }

    #[must_use]
    pub fn failure_patterns(&self) -> &BTreeMap<String, usize> {
        &self.failure_patterns
    }

    /// Successful remediation actions.
    #[must_use]
    pub fn remediation_successes(&self) -> usize {
        self.remediation_actions.iter().filter(|a| a.success).count()
    }
}

/// Random RFC 4122 version-4 style identifier.
fn new_run_id() -> String {
    let mut bytes: [u8; 16] = rand::random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::result::Framework;

    fn result(id: &str, framework: Framework, category: &str, status: TestStatus) -> TestResult {
        TestResult::new(id, id, category, framework, status, 1.0)
    }

    #[test]
    fn empty_report_has_zero_pass_rate() {
        let mut report = TestReport::default();
        report.calculate_summary();
        assert_eq!(report.total_tests(), 0);
        assert!(report.pass_rate().abs() < f64::EPSILON);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn counters_match_results() {
        let mut report = TestReport::default();
        report.extend_results([
            result("A", Framework::Bash, "eviction", TestStatus::Pass),
            result("B", Framework::Bash, "eviction", TestStatus::Fail),
            result("C", Framework::Python, "pdb", TestStatus::Skip),
            result("D", Framework::Python, "pdb", TestStatus::Pass),
        ]);
        report.calculate_summary();

        assert_eq!(report.total_tests(), 4);
        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!((report.pass_rate() - 50.0).abs() < 1e-9);
        assert_eq!(report.framework_summary()["bash"].failed, 1);
        assert_eq!(report.category_summary()["pdb"].skipped, 1);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn calculate_summary_is_idempotent() {
        let mut report = TestReport::default();
        report.extend_results([
            result("A", Framework::Bash, "x", TestStatus::Pass),
            result("B", Framework::Bash, "x", TestStatus::Fail),
        ]);
        report.calculate_summary();
        let first = report.clone();
        report.calculate_summary();
        assert_eq!(report, first);
        assert_eq!(report.framework_summary()["bash"].total, 2);
    }

    #[test]
    fn top_failures_are_five_smallest_ids_ascending() {
        let ids = ["Z-1", "A-2", "M-3", "B-4", "C-5", "D-6"];
        let results: Vec<TestResult> = ids
            .iter()
            .map(|id| result(id, Framework::Bash, "x", TestStatus::Fail))
            .collect();
        let aggregate = Aggregate::compute(&results);
        let top: Vec<&str> = aggregate
            .top_failures
            .iter()
            .map(|r| r.test_id.as_str())
            .collect();
        assert_eq!(top, vec!["A-2", "B-4", "C-5", "D-6", "M-3"]);
    }

    #[test]
    fn failure_patterns_group_by_truncated_first_line() {
        let long = "x".repeat(80);
        let results = vec![
            result("A", Framework::Bash, "x", TestStatus::Fail)
                .with_error("pods pending on spot pool\ntrace line 1"),
            result("B", Framework::Bash, "x", TestStatus::Fail)
                .with_error("pods pending on spot pool\ntrace line 2"),
            result("C", Framework::Python, "x", TestStatus::Fail).with_error(long.clone()),
            result("D", Framework::Python, "x", TestStatus::Fail),
            result("E", Framework::Python, "x", TestStatus::Pass).with_error("ignored"),
        ];
        let aggregate = Aggregate::compute(&results);
        assert_eq!(aggregate.failure_patterns.len(), 2);
        assert_eq!(aggregate.failure_patterns["pods pending on spot pool"], 2);
        assert_eq!(aggregate.failure_patterns[&"x".repeat(50)], 1);
    }

    #[test]
    fn failure_pattern_truncates_on_char_boundary() {
        let message = "é".repeat(60);
        assert_eq!(failure_pattern(&message).chars().count(), FAILURE_PATTERN_LEN);
        assert_eq!(failure_pattern(""), "");
    }

    #[test]
    fn aborted_report_exits_nonzero_without_results() {
        let mut report = TestReport::default();
        report.abort_reason = Some("cluster unreachable".to_string());
        report.calculate_summary();
        assert_eq!(report.total_tests(), 0);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn run_ids_are_uuid_shaped_and_distinct() {
        let a = new_run_id();
        let b = new_run_id();
        assert_eq!(a.len(), 36);
        assert_eq!(&a[14..15], "4");
        assert_ne!(a, b);
    }

    #[test]
    fn report_json_roundtrip_preserves_derived_fields() {
        let mut report = TestReport::default();
        report.extend_results([result("A", Framework::Terratest, "infra", TestStatus::Fail)
            .with_error("boom")]);
        report.calculate_summary();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"timestamp\":\""));
        let back: TestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
