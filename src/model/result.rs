//! Per-test outcomes normalized across frameworks.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal status of one test. Every framework vocabulary maps onto these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    /// Map a framework-native outcome word onto the canonical status.
    ///
    /// Unrecognized words count as failures so the counters always add up.
    #[must_use]
    pub fn from_outcome(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" | "ok" | "xpassed" => Self::Pass,
            "skip" | "skipped" | "xfailed" => Self::Skip,
            _ => Self::Fail,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The external test frameworks the orchestrator drives, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Terratest,
    Bash,
    Python,
}

impl Framework {
    pub const ALL: [Self; 3] = [Self::Terratest, Self::Bash, Self::Python];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Terratest => "terratest",
            Self::Bash => "bash",
            Self::Python => "python",
        }
    }

    /// Human label used for whole-suite results.
    #[must_use]
    pub const fn suite_label(self) -> &'static str {
        match self {
            Self::Terratest => "Terratest Suite",
            Self::Bash => "Bash Test Suite",
            Self::Python => "Python Test Suite",
        }
    }

    /// Category assigned when a suite fails as a whole.
    #[must_use]
    pub const fn suite_category(self) -> &'static str {
        match self {
            Self::Terratest => "infrastructure",
            Self::Bash | Self::Python => "runtime",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic expected/actual check recorded by a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub description: String,
    #[serde(default)]
    pub expected: serde_json::Value,
    #[serde(default)]
    pub actual: serde_json::Value,
    #[serde(default)]
    pub passed: bool,
}

/// One outcome from any suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub name: String,
    pub category: String,
    pub framework: Framework,
    pub status: TestStatus,
    pub duration_seconds: f64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Free-form diagnostics captured for post-mortem.
    #[serde(default)]
    pub evidence: BTreeMap<String, serde_json::Value>,
    /// Shell commands that reproduce the failure by hand.
    #[serde(default)]
    pub reproduce_commands: Vec<String>,
}

impl TestResult {
    #[must_use]
    pub fn new(
        test_id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        framework: Framework,
        status: TestStatus,
        duration_seconds: f64,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            name: name.into(),
            category: category.into(),
            framework,
            status,
            duration_seconds,
            error_message: None,
            assertions: Vec::new(),
            evidence: BTreeMap::new(),
            reproduce_commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Single FAIL standing in for a suite that produced no parsable results.
    #[must_use]
    pub fn suite_failure(framework: Framework, duration_seconds: f64, message: &str) -> Self {
        Self::new(
            format!("{framework}-suite"),
            framework.suite_label(),
            framework.suite_category(),
            framework,
            TestStatus::Fail,
            duration_seconds,
        )
        .with_error(message)
    }
}
