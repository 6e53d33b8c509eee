//! JSON report: the sole durable artifact of a run.

use std::fs;
use std::path::Path;

use crate::core::errors::{Result, StoError};
use crate::model::TestReport;

/// Pretty-printed JSON with ISO-8601 timestamps.
pub fn render(report: &TestReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Read a stored report and re-derive every summary field from its results.
pub fn load_report(path: &Path) -> Result<TestReport> {
    TestReport::load(path)
}

impl TestReport {
    /// Stored counters are never trusted; they are rebuilt from `test_results`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| StoError::io(path, source))?;
        let mut report: Self =
            serde_json::from_str(&raw).map_err(|e| StoError::MalformedOutput {
                context: "stored report",
                details: format!("{}: {e}", path.display()),
            })?;
        report.calculate_summary();
        Ok(report)
    }
}
