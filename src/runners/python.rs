//! pytest runner over the `pytest-json-report` plugin output.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::Deserialize;

use crate::cluster::exec::{CommandSpec, run_command};
use crate::core::errors::{Result, StoError};
use crate::model::{Framework, TestResult, TestStatus};
use crate::runners::{SuiteInvocation, SuiteOutcome, SuiteRunner, synthesize_suite_failure};

pub const REPORT_FILE: &str = "results.json";

/// `categories/01-pod-distribution/test_x.py::test_y` -> `01-pod-distribution`.
static CATEGORY_RE: LazyLock<Result<Regex>> = LazyLock::new(|| compile(r"categories/([^/]+)/"));

/// `test_dist_001` -> `DIST-001`.
static TEST_ID_RE: LazyLock<Result<Regex>> =
    LazyLock::new(|| compile(r"^test_([A-Za-z]+)_(\d+)"));

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| StoError::Runtime {
        details: format!("invalid pattern {pattern}: {e}"),
    })
}

#[derive(Debug, Clone, Default)]
pub struct PythonRunner {
    /// Relative to the working directory.
    venv_path: Option<PathBuf>,
}

impl PythonRunner {
    #[must_use]
    pub fn new(venv_path: Option<PathBuf>) -> Self {
        Self { venv_path }
    }

    /// `<venv>/bin/pytest` when the venv has an activate script, else `pytest` on PATH.
    fn pytest_program(&self, working_dir: &Path) -> String {
        if let Some(venv) = &self.venv_path {
            let bin = working_dir.join(venv).join("bin");
            if bin.join("activate").exists() {
                let pytest = bin.join("pytest");
                return fs::canonicalize(&pytest)
                    .unwrap_or(pytest)
                    .display()
                    .to_string();
            }
        }
        "pytest".to_string()
    }
}

impl SuiteRunner for PythonRunner {
    fn framework(&self) -> Framework {
        Framework::Python
    }

    fn run(&self, invocation: &SuiteInvocation<'_>) -> Result<SuiteOutcome> {
        let started = Instant::now();
        let report_path = invocation.working_dir.join(REPORT_FILE);
        // A report left by an earlier run would be read as this run's results.
        if report_path.exists() {
            fs::remove_file(&report_path).map_err(|source| StoError::io(&report_path, source))?;
        }

        let spec = CommandSpec::new(
            self.pytest_program(invocation.working_dir),
            invocation.hard_timeout(),
        )
        .args([
            "-v".to_string(),
            "--json-report".to_string(),
            format!("--json-report-file={REPORT_FILE}"),
        ])
        .current_dir(invocation.working_dir)
        .envs(invocation.env);
        let output = run_command(&spec)?;

        let mut results = Vec::new();
        if report_path.exists() {
            let parsed = fs::read_to_string(&report_path)
                .map_err(|source| StoError::io(&report_path, source))
                .and_then(|raw| parse_report(&raw));
            match parsed {
                Ok(parsed) => results = parsed,
                Err(e) => results.push(TestResult::suite_failure(
                    Framework::Python,
                    started.elapsed().as_secs_f64(),
                    &format!("Failed to parse results: {e}"),
                )),
            }
        }
        Ok(synthesize_suite_failure(Framework::Python, results, &output))
    }
}

#[derive(Debug, Deserialize)]
struct PytestReport {
    #[serde(default)]
    tests: Vec<PytestTest>,
}

#[derive(Debug, Deserialize)]
struct PytestTest {
    nodeid: String,
    outcome: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    setup: Option<PytestStage>,
    #[serde(default)]
    call: Option<PytestStage>,
    #[serde(default)]
    teardown: Option<PytestStage>,
}

#[derive(Debug, Deserialize)]
struct PytestStage {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    longrepr: Option<serde_json::Value>,
}

impl PytestTest {
    fn stages(&self) -> impl Iterator<Item = &PytestStage> {
        [&self.setup, &self.call, &self.teardown]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    fn duration(&self) -> f64 {
        self.duration
            .unwrap_or_else(|| self.stages().map(|s| s.duration).sum())
    }

    /// First `longrepr` across stages; an `error` outcome usually fails in setup.
    fn failure_text(&self) -> String {
        self.stages()
            .find_map(|s| s.longrepr.as_ref())
            .map_or_else(
                || "Test failed".to_string(),
                |repr| match repr {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            )
    }

    fn into_result(self) -> TestResult {
        let name = self
            .nodeid
            .rsplit("::")
            .next()
            .unwrap_or(&self.nodeid)
            .to_string();
        let category = category_of(&self.nodeid);
        let status = TestStatus::from_outcome(&self.outcome);
        let mut result = TestResult::new(
            test_id_of(&name),
            name,
            category,
            Framework::Python,
            status,
            self.duration(),
        );
        if status == TestStatus::Fail {
            result.error_message = Some(self.failure_text());
        }
        result.evidence.insert(
            "nodeid".to_string(),
            serde_json::Value::String(self.nodeid),
        );
        result
    }
}

/// Parse a `pytest-json-report` document.
pub fn parse_report(raw: &str) -> Result<Vec<TestResult>> {
    let report: PytestReport = serde_json::from_str(raw).map_err(|e| StoError::MalformedOutput {
        context: "pytest json report",
        details: e.to_string(),
    })?;
    Ok(report
        .tests
        .into_iter()
        .map(PytestTest::into_result)
        .collect())
}

fn category_of(nodeid: &str) -> String {
    CATEGORY_RE
        .as_ref()
        .ok()
        .and_then(|re| re.captures(nodeid))
        .and_then(|c| c.get(1))
        .map_or_else(|| "unknown".to_string(), |m| m.as_str().to_string())
}

fn test_id_of(name: &str) -> String {
    TEST_ID_RE
        .as_ref()
        .ok()
        .and_then(|re| re.captures(name))
        .map_or_else(
            || name.to_string(),
            |c| format!("{}-{}", c[1].to_ascii_uppercase(), &c[2]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{"tests":[
        {"nodeid":"categories/01-pod-distribution/test_spread.py::test_dist_001","outcome":"passed",
         "setup":{"duration":0.1},"call":{"duration":2.0},"teardown":{"duration":0.2}},
        {"nodeid":"categories/03-eviction/test_drain.py::test_evict_004","outcome":"failed",
         "call":{"duration":5.0,"longrepr":"AssertionError: 2 pods pending\nassert 2 == 0"}},
        {"nodeid":"categories/05-pdb/test_pdb.py::test_pdb_budget","outcome":"error",
         "setup":{"duration":0.5,"longrepr":"fixture 'cluster' not found"}},
        {"nodeid":"test_misc.py::test_gpu","outcome":"skipped"},
        {"nodeid":"test_misc.py::test_flaky","outcome":"xfailed"},
        {"nodeid":"test_misc.py::test_lucky","outcome":"xpassed"}
    ]}"#;

    #[test]
    fn maps_outcomes_categories_and_ids() {
        let results = parse_report(REPORT).unwrap();
        assert_eq!(results.len(), 6);

        assert_eq!(results[0].test_id, "DIST-001");
        assert_eq!(results[0].name, "test_dist_001");
        assert_eq!(results[0].category, "01-pod-distribution");
        assert_eq!(results[0].status, TestStatus::Pass);
        assert!((results[0].duration_seconds - 2.3).abs() < 1e-9);

        assert_eq!(results[1].status, TestStatus::Fail);
        assert!(results[1]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("AssertionError: 2 pods pending"));

        assert_eq!(results[2].test_id, "test_pdb_budget");
        assert_eq!(results[2].status, TestStatus::Fail);
        assert_eq!(
            results[2].error_message.as_deref(),
            Some("fixture 'cluster' not found")
        );

        assert_eq!(results[3].category, "unknown");
        assert_eq!(results[3].status, TestStatus::Skip);
        assert_eq!(results[4].status, TestStatus::Skip);
        assert_eq!(results[5].status, TestStatus::Pass);
    }

    #[test]
    fn malformed_report_is_an_error() {
        assert_eq!(parse_report("{\"tests\": 7}").unwrap_err().code(), "STO-2005");
    }

    #[cfg(unix)]
    mod subprocess {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        use super::*;
        use crate::core::env_file::EnvOverlay;

        fn fake_venv(dir: &Path, pytest_body: &str) {
            let bin = dir.join("venv").join("bin");
            fs::create_dir_all(&bin).unwrap();
            fs::write(bin.join("activate"), "").unwrap();
            let pytest = bin.join("pytest");
            fs::write(&pytest, format!("#!/bin/sh\n{pytest_body}\n")).unwrap();
            fs::set_permissions(&pytest, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn run(dir: &Path) -> SuiteOutcome {
            let env = EnvOverlay::new();
            PythonRunner::new(Some(PathBuf::from("venv")))
                .run(&SuiteInvocation {
                    working_dir: dir,
                    timeout: Duration::from_secs(30),
                    env: &env,
                })
                .unwrap()
        }

        #[test]
        fn uses_venv_pytest_and_reads_report() {
            let dir = tempfile::tempdir().unwrap();
            fake_venv(
                dir.path(),
                r#"cat > results.json <<'EOF'
{"tests":[{"nodeid":"categories/02-x/test_a.py::test_node_001","outcome":"passed"},
          {"nodeid":"categories/02-x/test_a.py::test_node_002","outcome":"passed"},
          {"nodeid":"categories/02-x/test_a.py::test_node_003","outcome":"failed"}]}
EOF
exit 1"#,
            );
            let outcome = run(dir.path());
            assert!(!outcome.success);
            assert_eq!(outcome.results.len(), 3);
            assert_eq!(outcome.results[2].test_id, "NODE-003");
            assert_eq!(outcome.results[2].status, TestStatus::Fail);
        }

        #[test]
        fn stale_report_is_not_reused() {
            let dir = tempfile::tempdir().unwrap();
            fs::write(
                dir.path().join(REPORT_FILE),
                r#"{"tests":[{"nodeid":"test_old.py::test_old","outcome":"passed"}]}"#,
            )
            .unwrap();
            fake_venv(dir.path(), "echo 'collection error' >&2\nexit 4");
            let outcome = run(dir.path());
            assert_eq!(outcome.results.len(), 1);
            assert_eq!(outcome.results[0].test_id, "python-suite");
            assert_eq!(
                outcome.results[0].error_message.as_deref(),
                Some("collection error")
            );
        }

        #[test]
        fn unparsable_report_yields_one_fail() {
            let dir = tempfile::tempdir().unwrap();
            fake_venv(dir.path(), "echo 'not json' > results.json\nexit 0");
            let outcome = run(dir.path());
            assert!(outcome.success);
            assert_eq!(outcome.results.len(), 1);
            assert!(outcome.results[0]
                .error_message
                .as_deref()
                .unwrap()
                .starts_with("Failed to parse results"));
        }
    }
}
