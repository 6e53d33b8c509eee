//! Go/Terratest runner over `go test -json` (test2json) output.

#![allow(missing_docs)]

use std::collections::HashMap;

use serde::Deserialize;

use crate::cluster::exec::{CommandSpec, run_command};
use crate::core::errors::Result;
use crate::model::{Framework, TestResult, TestStatus};
use crate::runners::{SuiteInvocation, SuiteOutcome, SuiteRunner, synthesize_suite_failure};

const CATEGORY: &str = "infrastructure";

/// Lines `go test -v` prints around every test; they carry no failure detail.
const FRAMING_PREFIXES: [&str; 7] = [
    "=== RUN",
    "=== PAUSE",
    "=== CONT",
    "=== NAME",
    "--- FAIL:",
    "--- PASS:",
    "--- SKIP:",
];

fn is_framing(line: &str) -> bool {
    let line = line.trim_start();
    FRAMING_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerratestRunner;

impl SuiteRunner for TerratestRunner {
    fn framework(&self) -> Framework {
        Framework::Terratest
    }

    fn run(&self, invocation: &SuiteInvocation<'_>) -> Result<SuiteOutcome> {
        let spec = CommandSpec::new("go", invocation.hard_timeout())
            .args([
                "test".to_string(),
                "-v".to_string(),
                "-timeout".to_string(),
                format!("{}s", invocation.timeout.as_secs()),
                "-json".to_string(),
                "./...".to_string(),
            ])
            .current_dir(invocation.working_dir)
            .envs(invocation.env);
        let output = run_command(&spec)?;
        let results = parse_test2json(&output.stdout);
        Ok(synthesize_suite_failure(Framework::Terratest, results, &output))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TestEvent {
    action: String,
    #[serde(default)]
    package: String,
    #[serde(default)]
    test: Option<String>,
    #[serde(default)]
    elapsed: Option<f64>,
    #[serde(default)]
    output: Option<String>,
}

/// Parse test2json lines. Non-JSON lines (build errors, plain prints) are ignored.
///
/// A failing test's message is the output it printed, which is where Go puts
/// assertion failures, minus the `=== RUN`/`--- FAIL:` framing. Output is keyed
/// by package and test so same-named tests under `./...` stay apart.
#[must_use]
pub fn parse_test2json(stdout: &str) -> Vec<TestResult> {
    let mut output_by_test: HashMap<(String, String), String> = HashMap::new();
    let mut results = Vec::new();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(event) = serde_json::from_str::<TestEvent>(line) else {
            continue;
        };
        let Some(test) = event.test.filter(|t| !t.is_empty()) else {
            continue;
        };
        let key = (event.package, test.clone());
        let status = match event.action.as_str() {
            "output" => {
                if let Some(text) = event.output {
                    let captured = output_by_test.entry(key).or_default();
                    for line in text.split_inclusive('\n').filter(|l| !is_framing(l)) {
                        captured.push_str(line);
                    }
                }
                continue;
            }
            "pass" => TestStatus::Pass,
            "fail" => TestStatus::Fail,
            "skip" => TestStatus::Skip,
            _ => continue,
        };

        let mut result = TestResult::new(
            test.clone(),
            test.clone(),
            CATEGORY,
            Framework::Terratest,
            status,
            event.elapsed.unwrap_or_default(),
        );
        let captured = output_by_test.remove(&key).unwrap_or_default();
        if status == TestStatus::Fail {
            let message = captured.trim();
            result.error_message = Some(if message.is_empty() {
                "Test failed".to_string()
            } else {
                message.to_string()
            });
        }
        results.push(result);
    }

    results
}
