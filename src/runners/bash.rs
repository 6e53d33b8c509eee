//! Shell-script suite runner: `run-all-tests.sh` writing one JSON file per test
//! into `results/`.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cluster::exec::{CommandSpec, run_command};
use crate::core::errors::Result;
use crate::model::{Assertion, Framework, TestResult, TestStatus};
use crate::runners::{SuiteInvocation, SuiteOutcome, SuiteRunner, synthesize_suite_failure};

pub const ENTRYPOINT: &str = "run-all-tests.sh";
pub const RESULTS_DIR: &str = "results";

#[derive(Debug, Clone, Copy, Default)]
pub struct BashRunner;

impl SuiteRunner for BashRunner {
    fn framework(&self) -> Framework {
        Framework::Bash
    }

    fn run(&self, invocation: &SuiteInvocation<'_>) -> Result<SuiteOutcome> {
        let script = invocation.working_dir.join(ENTRYPOINT);
        let program = fs::canonicalize(&script).unwrap_or(script);
        let spec = CommandSpec::new(program.display().to_string(), invocation.hard_timeout())
            .current_dir(invocation.working_dir)
            .envs(invocation.env);
        let output = run_command(&spec)?;
        let results = collect_results(&invocation.working_dir.join(RESULTS_DIR));
        Ok(synthesize_suite_failure(Framework::Bash, results, &output))
    }
}

#[derive(Debug, Deserialize)]
struct ResultFile {
    #[serde(default)]
    test_id: String,
    #[serde(default)]
    test_name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    duration_seconds: f64,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    assertions: Vec<Assertion>,
    #[serde(default)]
    evidence: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    reproduce_commands: Vec<String>,
}

impl ResultFile {
    fn into_result(self) -> TestResult {
        let status = self
            .status
            .as_deref()
            .map_or(TestStatus::Fail, TestStatus::from_outcome);
        TestResult {
            test_id: self.test_id,
            name: self.test_name,
            category: self.category,
            framework: Framework::Bash,
            status,
            duration_seconds: self.duration_seconds,
            error_message: self.error_message,
            assertions: self.assertions,
            evidence: self.evidence,
            reproduce_commands: self.reproduce_commands,
        }
    }
}

/// Parse every `*.json` in `dir`, in file-name order. Malformed files are skipped.
#[must_use]
pub fn collect_results(dir: &Path) -> Vec<TestResult> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    files
        .iter()
        .filter_map(|path| {
            let raw = fs::read_to_string(path).ok()?;
            match serde_json::from_str::<ResultFile>(&raw) {
                Ok(file) => Some(file.into_result()),
                Err(e) => {
                    eprintln!("[STO-RUN] skipping malformed result {}: {e}", path.display());
                    None
                }
            }
        })
        .collect()
}
