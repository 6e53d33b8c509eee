//! Suite runners: each drives one external test framework as a subprocess and
//! normalizes its native output into [`TestResult`]s.

#![allow(missing_docs)]

pub mod bash;
pub mod python;
pub mod terratest;

use std::path::Path;
use std::time::Duration;

use crate::cluster::exec::CommandOutput;
use crate::core::config::SuiteConfig;
use crate::core::env_file::EnvOverlay;
use crate::core::errors::Result;
use crate::model::{Framework, TestResult};

pub use bash::BashRunner;
pub use python::PythonRunner;
pub use terratest::TerratestRunner;

/// Slack added to the framework's own timeout before the process is killed.
pub const HARD_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// One suite execution request.
#[derive(Debug, Clone, Copy)]
pub struct SuiteInvocation<'a> {
    pub working_dir: &'a Path,
    /// Budget handed to the framework itself.
    pub timeout: Duration,
    /// Passed to the subprocess on top of the inherited environment.
    pub env: &'a EnvOverlay,
}

impl SuiteInvocation<'_> {
    /// Wall-clock limit after which the subprocess tree is killed.
    #[must_use]
    pub fn hard_timeout(&self) -> Duration {
        self.timeout + HARD_TIMEOUT_GRACE
    }
}

/// Parsed results plus whether the framework itself reported success.
#[derive(Debug, Clone, Default)]
pub struct SuiteOutcome {
    pub results: Vec<TestResult>,
    pub success: bool,
}

/// Contract every framework adapter implements.
///
/// `Err` is reserved for failures to launch at all; the controller turns it into
/// a synthetic FAIL result.
pub trait SuiteRunner: Send {
    fn framework(&self) -> Framework;
    fn run(&self, invocation: &SuiteInvocation<'_>) -> Result<SuiteOutcome>;
}

/// Build the stock runner for a framework.
#[must_use]
pub fn default_runner(framework: Framework, suite: &SuiteConfig) -> Box<dyn SuiteRunner> {
    match framework {
        Framework::Terratest => Box::new(TerratestRunner),
        Framework::Bash => Box::new(BashRunner),
        Framework::Python => Box::new(PythonRunner::new(suite.venv_path.clone())),
    }
}

/// Finish an outcome: a failed run that produced nothing parsable yields exactly
/// one synthetic FAIL carrying the captured stderr.
#[must_use]
pub fn synthesize_suite_failure(
    framework: Framework,
    mut results: Vec<TestResult>,
    output: &CommandOutput,
) -> SuiteOutcome {
    let success = output.success();
    if results.is_empty() && !success {
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            format!("{} failed to run", framework.suite_label())
        } else {
            stderr.to_string()
        };
        results.push(TestResult::suite_failure(
            framework,
            output.elapsed.as_secs_f64(),
            &message,
        ));
    }
    SuiteOutcome { results, success }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestStatus;

    fn output(exit_code: Option<i32>, stderr: &str, timed_out: bool) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            timed_out,
            elapsed: Duration::from_secs(2),
        }
    }

    #[test]
    fn failed_empty_run_yields_exactly_one_fail() {
        let outcome = synthesize_suite_failure(Framework::Bash, Vec::new(), &output(Some(2), "boom\n", false));
        assert!(!outcome.success);
        assert_eq!(outcome.results.len(), 1);
        let only = &outcome.results[0];
        assert_eq!(only.status, TestStatus::Fail);
        assert_eq!(only.test_id, "bash-suite");
        assert_eq!(only.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn timeout_counts_as_failure_even_with_zero_exit() {
        let outcome =
            synthesize_suite_failure(Framework::Terratest, Vec::new(), &output(None, "", true));
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(
            outcome.results[0].error_message.as_deref(),
            Some("Terratest Suite failed to run")
        );
    }

    #[test]
    fn successful_empty_run_stays_empty() {
        let outcome = synthesize_suite_failure(Framework::Python, Vec::new(), &output(Some(0), "", false));
        assert!(outcome.success);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn parsed_results_are_kept_on_failure() {
        let parsed = vec![TestResult::new(
            "DIST-001",
            "spread",
            "distribution",
            Framework::Bash,
            TestStatus::Fail,
            1.0,
        )];
        let outcome = synthesize_suite_failure(Framework::Bash, parsed, &output(Some(1), "x", false));
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].test_id, "DIST-001");
    }

    #[test]
    fn hard_timeout_adds_grace() {
        let env = EnvOverlay::new();
        let invocation = SuiteInvocation {
            working_dir: Path::new("."),
            timeout: Duration::from_secs(600),
            env: &env,
        };
        assert_eq!(invocation.hard_timeout(), Duration::from_secs(630));
    }
}
