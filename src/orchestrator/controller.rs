//! Phased run controller: preflight, execution bracketed by eviction monitoring,
//! remediation, reporting.
//!
//! The controller owns the [`TestReport`] for the whole run and is the only thing
//! that mutates it. Only an unreachable cluster stops the state machine early;
//! every other failure is converted into report data at its phase boundary.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;

use crate::cluster::adapter::ClusterAdapter;
use crate::cluster::snapshot::capture_snapshot;
use crate::core::config::Config;
use crate::core::env_file::EnvOverlay;
use crate::core::errors::{Result, StoError};
use crate::logger::{ActivityEvent, ActivityLoggerHandle};
use crate::model::{Framework, RemediationAction, TestReport, TestResult, TestStatus};
use crate::monitor::eviction::{EvictionMonitor, EvictionSummary};
use crate::remediation::{Remediator, default_remediators, listing_failure};
use crate::report::{prune_expired, write_reports};
use crate::runners::{SuiteInvocation, SuiteOutcome, SuiteRunner, default_runner};

/// The four phases, in the only order they ever run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preflight,
    Execution,
    Remediation,
    Reporting,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Execution => "execution",
            Self::Remediation => "remediation",
            Self::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What preflight hands to the execution phase.
struct Preflight {
    monitor: Option<EvictionMonitor>,
}

pub struct RunController {
    config: Config,
    adapter: Arc<dyn ClusterAdapter>,
    env: EnvOverlay,
    runner_overrides: BTreeMap<Framework, Box<dyn SuiteRunner>>,
    remediator_override: Option<Vec<Box<dyn Remediator>>>,
    logger: Option<ActivityLoggerHandle>,
    quiet: bool,
}

impl RunController {
    #[must_use]
    pub fn new(config: Config, adapter: Arc<dyn ClusterAdapter>, env: EnvOverlay) -> Self {
        Self {
            config,
            adapter,
            env,
            runner_overrides: BTreeMap::new(),
            remediator_override: None,
            logger: None,
            quiet: false,
        }
    }

    /// Replace the stock runner for `runner.framework()`.
    #[must_use]
    pub fn with_runner(mut self, runner: Box<dyn SuiteRunner>) -> Self {
        self.runner_overrides.insert(runner.framework(), runner);
        self
    }

    /// Replace the configured remediators, in execution order.
    #[must_use]
    pub fn with_remediators(mut self, remediators: Vec<Box<dyn Remediator>>) -> Self {
        self.remediator_override = Some(remediators);
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Suppress human progress lines on stderr.
    #[must_use]
    pub const fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    // ──────────────────── full run ────────────────────

    /// Execute all four phases and return the summarized report.
    ///
    /// Never fails: an aborted run still yields a report carrying `abort_reason`.
    pub fn run(&mut self) -> TestReport {
        let started = Instant::now();
        let mut report = TestReport::new(Utc::now());
        report.cluster_name = self
            .config
            .cluster
            .name
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        self.log(ActivityEvent::RunStarted {
            run_id: report.run_id.clone(),
            cluster: report.cluster_name.clone(),
            config_hash: self.config.stable_hash().unwrap_or_default(),
        });

        match self.preflight(&mut report) {
            Ok(preflight) => {
                self.execute(&mut report, preflight);
                if self.config.remediation.enabled {
                    self.enter(Phase::Remediation);
                    let actions = self.remediate();
                    report.remediation_actions.extend(actions);
                } else {
                    self.progress("remediation disabled; skipping");
                }
            }
            Err(e) => {
                self.progress(&format!("preflight failed, aborting run: {e}"));
                self.log_error(&e);
                report.abort_reason = Some(e.to_string());
            }
        }

        report.duration_seconds = started.elapsed().as_secs_f64();
        report.calculate_summary();

        self.enter(Phase::Reporting);
        self.emit_reports(&report);

        self.progress(&format!(
            "run {} finished: {} total, {} passed, {} failed, {} skipped ({:.1}%)",
            report.run_id,
            report.total_tests(),
            report.passed(),
            report.failed(),
            report.skipped(),
            report.pass_rate()
        ));
        self.log(ActivityEvent::RunFinished {
            total: report.total_tests(),
            passed: report.passed(),
            failed: report.failed(),
            skipped: report.skipped(),
            exit_code: report.exit_code(),
            duration_ms: duration_ms(started.elapsed()),
        });
        report
    }

    /// Remediation phase on its own, for the `remediate` command.
    ///
    /// Honors each remediator's own `enabled` flag but not `remediation.enabled`.
    pub fn run_remediation_only(&mut self) -> Result<Vec<RemediationAction>> {
        let context = self.adapter.current_context()?;
        self.progress(&format!("cluster context: {context}"));
        self.enter(Phase::Remediation);
        Ok(self.remediate())
    }

    // ──────────────────── phases ────────────────────

    fn preflight(&self, report: &mut TestReport) -> Result<Preflight> {
        self.enter(Phase::Preflight);
        let context = self.adapter.current_context()?;
        if self.config.cluster.name.is_none() {
            report.cluster_name.clone_from(&context);
        }
        self.progress(&format!(
            "cluster {} reachable (context {context})",
            report.cluster_name
        ));

        report.initial_state = Some(capture_snapshot(self.adapter.as_ref(), Utc::now()));

        let eviction = &self.config.monitoring.eviction_rate;
        let monitor = if eviction.enabled {
            Some(EvictionMonitor::start(
                Arc::clone(&self.adapter),
                Duration::from_secs(eviction.poll_interval_seconds),
            )?)
        } else {
            None
        };
        Ok(Preflight { monitor })
    }

    fn execute(&self, report: &mut TestReport, preflight: Preflight) {
        self.enter(Phase::Execution);
        for framework in self.config.enabled_suites() {
            let results = self.run_suite(framework);
            report.extend_results(results);
        }

        if let Some(monitor) = preflight.monitor {
            let summary = monitor.stop();
            self.record_evictions(report, summary);
        }
        report.final_state = Some(capture_snapshot(self.adapter.as_ref(), Utc::now()));
    }

    /// One suite, isolated: whatever happens, the suite contributes at least one
    /// result when it did not succeed.
    fn run_suite(&self, framework: Framework) -> Vec<TestResult> {
        let suite = self.config.test_suites.get(framework).clone();
        let invocation = SuiteInvocation {
            working_dir: &suite.working_dir,
            timeout: Duration::from_secs(suite.timeout_minutes.saturating_mul(60)),
            env: &self.env,
        };
        self.progress(&format!(
            "{framework}: running in {} (timeout {}m)",
            suite.working_dir.display(),
            suite.timeout_minutes
        ));

        let started = Instant::now();
        let outcome = match self.runner_overrides.get(&framework) {
            Some(runner) => runner.run(&invocation),
            None => default_runner(framework, &suite).run(&invocation),
        };
        let elapsed = started.elapsed();

        let SuiteOutcome {
            mut results,
            success,
        } = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log_error(&e);
                SuiteOutcome {
                    results: vec![TestResult::suite_failure(
                        framework,
                        elapsed.as_secs_f64(),
                        &e.to_string(),
                    )],
                    success: false,
                }
            }
        };
        if results.is_empty() && !success {
            results.push(TestResult::suite_failure(
                framework,
                elapsed.as_secs_f64(),
                &format!("{} reported failure without results", framework.suite_label()),
            ));
        }

        let count = |status| results.iter().filter(|r| r.status == status).count();
        let (passed, failed, skipped) = (
            count(TestStatus::Pass),
            count(TestStatus::Fail),
            count(TestStatus::Skip),
        );
        self.progress(&format!(
            "{framework}: {passed} passed, {failed} failed, {skipped} skipped ({:.1}s)",
            elapsed.as_secs_f64()
        ));
        self.log(ActivityEvent::SuiteCompleted {
            framework,
            passed,
            failed,
            skipped,
            success,
            duration_ms: duration_ms(elapsed),
        });
        results
    }

    fn record_evictions(&self, report: &mut TestReport, summary: EvictionSummary) {
        for event in &summary.events {
            self.log(ActivityEvent::EvictionObserved {
                node: event.node.clone(),
                reason: event.reason.clone(),
                message: event.message.clone(),
            });
        }
        self.progress(&format!(
            "observed {} node eviction(s) over {:.0}s ({:.2}/hr)",
            summary.events.len(),
            summary.elapsed.as_secs_f64(),
            summary.rate_per_hour
        ));
        report.eviction_rate_per_hour = summary.rate_per_hour;
        report.eviction_events = summary.events;
    }

    fn remediate(&mut self) -> Vec<RemediationAction> {
        let remediators = self
            .remediator_override
            .take()
            .unwrap_or_else(|| default_remediators(&self.config.remediation));

        let mut actions = Vec::new();
        for remediator in &remediators {
            let batch = match remediator.detect_and_remediate(self.adapter.as_ref(), Utc::now()) {
                Ok(batch) => batch,
                Err(e) => {
                    self.log_error(&e);
                    vec![listing_failure(remediator.as_ref(), &e)]
                }
            };
            self.progress(&format!(
                "{}: {} action(s), {} succeeded",
                remediator.name(),
                batch.len(),
                batch.iter().filter(|a| a.success).count()
            ));
            for action in &batch {
                self.log(ActivityEvent::RemediationApplied {
                    action: action.clone(),
                });
            }
            actions.extend(batch);
        }
        self.remediator_override = Some(remediators);
        actions
    }

    fn emit_reports(&self, report: &TestReport) {
        let reports = &self.config.reports;
        for outcome in write_reports(report, &reports.output_dir, &reports.formats) {
            match outcome.result {
                Ok(path) => {
                    self.progress(&format!("wrote {} report: {}", outcome.format, path.display()));
                    self.log(ActivityEvent::ReportWritten {
                        format: outcome.format.to_string(),
                        path: path.display().to_string(),
                    });
                }
                Err(e) => {
                    eprintln!("[STO-REPORT] {} report failed: {e}", outcome.format);
                    self.log(ActivityEvent::ReportFailed {
                        format: outcome.format.to_string(),
                        error_code: e.code().to_string(),
                        error_message: e.to_string(),
                    });
                }
            }
        }

        match prune_expired(&reports.output_dir, reports.retention_days, SystemTime::now()) {
            Ok(removed) if !removed.is_empty() => {
                self.progress(&format!("pruned {} expired report file(s)", removed.len()));
            }
            Ok(_) => {}
            Err(e) => eprintln!("[STO-REPORT] retention sweep failed: {e}"),
        }
    }

    // ──────────────────── logging helpers ────────────────────

    fn enter(&self, phase: Phase) {
        self.progress(&format!("phase: {phase}"));
        self.log(ActivityEvent::PhaseStarted {
            phase: phase.as_str(),
        });
    }

    fn progress(&self, message: &str) {
        if !self.quiet {
            eprintln!("[STO-RUN] {message}");
        }
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }

    fn log_error(&self, error: &StoError) {
        self.log(ActivityEvent::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
