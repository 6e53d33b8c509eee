//! Activity logger thread.
//!
//! A dedicated thread owns the `JsonlWriter`. Everyone else sends `ActivityEvent`s
//! through a bounded crossbeam channel with `try_send`, so the controller and the
//! eviction monitor are never blocked by logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, StoError};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::model::{Framework, RemediationAction};

// ──────────────────── channel capacity ────────────────────

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    RunStarted {
        run_id: String,
        cluster: String,
        config_hash: String,
    },
    PhaseStarted {
        phase: &'static str,
    },
    SuiteCompleted {
        framework: Framework,
        passed: usize,
        failed: usize,
        skipped: usize,
        success: bool,
        duration_ms: u64,
    },
    EvictionObserved {
        node: String,
        reason: String,
        message: String,
    },
    RemediationApplied {
        action: RemediationAction,
    },
    ReportWritten {
        format: String,
        path: String,
    },
    ReportFailed {
        format: String,
        error_code: String,
        error_message: String,
    },
    Error {
        code: String,
        message: String,
    },
    RunFinished {
        total: usize,
        passed: usize,
        failed: usize,
        skipped: usize,
        exit_code: i32,
        duration_ms: u64,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply cloneable sender side of the logger.
#[derive(Clone, Debug)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Non-blocking send. A full channel drops the event and bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the thread to flush and exit. Blocks only until the sentinel is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread. It runs until `shutdown()` or until every handle drops.
pub fn spawn_logger(
    config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let join = thread::Builder::new()
        .name("sto-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped_clone))
        .map_err(|e| StoError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((
        ActivityLoggerHandle {
            tx,
            dropped_events: dropped,
        },
        join,
    ))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);
    let mut run_id: Option<String> = None;

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.run_id.clone_from(&run_id);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        if let ActivityEvent::RunStarted { run_id: id, .. } = &event {
            run_id = Some(id.clone());
        }

        let mut entry = event_to_log_entry(&event);
        entry.run_id.clone_from(&run_id);
        jsonl.write_entry(&entry);
    }

    jsonl.flush();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::RunStarted {
            cluster,
            config_hash,
            ..
        } => {
            let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
            e.target = Some(cluster.clone());
            e.details = Some(format!(
                "version={} config_hash={config_hash}",
                env!("CARGO_PKG_VERSION")
            ));
            e
        }
        ActivityEvent::PhaseStarted { phase } => {
            let mut e = LogEntry::new(EventType::PhaseStart, Severity::Info);
            e.phase = Some((*phase).to_string());
            e
        }
        ActivityEvent::SuiteCompleted {
            framework,
            passed,
            failed,
            skipped,
            success,
            duration_ms,
        } => {
            let severity = if *success {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::SuiteComplete, severity);
            e.framework = Some(framework.to_string());
            e.passed = Some(*passed);
            e.failed = Some(*failed);
            e.skipped = Some(*skipped);
            e.ok = Some(*success);
            e.duration_ms = Some(*duration_ms);
            e
        }
        ActivityEvent::EvictionObserved {
            node,
            reason,
            message,
        } => {
            let mut e = LogEntry::new(EventType::EvictionObserved, Severity::Warning);
            e.target = Some(node.clone());
            e.details = Some(format!("{reason}: {message}"));
            e
        }
        ActivityEvent::RemediationApplied { action } => {
            let severity = if action.success {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::RemediationAction, severity);
            e.target = Some(action.target.clone());
            e.ok = Some(action.success);
            e.details = Some(format!("{}: {}", action.action_type.as_str(), action.details));
            e
        }
        ActivityEvent::ReportWritten { format, path } => {
            let mut e = LogEntry::new(EventType::ReportWritten, Severity::Info);
            e.target = Some(path.clone());
            e.details = Some(format.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::ReportFailed {
            format,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::ReportFailed, Severity::Warning);
            e.details = Some(format.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::RunFinished {
            total,
            passed,
            failed,
            skipped,
            exit_code,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::RunFinish, Severity::Info);
            e.passed = Some(*passed);
            e.failed = Some(*failed);
            e.skipped = Some(*skipped);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(*exit_code == 0);
            e.details = Some(format!("total={total} exit_code={exit_code}"));
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::RunFinish, Severity::Info),
    }
}

// ──────────────────── tests ────────────────────
