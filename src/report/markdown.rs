//! Markdown summary for pasting into tickets and pull requests.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::model::{ClusterSnapshot, StatusCounts, TestReport};
use crate::report::format_duration;

#[must_use]
pub fn render(report: &TestReport) -> String {
    let mut out = String::with_capacity(2048);
    let _ = writeln!(out, "# Spot Node Test Report\n");
    let _ = writeln!(out, "- **Cluster:** {}", report.cluster_name);
    let _ = writeln!(out, "- **Run ID:** {}", report.run_id);
    let _ = writeln!(
        out,
        "- **Started:** {}",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        out,
        "- **Duration:** {}",
        format_duration(report.duration_seconds)
    );
    if let Some(reason) = &report.abort_reason {
        let _ = writeln!(out, "- **Aborted:** {reason}");
    }

    let _ = writeln!(out, "\n## Summary\n");
    let _ = writeln!(out, "| Total | Passed | Failed | Skipped | Pass Rate |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    let _ = writeln!(
        out,
        "| {} | {} | {} | {} | {:.1}% |",
        report.total_tests(),
        report.passed(),
        report.failed(),
        report.skipped(),
        report.pass_rate()
    );

    counts_table(&mut out, "By Framework", "Framework", report.framework_summary());
    counts_table(&mut out, "By Category", "Category", report.category_summary());

    if !report.top_failures().is_empty() {
        let _ = writeln!(out, "\n## Top Failures\n");
        for failure in report.top_failures() {
            let _ = writeln!(
                out,
                "- **{}** {} ({}): {}",
                failure.test_id,
                failure.name,
                failure.framework,
                failure
                    .error_message
                    .as_deref()
                    .and_then(|m| m.lines().next())
                    .unwrap_or("no error message")
            );
        }
    }

    if !report.failure_patterns().is_empty() {
        let _ = writeln!(out, "\n## Failure Patterns\n");
        let mut patterns: Vec<(&String, &usize)> = report.failure_patterns().iter().collect();
        patterns.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (pattern, count) in patterns {
            let _ = writeln!(out, "- `{pattern}` x{count}");
        }
    }

    let _ = writeln!(out, "\n## Evictions\n");
    let _ = writeln!(
        out,
        "{} node eviction(s), {:.2}/hr",
        report.eviction_events.len(),
        report.eviction_rate_per_hour
    );
    for event in &report.eviction_events {
        let _ = writeln!(
            out,
            "- {} `{}` {}: {}",
            event.timestamp.format("%H:%M:%S"),
            event.node,
            event.reason,
            event.message
        );
    }

    if !report.remediation_actions.is_empty() {
        let _ = writeln!(out, "\n## Remediation Actions\n");
        let _ = writeln!(out, "| Action | Target | Result | Details |");
        let _ = writeln!(out, "|---|---|---|---|");
        for action in &report.remediation_actions {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                action.action_type.as_str(),
                action.target,
                if action.success { "ok" } else { "failed" },
                action.details.replace('|', "\\|")
            );
        }
    }

    if report.initial_state.is_some() || report.final_state.is_some() {
        let _ = writeln!(out, "\n## Cluster State\n");
        let _ = writeln!(out, "| | Nodes | Ready | Spot | Pods | Pending |");
        let _ = writeln!(out, "|---|---|---|---|---|---|");
        snapshot_row(&mut out, "Before", report.initial_state.as_ref());
        snapshot_row(&mut out, "After", report.final_state.as_ref());
    }

    out
}

fn counts_table(out: &mut String, title: &str, key: &str, counts: &BTreeMap<String, StatusCounts>) {
    if counts.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n## {title}\n");
    let _ = writeln!(out, "| {key} | Total | Passed | Failed | Skipped | Pass Rate |");
    let _ = writeln!(out, "|---|---|---|---|---|---|");
    for (name, c) in counts {
        let _ = writeln!(
            out,
            "| {name} | {} | {} | {} | {} | {:.1}% |",
            c.total,
            c.passed,
            c.failed,
            c.skipped,
            c.pass_rate()
        );
    }
}

fn snapshot_row(out: &mut String, label: &str, snapshot: Option<&ClusterSnapshot>) {
    match snapshot {
        Some(s) => {
            let _ = writeln!(
                out,
                "| {label} | {} | {} | {} | {} | {} |",
                s.total_nodes, s.ready_nodes, s.spot_nodes, s.total_pods, s.pending_pods
            );
        }
        None => {
            let _ = writeln!(out, "| {label} | - | - | - | - | - |");
        }
    }
}
