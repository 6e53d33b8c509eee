//! Self-contained HTML dashboard: summary cards plus a per-test results table.

#![allow(clippy::format_push_string)]

use std::fmt::Write as _;

use crate::model::{TestReport, TestStatus};
use crate::report::format_duration;

const STYLE: &str = "\
body{font-family:system-ui,sans-serif;margin:2rem;color:#212529}\
.cards{display:flex;gap:1rem;margin:1rem 0}\
.card{flex:1;border:1px solid #dee2e6;border-radius:.5rem;padding:1rem;text-align:center}\
.card h2{margin:0;font-size:2rem}\
.badge{display:inline-block;padding:.2rem .6rem;border-radius:.4rem;color:#fff;margin-right:.5rem}\
.pass{background:#198754}.fail{background:#dc3545}.skip{background:#ffc107;color:#212529}\
table{border-collapse:collapse;width:100%;margin-top:1rem}\
th,td{border-bottom:1px solid #dee2e6;padding:.4rem .6rem;text-align:left}\
th{background:#f8f9fa}";

#[must_use]
pub fn render(report: &TestReport) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(
        out,
        "<title>Spot Test Report - {}</title>",
        escape(&report.cluster_name)
    );
    let _ = writeln!(out, "<style>{STYLE}</style>\n</head>\n<body>");

    let _ = writeln!(out, "<h1>Spot Node Test Report</h1>");
    let _ = writeln!(
        out,
        "<p>Cluster: <strong>{}</strong> &middot; Run {} &middot; {} &middot; Duration {}</p>",
        escape(&report.cluster_name),
        escape(&report.run_id),
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        format_duration(report.duration_seconds)
    );
    if let Some(reason) = &report.abort_reason {
        let _ = writeln!(
            out,
            "<p class=\"badge fail\">Run aborted: {}</p>",
            escape(reason)
        );
    }

    out.push_str("<div class=\"cards\">\n");
    card(&mut out, "Pass Rate", &format!("{:.1}%", report.pass_rate()));
    card(&mut out, "Total Tests", &report.total_tests().to_string());
    card(
        &mut out,
        "Eviction Rate/hr",
        &format!("{:.2}", report.eviction_rate_per_hour),
    );
    card(
        &mut out,
        "Remediations",
        &report.remediation_actions.len().to_string(),
    );
    out.push_str("</div>\n");

    let _ = writeln!(
        out,
        "<p><span class=\"badge pass\">Passed: {}</span><span class=\"badge fail\">Failed: {}</span><span class=\"badge skip\">Skipped: {}</span></p>",
        report.passed(),
        report.failed(),
        report.skipped()
    );

    out.push_str("<h2>Test Results</h2>\n<table>\n<thead><tr><th>Status</th><th>Test ID</th><th>Name</th><th>Framework</th><th>Category</th><th>Duration</th></tr></thead>\n<tbody>\n");
    for result in report.test_results() {
        let _ = writeln!(
            out,
            "<tr><td><span class=\"badge {}\">{}</span></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            status_class(result.status),
            result.status,
            escape(&result.test_id),
            escape(&result.name),
            result.framework,
            escape(&result.category),
            format_duration(result.duration_seconds)
        );
    }
    out.push_str("</tbody>\n</table>\n");

    if !report.top_failures().is_empty() {
        out.push_str("<h2>Top Failures</h2>\n<ul>\n");
        for failure in report.top_failures() {
            let _ = writeln!(
                out,
                "<li><strong>{}</strong> {}: <code>{}</code></li>",
                escape(&failure.test_id),
                escape(&failure.name),
                escape(failure.error_message.as_deref().unwrap_or("no error message"))
            );
        }
        out.push_str("</ul>\n");
    }

    if !report.remediation_actions.is_empty() {
        out.push_str("<h2>Remediation Actions</h2>\n<table>\n<thead><tr><th>Time</th><th>Action</th><th>Target</th><th>Result</th><th>Details</th></tr></thead>\n<tbody>\n");
        for action in &report.remediation_actions {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                action.timestamp.format("%H:%M:%S"),
                action.action_type.as_str(),
                escape(&action.target),
                if action.success { "ok" } else { "failed" },
                escape(&action.details)
            );
        }
        out.push_str("</tbody>\n</table>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn card(out: &mut String, title: &str, value: &str) {
    let _ = writeln!(
        out,
        "<div class=\"card\"><h2>{value}</h2><div>{title}</div></div>"
    );
}

const fn status_class(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "pass",
        TestStatus::Fail => "fail",
        TestStatus::Skip => "skip",
    }
}

/// Minimal escaping for text nodes and quoted attribute values.
pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
