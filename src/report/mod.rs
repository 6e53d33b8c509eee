//! Reporters: serialize a summarized [`TestReport`] to disk in every configured
//! format, regenerate formats from a stored JSON report, and prune old reports.

#![allow(missing_docs)]

pub mod html;
pub mod json;
pub mod markdown;
pub mod retention;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, StoError};
use crate::model::TestReport;

pub use json::load_report;
pub use retention::prune_expired;

/// File-name prefix shared by every report artifact.
pub const REPORT_PREFIX: &str = "test-report-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Html,
    Markdown,
}

impl ReportFormat {
    pub const ALL: [Self; 3] = [Self::Json, Self::Html, Self::Markdown];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }

    /// Render a summarized report in this format.
    pub fn render(self, report: &TestReport) -> Result<String> {
        match self {
            Self::Json => json::render(report),
            Self::Html => Ok(html::render(report)),
            Self::Markdown => Ok(markdown::render(report)),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{output_dir}/test-report-%Y-%m-%d-%H%M%S.{ext}`, keyed by run start time.
#[must_use]
pub fn report_path(output_dir: &Path, timestamp: DateTime<Utc>, format: ReportFormat) -> PathBuf {
    output_dir.join(format!(
        "{REPORT_PREFIX}{}.{}",
        timestamp.format("%Y-%m-%d-%H%M%S"),
        format.extension()
    ))
}

/// Result of writing one format.
#[derive(Debug)]
pub struct ReportOutcome {
    pub format: ReportFormat,
    pub result: Result<PathBuf>,
}

/// Write every format. A failing format is reported and the rest still run.
#[must_use]
pub fn write_reports(
    report: &TestReport,
    output_dir: &Path,
    formats: &[ReportFormat],
) -> Vec<ReportOutcome> {
    if let Err(source) = fs::create_dir_all(output_dir) {
        let message = source.to_string();
        return formats
            .iter()
            .map(|&format| ReportOutcome {
                format,
                result: Err(StoError::io(
                    output_dir,
                    std::io::Error::new(source.kind(), message.clone()),
                )),
            })
            .collect();
    }

    formats
        .iter()
        .map(|&format| {
            let path = report_path(output_dir, report.timestamp, format);
            let result = format
                .render(report)
                .and_then(|body| write_atomic(&path, &body))
                .map(|()| path);
            ReportOutcome { format, result }
        })
        .collect()
}

/// Rebuild `formats` next to a stored JSON report, re-deriving the summary first.
pub fn regenerate(json_path: &Path, formats: &[ReportFormat]) -> Result<Vec<ReportOutcome>> {
    let report = load_report(json_path)?;
    let output_dir = json_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(write_reports(&report, output_dir, formats))
}

/// Write via a sibling temp file and rename so readers never see a partial report.
fn write_atomic(path: &Path, body: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).map_err(|source| StoError::io(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| StoError::io(path, source))
}

/// `3m 7s`.
pub(crate) fn format_duration(seconds: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = seconds.max(0.0) as u64;
    format!("{}m {}s", total / 60, total % 60)
}
