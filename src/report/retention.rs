//! Retention: remove report artifacts older than the configured window.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::core::errors::{Result, StoError};
use crate::report::REPORT_PREFIX;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Delete `test-report-*` files in `dir` whose mtime is older than `retention_days`.
///
/// `retention_days == 0` keeps everything. A missing directory is not an error.
/// Individual files that cannot be removed are logged and skipped.
pub fn prune_expired(dir: &Path, retention_days: u64, now: SystemTime) -> Result<Vec<PathBuf>> {
    if retention_days == 0 || !dir.is_dir() {
        return Ok(Vec::new());
    }
    let cutoff = now
        .checked_sub(Duration::from_secs(retention_days.saturating_mul(SECS_PER_DAY)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| StoError::io(dir, source))? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let is_report = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(REPORT_PREFIX));
        if !is_report {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => eprintln!("[STO-REPORT] failed to prune {}: {e}", path.display()),
        }
    }
    removed.sort();
    Ok(removed)
}
