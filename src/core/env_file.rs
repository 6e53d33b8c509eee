//! `.env` loading for suite subprocesses.
//!
//! Variables are returned as an explicit map and handed to each subprocess; the
//! orchestrator's own process environment is never modified.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::core::errors::{Result, StoError};

/// Extra environment passed to every subprocess on top of the inherited one.
pub type EnvOverlay = BTreeMap<String, String>;

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are ignored; one level of
/// matching surrounding quotes is stripped from values.
#[must_use]
pub fn parse_env(contents: &str) -> EnvOverlay {
    let mut vars = EnvOverlay::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

/// Load an env file. A missing file yields an empty overlay.
pub fn load_env_file(path: &Path) -> Result<EnvOverlay> {
    if !path.exists() {
        return Ok(EnvOverlay::new());
    }
    let raw = fs::read_to_string(path).map_err(|source| StoError::io(path, source))?;
    Ok(parse_env(&raw))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
