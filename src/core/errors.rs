//! STO-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, StoError>;

/// Top-level error type for the spot test orchestrator.
#[derive(Debug, Error)]
pub enum StoError {
    #[error("[STO-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[STO-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[STO-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[STO-2001] cluster unreachable: {details}")]
    ClusterUnreachable { details: String },

    #[error("[STO-2002] {program} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("[STO-2003] {program} timed out after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("[STO-2004] failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[STO-2005] unexpected output from {context}: {details}")]
    MalformedOutput {
        context: &'static str,
        details: String,
    },

    #[error("[STO-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[STO-3001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[STO-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl StoError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "STO-1001",
            Self::MissingConfig { .. } => "STO-1002",
            Self::ConfigParse { .. } => "STO-1003",
            Self::ClusterUnreachable { .. } => "STO-2001",
            Self::CommandFailed { .. } => "STO-2002",
            Self::CommandTimeout { .. } => "STO-2003",
            Self::Spawn { .. } => "STO-2004",
            Self::MalformedOutput { .. } => "STO-2005",
            Self::Serialization { .. } => "STO-2101",
            Self::Io { .. } => "STO-3001",
            Self::Runtime { .. } => "STO-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. }
                | Self::CommandTimeout { .. }
                | Self::Io { .. }
                | Self::Runtime { .. }
        )
    }

    /// Only an unreachable cluster halts a run; everything else becomes report data.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ClusterUnreachable { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for StoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for StoError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for StoError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
