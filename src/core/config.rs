//! Configuration system: defaults rendered to TOML, user file deep-merged over
//! them, then env var overrides.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{Result, StoError};
use crate::model::Framework;
use crate::report::ReportFormat;

/// Full orchestrator configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub test_suites: TestSuitesConfig,
    pub remediation: RemediationConfig,
    pub monitoring: MonitoringConfig,
    pub reports: ReportsConfig,
    pub logging: LoggingConfig,
}

/// Target cluster and cloud scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Overrides the name reported by the current kube context.
    pub name: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    /// Upper bound for every single kubectl/az call.
    pub timeout_seconds: u64,
    pub resource_group: String,
    pub location: String,
    /// `.env` file whose variables are passed to every suite subprocess.
    pub env_file: Option<PathBuf>,
}

/// One entry per supported framework.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestSuitesConfig {
    pub terratest: SuiteConfig,
    pub bash: SuiteConfig,
    pub python: SuiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SuiteConfig {
    pub enabled: bool,
    pub timeout_minutes: u64,
    pub working_dir: PathBuf,
    /// Python only: virtualenv directory relative to `working_dir`.
    pub venv_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemediationConfig {
    pub enabled: bool,
    pub vmss_ghosts: RemediatorConfig,
    pub stuck_nodes: RemediatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemediatorConfig {
    pub enabled: bool,
    /// Candidates younger than this are considered mid-transition and left alone.
    pub min_age_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct MonitoringConfig {
    pub eviction_rate: EvictionRateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvictionRateConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportsConfig {
    pub output_dir: PathBuf,
    pub formats: Vec<ReportFormat>,
    /// Reports older than this many days are pruned after a run. 0 keeps everything.
    pub retention_days: u64,
}

/// Activity log (JSONL) settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_path: PathBuf,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: None,
            kubeconfig: None,
            timeout_seconds: 300,
            resource_group: "rg-aks-spot".to_string(),
            location: "australiaeast".to_string(),
            env_file: None,
        }
    }
}

impl ClusterConfig {
    /// Resource group AKS creates for the node pools' scale sets.
    #[must_use]
    pub fn managed_resource_group(&self, cluster_name: &str) -> String {
        format!(
            "MC_{}_{}_{}",
            self.resource_group, cluster_name, self.location
        )
    }
}

impl Default for TestSuitesConfig {
    fn default() -> Self {
        Self {
            terratest: SuiteConfig {
                enabled: true,
                timeout_minutes: 10,
                working_dir: PathBuf::from("../"),
                venv_path: None,
            },
            bash: SuiteConfig {
                enabled: true,
                timeout_minutes: 20,
                working_dir: PathBuf::from("../spot-behavior"),
                venv_path: None,
            },
            python: SuiteConfig {
                enabled: true,
                timeout_minutes: 20,
                working_dir: PathBuf::from("../spot-behavior-python"),
                venv_path: Some(PathBuf::from("venv")),
            },
        }
    }
}

impl TestSuitesConfig {
    #[must_use]
    pub fn get(&self, framework: Framework) -> &SuiteConfig {
        match framework {
            Framework::Terratest => &self.terratest,
            Framework::Bash => &self.bash,
            Framework::Python => &self.python,
        }
    }

    pub fn get_mut(&mut self, framework: Framework) -> &mut SuiteConfig {
        match framework {
            Framework::Terratest => &mut self.terratest,
            Framework::Bash => &mut self.bash,
            Framework::Python => &mut self.python,
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_minutes: 20,
            working_dir: PathBuf::from("."),
            venv_path: None,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vmss_ghosts: RemediatorConfig::default(),
            stuck_nodes: RemediatorConfig::default(),
        }
    }
}

impl Default for RemediatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_age_minutes: 5,
        }
    }
}

impl Default for EvictionRateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 30,
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./reports"),
            formats: vec![ReportFormat::Json, ReportFormat::Html, ReportFormat::Markdown],
            retention_days: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jsonl_path: PathBuf::from("./reports/activity.jsonl"),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Config {
    /// Config file looked up in the working directory when none is given.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("sto.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let overlay = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| StoError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Some(toml::from_str::<toml::Value>(&raw)?)
        } else if path.is_some() {
            return Err(StoError::MissingConfig { path: path_buf });
        } else {
            None
        };

        let mut cfg = Self::from_overlay(overlay)?;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deep-merge a user document over the defaults and deserialize the result.
    pub fn from_overlay(overlay: Option<toml::Value>) -> Result<Self> {
        let mut merged = toml::Value::try_from(Self::default())?;
        if let Some(overlay) = overlay {
            if !overlay.is_table() {
                return Err(StoError::ConfigParse {
                    context: "toml",
                    details: "top level of the config document must be a table".to_string(),
                });
            }
            deep_merge(&mut merged, overlay);
        }
        Ok(merged.try_into()?)
    }

    /// Deterministic SHA-256 fingerprint of the effective config.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }

    /// Enabled suites in execution order.
    #[must_use]
    pub fn enabled_suites(&self) -> Vec<Framework> {
        Framework::ALL
            .into_iter()
            .filter(|framework| self.test_suites.get(*framework).enabled)
            .collect()
    }

    pub(crate) fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("STO_CLUSTER_NAME").or_else(|| lookup("CLUSTER_NAME")) {
            self.cluster.name = Some(raw);
        }
        if let Some(raw) = lookup("STO_KUBECONFIG") {
            self.cluster.kubeconfig = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("STO_RESOURCE_GROUP").or_else(|| lookup("RESOURCE_GROUP")) {
            self.cluster.resource_group = raw;
        }
        if let Some(raw) = lookup("STO_LOCATION").or_else(|| lookup("LOCATION")) {
            self.cluster.location = raw;
        }
        if let Some(raw) = lookup("STO_REPORTS_OUTPUT_DIR") {
            self.reports.output_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("STO_POLL_INTERVAL_SECONDS") {
            self.monitoring.eviction_rate.poll_interval_seconds =
                parse_env_u64("STO_POLL_INTERVAL_SECONDS", &raw)?;
        }
        if let Some(raw) = lookup("STO_REMEDIATION_ENABLED") {
            self.remediation.enabled = parse_env_bool("STO_REMEDIATION_ENABLED", &raw)?;
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for framework in Framework::ALL {
            let suite = self.test_suites.get(framework);
            if suite.timeout_minutes == 0 {
                return Err(StoError::InvalidConfig {
                    details: format!("test_suites.{framework}.timeout_minutes must be > 0"),
                });
            }
        }

        if self.monitoring.eviction_rate.poll_interval_seconds == 0 {
            return Err(StoError::InvalidConfig {
                details: "monitoring.eviction_rate.poll_interval_seconds must be > 0".to_string(),
            });
        }

        if self.cluster.timeout_seconds == 0 {
            return Err(StoError::InvalidConfig {
                details: "cluster.timeout_seconds must be > 0".to_string(),
            });
        }

        if self.reports.formats.is_empty() {
            return Err(StoError::InvalidConfig {
                details: "reports.formats must name at least one format".to_string(),
            });
        }

        Ok(())
    }
}

/// Merge `overlay` into `base`: tables merge key-wise, everything else overwrites.
pub fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) if existing.is_table() && value.is_table() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| StoError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| StoError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
