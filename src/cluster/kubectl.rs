//! `ClusterAdapter` over the `kubectl` and `az` command-line tools.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::cluster::adapter::{
    ClusterAdapter, ClusterEvent, ConditionStatus, NodeInfo, PodInfo, ReadyCondition,
    ScaleSetInstance,
};
use crate::cluster::exec::{CommandSpec, run_command};
use crate::core::config::ClusterConfig;
use crate::core::env_file::EnvOverlay;
use crate::core::errors::{Result, StoError};

/// Extra time given to `kubectl drain` beyond its own `--timeout`.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Shells out to `kubectl`/`az`, parsing their JSON output into typed records.
#[derive(Debug, Clone)]
pub struct CliClusterAdapter {
    cluster: ClusterConfig,
    timeout: Duration,
    env: EnvOverlay,
}

impl CliClusterAdapter {
    #[must_use]
    pub fn new(config: &ClusterConfig, env: EnvOverlay) -> Self {
        Self {
            cluster: config.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            env,
        }
    }

    fn kubectl<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new("kubectl", self.timeout).envs(&self.env);
        if let Some(kubeconfig) = &self.cluster.kubeconfig {
            spec = spec.args(["--kubeconfig".to_string(), kubeconfig.display().to_string()]);
        }
        spec.args(args)
    }

    fn az<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("az", self.timeout)
            .envs(&self.env)
            .args(args)
            .args(["-o", "json"])
    }

    fn stdout(spec: &CommandSpec) -> Result<String> {
        run_command(spec)?.into_stdout(spec)
    }

    fn json<T: DeserializeOwned>(spec: &CommandSpec, context: &'static str) -> Result<T> {
        let raw = Self::stdout(spec)?;
        serde_json::from_str(&raw).map_err(|e| StoError::MalformedOutput {
            context,
            details: e.to_string(),
        })
    }

    /// `MC_{resource_group}_{cluster}_{location}`, resolving the cluster name from
    /// the current context when it is not configured.
    fn managed_resource_group(&self) -> Result<String> {
        let cluster = match &self.cluster.name {
            Some(name) => name.clone(),
            None => self.current_context()?,
        };
        Ok(self.cluster.managed_resource_group(&cluster))
    }
}

impl ClusterAdapter for CliClusterAdapter {
    fn current_context(&self) -> Result<String> {
        let spec = self.kubectl(["config", "current-context"]);
        let context = Self::stdout(&spec)
            .map_err(|e| StoError::ClusterUnreachable {
                details: e.to_string(),
            })?
            .trim()
            .to_string();
        if context.is_empty() {
            return Err(StoError::ClusterUnreachable {
                details: "kubectl has no current context".to_string(),
            });
        }
        Ok(context)
    }

    fn list_nodes(&self, selector: Option<&str>) -> Result<Vec<NodeInfo>> {
        let mut args = vec!["get".to_string(), "nodes".to_string()];
        if let Some(selector) = selector {
            args.extend(["-l".to_string(), selector.to_string()]);
        }
        args.extend(["-o".to_string(), "json".to_string()]);
        let list: ItemList<RawNode> = Self::json(&self.kubectl(args), "kubectl get nodes")?;
        Ok(list.items.into_iter().map(RawNode::into_info).collect())
    }

    fn list_pods(&self, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<PodInfo>> {
        let mut args = vec!["get".to_string(), "pods".to_string()];
        match namespace {
            Some(ns) => args.extend(["-n".to_string(), ns.to_string()]),
            None => args.push("--all-namespaces".to_string()),
        }
        if let Some(selector) = selector {
            args.extend(["-l".to_string(), selector.to_string()]);
        }
        args.extend(["-o".to_string(), "json".to_string()]);
        let list: ItemList<RawPod> = Self::json(&self.kubectl(args), "kubectl get pods")?;
        Ok(list.items.into_iter().map(RawPod::into_info).collect())
    }

    fn list_events(&self) -> Result<Vec<ClusterEvent>> {
        let spec = self.kubectl(["get", "events", "--all-namespaces", "-o", "json"]);
        let list: ItemList<RawEvent> = Self::json(&spec, "kubectl get events")?;
        Ok(list.items.into_iter().map(RawEvent::into_event).collect())
    }

    fn drain(&self, node: &str, timeout: Duration) -> Result<()> {
        let mut spec = self.kubectl([
            "drain".to_string(),
            node.to_string(),
            "--ignore-daemonsets".to_string(),
            "--delete-emptydir-data".to_string(),
            format!("--timeout={}s", timeout.as_secs()),
        ]);
        spec.timeout = timeout + DRAIN_GRACE;
        Self::stdout(&spec).map(drop)
    }

    fn cordon(&self, node: &str) -> Result<()> {
        Self::stdout(&self.kubectl(["cordon", node])).map(drop)
    }

    fn uncordon(&self, node: &str) -> Result<()> {
        Self::stdout(&self.kubectl(["uncordon", node])).map(drop)
    }

    fn delete_node(&self, node: &str) -> Result<()> {
        Self::stdout(&self.kubectl(["delete", "node", node])).map(drop)
    }

    fn list_scale_set_instances(&self) -> Result<Vec<ScaleSetInstance>> {
        let group = self.managed_resource_group()?;
        let sets: Vec<RawScaleSet> =
            Self::json(&self.az(["vmss", "list", "-g", group.as_str()]), "az vmss list")?;
        let mut instances = Vec::new();
        for set in sets {
            // One unreadable set must not hide ghosts in the others.
            let raw: Vec<RawInstance> = match Self::json(
                &self.az([
                    "vmss",
                    "list-instances",
                    "-n",
                    set.name.as_str(),
                    "-g",
                    group.as_str(),
                ]),
                "az vmss list-instances",
            ) {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("[STO-REMEDIATE] skipping scale set {}: {e}", set.name);
                    continue;
                }
            };
            instances.extend(raw.into_iter().map(|i| ScaleSetInstance {
                scale_set: set.name.clone(),
                instance_id: i.instance_id,
                provisioning_state: i.provisioning_state.unwrap_or_default(),
                time_created: i.time_created,
            }));
        }
        Ok(instances)
    }

    fn delete_scale_set_instance(&self, instance: &ScaleSetInstance) -> Result<()> {
        let group = self.managed_resource_group()?;
        let spec = CommandSpec::new("az", self.timeout).envs(&self.env).args([
            "vmss",
            "delete-instances",
            "-n",
            instance.scale_set.as_str(),
            "-g",
            group.as_str(),
            "--instance-ids",
            instance.instance_id.as_str(),
        ]);
        Self::stdout(&spec).map(drop)
    }
}

// ──────────────────── wire shapes ────────────────────

#[derive(Debug, Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    status: RawNodeStatus,
}

#[derive(Debug, Default, Deserialize)]
struct RawNodeStatus {
    #[serde(default)]
    conditions: Vec<RawCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
    #[serde(default)]
    last_transition_time: Option<DateTime<Utc>>,
}

impl RawNode {
    fn into_info(self) -> NodeInfo {
        let ready = self
            .status
            .conditions
            .into_iter()
            .find(|c| c.kind == "Ready")
            .map(|c| ReadyCondition {
                status: ConditionStatus::parse(&c.status),
                last_transition: c.last_transition_time,
            });
        NodeInfo {
            name: self.metadata.name,
            labels: self.metadata.labels,
            ready,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPod {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: RawPodSpec,
    #[serde(default)]
    status: RawPodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPodSpec {
    #[serde(default)]
    node_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPodStatus {
    #[serde(default)]
    phase: Option<String>,
}

impl RawPod {
    fn into_info(self) -> PodInfo {
        PodInfo {
            namespace: self.metadata.namespace.unwrap_or_default(),
            name: self.metadata.name,
            phase: self.status.phase.unwrap_or_else(|| "Unknown".to_string()),
            node_name: self.spec.node_name,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    involved_object: RawObjectRef,
    #[serde(default)]
    last_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    first_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawObjectRef {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

impl RawEvent {
    fn into_event(self) -> ClusterEvent {
        let timestamp = self
            .last_timestamp
            .or(self.event_time)
            .or(self.first_timestamp);
        // Events without a uid fall back to namespace/name, which is unique per event object.
        let uid = self.metadata.uid.unwrap_or_else(|| {
            format!(
                "{}/{}",
                self.metadata.namespace.as_deref().unwrap_or_default(),
                self.metadata.name
            )
        });
        ClusterEvent {
            uid,
            reason: self.reason.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
            involved_kind: self.involved_object.kind,
            involved_name: self.involved_object.name,
            timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawScaleSet {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstance {
    instance_id: String,
    #[serde(default)]
    provisioning_state: Option<String>,
    #[serde(default)]
    time_created: Option<DateTime<Utc>>,
}
