//! Cluster Command Adapter contract and the record types it returns.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Label carrying the spot marker on AKS nodes.
pub const SPOT_PRIORITY_LABEL: &str = "kubernetes.azure.com/scalesetpriority";

/// Label carrying the node pool name.
pub const AGENT_POOL_LABEL: &str = "agentpool";

/// Label carrying the availability zone.
pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// Value of a Kubernetes condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    /// Parse the API string; anything unexpected is `Unknown`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

/// The node's `Ready` condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyCondition {
    pub status: ConditionStatus,
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// `None` when the node reports no Ready condition at all.
    pub ready: Option<ReadyCondition>,
}

impl NodeInfo {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
            .as_ref()
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Ready condition present and either `False` or `Unknown`.
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        self.ready
            .as_ref()
            .is_some_and(|c| c.status != ConditionStatus::True)
    }

    #[must_use]
    pub fn is_spot(&self) -> bool {
        self.labels.get(SPOT_PRIORITY_LABEL).map(String::as_str) == Some("spot")
    }

    #[must_use]
    pub fn pool(&self) -> &str {
        self.labels
            .get(AGENT_POOL_LABEL)
            .map_or("unknown", String::as_str)
    }

    #[must_use]
    pub fn zone(&self) -> Option<&str> {
        self.labels.get(ZONE_LABEL).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub phase: String,
    pub node_name: Option<String>,
}

impl PodInfo {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.phase == "Pending"
    }
}

/// One cluster event as listed by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub uid: String,
    pub reason: String,
    pub message: String,
    pub involved_kind: String,
    pub involved_name: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A member of a cloud scale set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleSetInstance {
    pub scale_set: String,
    pub instance_id: String,
    pub provisioning_state: String,
    pub time_created: Option<DateTime<Utc>>,
}

impl ScaleSetInstance {
    /// Failed or Unknown provisioning state.
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        matches!(self.provisioning_state.as_str(), "Failed" | "Unknown")
    }

    /// `"{scale_set}/{instance_id}"`.
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}/{}", self.scale_set, self.instance_id)
    }
}

/// Read/mutate operations against the control plane and the scale-set API.
///
/// Every call is a single non-transactional operation; callers record `Err` as data.
pub trait ClusterAdapter: Send + Sync {
    /// Active context name. Used as the reachability check.
    fn current_context(&self) -> Result<String>;
    fn list_nodes(&self, selector: Option<&str>) -> Result<Vec<NodeInfo>>;
    fn list_pods(&self, namespace: Option<&str>, selector: Option<&str>) -> Result<Vec<PodInfo>>;
    fn list_events(&self) -> Result<Vec<ClusterEvent>>;
    fn drain(&self, node: &str, timeout: Duration) -> Result<()>;
    fn cordon(&self, node: &str) -> Result<()>;
    fn uncordon(&self, node: &str) -> Result<()>;
    fn delete_node(&self, node: &str) -> Result<()>;
    fn list_scale_set_instances(&self) -> Result<Vec<ScaleSetInstance>>;
    fn delete_scale_set_instance(&self, instance: &ScaleSetInstance) -> Result<()>;
}
