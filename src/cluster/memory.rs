//! Scripted in-process `ClusterAdapter` for tests and dry runs.

#![allow(missing_docs)]

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use crate::cluster::adapter::{ClusterAdapter, ClusterEvent, NodeInfo, PodInfo, ScaleSetInstance};
use crate::core::errors::{Result, StoError};

/// A mutating call observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Drain(String),
    Cordon(String),
    Uncordon(String),
    DeleteNode(String),
    DeleteInstance(String),
}

#[derive(Debug, Default)]
struct State {
    context: Option<String>,
    nodes: Vec<NodeInfo>,
    pods: Vec<PodInfo>,
    /// Each `list_events` pops one batch; the last batch repeats once the queue drains.
    event_polls: VecDeque<Vec<ClusterEvent>>,
    last_events: Vec<ClusterEvent>,
    event_poll_count: usize,
    instances: Vec<ScaleSetInstance>,
    failing_targets: BTreeSet<String>,
    calls: Vec<RecordedCall>,
}

/// Cluster whose contents are set by the caller.
///
/// Deletes remove the target from the listed state, so a second remediation pass
/// sees the cleaned-up cluster.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    /// Reachable cluster with the given context name and nothing in it.
    #[must_use]
    pub fn new(context: &str) -> Self {
        let cluster = Self::default();
        cluster.state.lock().context = Some(context.to_string());
        cluster
    }

    /// Cluster whose reachability check fails.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_nodes(self, nodes: Vec<NodeInfo>) -> Self {
        self.state.lock().nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_pods(self, pods: Vec<PodInfo>) -> Self {
        self.state.lock().pods = pods;
        self
    }

    #[must_use]
    pub fn with_instances(self, instances: Vec<ScaleSetInstance>) -> Self {
        self.state.lock().instances = instances;
        self
    }

    /// Queue the result of one `list_events` poll.
    pub fn push_event_poll(&self, events: Vec<ClusterEvent>) {
        self.state.lock().event_polls.push_back(events);
    }

    /// Make mutating calls against `target` fail.
    pub fn fail_on(&self, target: &str) {
        self.state.lock().failing_targets.insert(target.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn event_poll_count(&self) -> usize {
        self.state.lock().event_poll_count
    }

    fn mutate(&self, target: &str, call: RecordedCall) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failing_targets.contains(target) {
            return Err(StoError::CommandFailed {
                program: "in-memory".to_string(),
                exit_code: 1,
                stderr: format!("scripted failure for {target}"),
            });
        }
        Ok(())
    }

    fn reachable(&self) -> Result<()> {
        if self.state.lock().context.is_none() {
            return Err(StoError::ClusterUnreachable {
                details: "in-memory cluster marked unreachable".to_string(),
            });
        }
        Ok(())
    }
}

impl ClusterAdapter for InMemoryCluster {
    fn current_context(&self) -> Result<String> {
        self.state
            .lock()
            .context
            .clone()
            .ok_or_else(|| StoError::ClusterUnreachable {
                details: "in-memory cluster marked unreachable".to_string(),
            })
    }

    fn list_nodes(&self, selector: Option<&str>) -> Result<Vec<NodeInfo>> {
        self.reachable()?;
        let nodes = self.state.lock().nodes.clone();
        Ok(match selector.and_then(|s| s.split_once('=')) {
            Some((key, value)) => nodes
                .into_iter()
                .filter(|n| n.labels.get(key).map(String::as_str) == Some(value))
                .collect(),
            None => nodes,
        })
    }

    fn list_pods(&self, namespace: Option<&str>, _selector: Option<&str>) -> Result<Vec<PodInfo>> {
        self.reachable()?;
        let pods = self.state.lock().pods.clone();
        Ok(match namespace {
            Some(ns) => pods.into_iter().filter(|p| p.namespace == ns).collect(),
            None => pods,
        })
    }

    fn list_events(&self) -> Result<Vec<ClusterEvent>> {
        self.reachable()?;
        let mut state = self.state.lock();
        state.event_poll_count += 1;
        if let Some(batch) = state.event_polls.pop_front() {
            state.last_events = batch;
        }
        Ok(state.last_events.clone())
    }

    fn drain(&self, node: &str, _timeout: Duration) -> Result<()> {
        self.mutate(node, RecordedCall::Drain(node.to_string()))
    }

    fn cordon(&self, node: &str) -> Result<()> {
        self.mutate(node, RecordedCall::Cordon(node.to_string()))
    }

    fn uncordon(&self, node: &str) -> Result<()> {
        self.mutate(node, RecordedCall::Uncordon(node.to_string()))
    }

    fn delete_node(&self, node: &str) -> Result<()> {
        self.mutate(node, RecordedCall::DeleteNode(node.to_string()))?;
        self.state.lock().nodes.retain(|n| n.name != node);
        Ok(())
    }

    fn list_scale_set_instances(&self) -> Result<Vec<ScaleSetInstance>> {
        self.reachable()?;
        Ok(self.state.lock().instances.clone())
    }

    fn delete_scale_set_instance(&self, instance: &ScaleSetInstance) -> Result<()> {
        let target = instance.target();
        self.mutate(&target, RecordedCall::DeleteInstance(target.clone()))?;
        self.state.lock().instances.retain(|i| i.target() != target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(uid: &str) -> ClusterEvent {
        ClusterEvent {
            uid: uid.to_string(),
            reason: "Evicted".to_string(),
            message: String::new(),
            involved_kind: "Node".to_string(),
            involved_name: "n1".to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn event_polls_replay_last_batch() {
        let cluster = InMemoryCluster::new("ctx");
        cluster.push_event_poll(vec![event("a")]);
        cluster.push_event_poll(vec![event("a"), event("b")]);
        assert_eq!(cluster.list_events().unwrap().len(), 1);
        assert_eq!(cluster.list_events().unwrap().len(), 2);
        assert_eq!(cluster.list_events().unwrap().len(), 2);
        assert_eq!(cluster.event_poll_count(), 3);
    }

    #[test]
    fn unreachable_cluster_fails_reads() {
        let cluster = InMemoryCluster::unreachable();
        assert!(cluster.current_context().unwrap_err().is_fatal());
        assert!(cluster.list_nodes(None).is_err());
    }

    #[test]
    fn scripted_failures_are_recorded() {
        let cluster = InMemoryCluster::new("ctx");
        cluster.fail_on("n2");
        assert!(cluster.cordon("n1").is_ok());
        assert!(cluster.drain("n2", Duration::from_secs(1)).is_err());
        assert_eq!(
            cluster.calls(),
            vec![
                RecordedCall::Cordon("n1".to_string()),
                RecordedCall::Drain("n2".to_string())
            ]
        );
    }
}
