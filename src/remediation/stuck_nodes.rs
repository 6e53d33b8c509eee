//! Nodes whose Ready condition has been False or Unknown for too long.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

use crate::cluster::adapter::ClusterAdapter;
use crate::core::errors::Result;
use crate::model::{RemediationAction, RemediationKind};
use crate::remediation::{AgeCheck, AgeGate, Remediator, action_from};

#[derive(Debug, Clone, Copy)]
pub struct StuckNodeRemediator {
    gate: AgeGate,
}

impl StuckNodeRemediator {
    #[must_use]
    pub const fn new(gate: AgeGate) -> Self {
        Self { gate }
    }
}

impl Remediator for StuckNodeRemediator {
    fn name(&self) -> &'static str {
        "stuck_nodes"
    }

    fn kind(&self) -> RemediationKind {
        RemediationKind::StuckNodeDelete
    }

    fn detect_and_remediate(
        &self,
        adapter: &dyn ClusterAdapter,
        now: DateTime<Utc>,
    ) -> Result<Vec<RemediationAction>> {
        let mut actions = Vec::new();
        for node in adapter.list_nodes(None)?.into_iter().filter(|n| n.is_not_ready()) {
            let since = node.ready.as_ref().and_then(|c| c.last_transition);
            match self.gate.check(since, now) {
                AgeCheck::Unknown => {
                    eprintln!(
                        "[STO-REMEDIATE] skipping {}: Ready condition has no transition time",
                        node.name
                    );
                }
                AgeCheck::TooYoung { .. } => {}
                AgeCheck::Eligible { age_minutes } => {
                    let outcome = adapter.delete_node(&node.name);
                    actions.push(action_from(
                        self.kind(),
                        node.name.clone(),
                        outcome,
                        format!("Node NotReady for {age_minutes:.1} minutes"),
                    ));
                }
            }
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;

    use super::*;
    use crate::cluster::adapter::{ConditionStatus, NodeInfo, ReadyCondition};
    use crate::cluster::memory::{InMemoryCluster, RecordedCall};

    fn node(name: &str, status: ConditionStatus, age_minutes: Option<i64>, now: DateTime<Utc>) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            labels: BTreeMap::new(),
            ready: Some(ReadyCondition {
                status,
                last_transition: age_minutes.map(|m| now - Duration::minutes(m)),
            }),
        }
    }

    #[test]
    fn four_minutes_is_left_alone_six_is_deleted() {
        let now = Utc::now();
        let remediator = StuckNodeRemediator::new(AgeGate::new(5));

        let young = InMemoryCluster::new("ctx")
            .with_nodes(vec![node("n1", ConditionStatus::False, Some(4), now)]);
        assert!(remediator.detect_and_remediate(&young, now).unwrap().is_empty());
        assert!(young.calls().is_empty());

        let old = InMemoryCluster::new("ctx")
            .with_nodes(vec![node("n1", ConditionStatus::False, Some(6), now)]);
        let actions = remediator.detect_and_remediate(&old, now).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, RemediationKind::StuckNodeDelete);
        assert_eq!(actions[0].details, "Node NotReady for 6.0 minutes");
        assert_eq!(old.calls(), vec![RecordedCall::DeleteNode("n1".to_string())]);
    }

    #[test]
    fn ready_nodes_and_missing_timestamps_are_skipped() {
        let now = Utc::now();
        let cluster = InMemoryCluster::new("ctx").with_nodes(vec![
            node("healthy", ConditionStatus::True, Some(600), now),
            node("no-time", ConditionStatus::False, None, now),
            node("unknown", ConditionStatus::Unknown, Some(10), now),
        ]);
        let actions = StuckNodeRemediator::new(AgeGate::new(5))
            .detect_and_remediate(&cluster, now)
            .unwrap();
        let targets: Vec<&str> = actions.iter().map(|a| a.target.as_str()).collect();
        assert_eq!(targets, vec!["unknown"]);
    }

    #[test]
    fn delete_failure_is_recorded() {
        let now = Utc::now();
        let cluster = InMemoryCluster::new("ctx")
            .with_nodes(vec![node("n1", ConditionStatus::False, Some(9), now)]);
        cluster.fail_on("n1");
        let actions = StuckNodeRemediator::new(AgeGate::new(5))
            .detect_and_remediate(&cluster, now)
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert!(!actions[0].success);
    }
}
