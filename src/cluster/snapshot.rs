//! Point-in-time cluster counts.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

use crate::cluster::adapter::{ClusterAdapter, NodeInfo, PodInfo};
use crate::core::errors::Result;
use crate::model::ClusterSnapshot;

/// Capture node and pod counts. Snapshots are diagnostic only, so an adapter
/// failure yields an all-zero snapshot instead of an error.
pub fn capture_snapshot(adapter: &dyn ClusterAdapter, now: DateTime<Utc>) -> ClusterSnapshot {
    match try_capture(adapter, now) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("[STO-SNAPSHOT] cluster state unavailable: {e}");
            ClusterSnapshot::empty(now)
        }
    }
}

fn try_capture(adapter: &dyn ClusterAdapter, now: DateTime<Utc>) -> Result<ClusterSnapshot> {
    let nodes = adapter.list_nodes(None)?;
    let pods = adapter.list_pods(None, None)?;
    Ok(summarize(&nodes, &pods, now))
}

/// Pure rollup of listed nodes and pods.
#[must_use]
pub fn summarize(nodes: &[NodeInfo], pods: &[PodInfo], now: DateTime<Utc>) -> ClusterSnapshot {
    let mut snapshot = ClusterSnapshot::empty(now);
    snapshot.total_nodes = nodes.len();
    for node in nodes {
        if node.is_ready() {
            snapshot.ready_nodes += 1;
        }
        if node.is_spot() {
            snapshot.spot_nodes += 1;
        }
        *snapshot
            .node_pool_counts
            .entry(node.pool().to_string())
            .or_default() += 1;
    }
    snapshot.total_pods = pods.len();
    snapshot.pending_pods = pods.iter().filter(|p| p.is_pending()).count();
    snapshot
}
