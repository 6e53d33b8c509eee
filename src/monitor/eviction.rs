//! Background eviction-rate monitor.
//!
//! One monitor covers one execution window: [`EvictionMonitor::start`] spawns the
//! poll thread and [`EvictionMonitor::stop`] consumes the handle, so a window can't
//! be restarted. New events travel to the controller over a channel; the dedup set
//! lives only on the poll thread.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};

use crate::cluster::adapter::{ClusterAdapter, ClusterEvent};
use crate::core::errors::{Result, StoError};
use crate::model::EvictionEvent;

/// Upper bound on how long `stop` waits for the poll thread to exit.
pub const STOP_WAIT: Duration = Duration::from_secs(5);

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Below this the window is treated as empty and the rate is 0.
const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Evictions per hour over `elapsed`; 0 when the window is ~0.
#[must_use]
pub fn eviction_rate(count: usize, elapsed: Duration) -> f64 {
    if elapsed < MIN_ELAPSED {
        return 0.0;
    }
    count as f64 / (elapsed.as_secs_f64() / SECONDS_PER_HOUR)
}

/// Whether a listed event is a node-level eviction.
#[must_use]
pub fn is_node_eviction(event: &ClusterEvent) -> bool {
    let mentions_evict = |text: &str| text.to_ascii_lowercase().contains("evict");
    event.involved_kind == "Node" && (mentions_evict(&event.reason) || mentions_evict(&event.message))
}

/// Filter plus identity-keyed dedup across polls.
#[derive(Debug, Default)]
pub struct EvictionTracker {
    seen: HashSet<String>,
}

impl EvictionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the evictions in `events` whose identity was not seen before.
    pub fn ingest(&mut self, events: &[ClusterEvent]) -> Vec<EvictionEvent> {
        let observed_at = Utc::now();
        events
            .iter()
            .filter(|e| is_node_eviction(e))
            .filter(|e| self.seen.insert(e.uid.clone()))
            .map(|e| EvictionEvent {
                uid: e.uid.clone(),
                timestamp: e.timestamp.unwrap_or(observed_at),
                node: e.involved_name.clone(),
                reason: e.reason.clone(),
                message: e.message.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}

/// What a finished window observed.
#[derive(Debug, Clone)]
pub struct EvictionSummary {
    pub events: Vec<EvictionEvent>,
    pub rate_per_hour: f64,
    pub elapsed: Duration,
    /// False when the poll thread had not exited within [`STOP_WAIT`].
    pub clean_shutdown: bool,
}

/// Handle to a running poll loop.
#[derive(Debug)]
pub struct EvictionMonitor {
    started: Instant,
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    events_rx: Receiver<EvictionEvent>,
    join: thread::JoinHandle<()>,
}

impl EvictionMonitor {
    /// Record the start time and begin polling immediately, then every `interval`.
    pub fn start(adapter: Arc<dyn ClusterAdapter>, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let (events_tx, events_rx) = unbounded::<EvictionEvent>();
        let started = Instant::now();

        let join = thread::Builder::new()
            .name("sto-eviction".to_string())
            .spawn(move || {
                poll_loop(adapter.as_ref(), interval, &stop_rx, &events_tx);
                drop(done_tx);
            })
            .map_err(|source| StoError::Runtime {
                details: format!("failed to spawn eviction monitor thread: {source}"),
            })?;

        Ok(Self {
            started,
            stop_tx,
            done_rx,
            events_rx,
            join,
        })
    }

    /// Signal the loop, wait up to [`STOP_WAIT`], then hand back events and rate.
    #[must_use]
    pub fn stop(self) -> EvictionSummary {
        let _ = self.stop_tx.try_send(());
        let elapsed = self.started.elapsed();

        let clean_shutdown = matches!(
            self.done_rx.recv_timeout(STOP_WAIT),
            Err(RecvTimeoutError::Disconnected) | Ok(())
        );
        if clean_shutdown {
            let _ = self.join.join();
        } else {
            eprintln!(
                "[STO-MONITOR] eviction poll still busy after {}s; abandoning it",
                STOP_WAIT.as_secs()
            );
        }

        let events: Vec<EvictionEvent> = self.events_rx.try_iter().collect();
        EvictionSummary {
            rate_per_hour: eviction_rate(events.len(), elapsed),
            events,
            elapsed,
            clean_shutdown,
        }
    }
}

fn poll_loop(
    adapter: &dyn ClusterAdapter,
    interval: Duration,
    stop_rx: &Receiver<()>,
    events_tx: &Sender<EvictionEvent>,
) {
    let mut tracker = EvictionTracker::new();
    loop {
        match adapter.list_events() {
            Ok(events) => {
                for event in tracker.ingest(&events) {
                    if events_tx.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => eprintln!("[STO-MONITOR] event poll failed: {e}"),
        }
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::InMemoryCluster;

    fn event(uid: &str, kind: &str, reason: &str, message: &str) -> ClusterEvent {
        ClusterEvent {
            uid: uid.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            involved_kind: kind.to_string(),
            involved_name: format!("node-{uid}"),
            timestamp: None,
        }
    }

    #[test]
    fn rate_over_half_an_hour() {
        let rate = eviction_rate(5, Duration::from_secs(1800));
        assert!((rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rate_is_zero_for_empty_window() {
        assert!(eviction_rate(3, Duration::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn filter_requires_node_kind_and_evict_signal() {
        assert!(is_node_eviction(&event("1", "Node", "SpotEviction", "")));
        assert!(is_node_eviction(&event("2", "Node", "Preempting", "will be EVICTED")));
        assert!(!is_node_eviction(&event("3", "Pod", "Evicted", "")));
        assert!(!is_node_eviction(&event("4", "Node", "NodeNotReady", "kubelet stopped")));
    }

    #[test]
    fn repeated_polls_count_each_identity_once() {
        let batch: Vec<ClusterEvent> = (0..4)
            .map(|i| event(&i.to_string(), "Node", "Evicted", ""))
            .collect();
        let mut tracker = EvictionTracker::new();
        assert_eq!(tracker.ingest(&batch).len(), 4);
        assert!(tracker.ingest(&batch).is_empty());
        assert_eq!(tracker.seen(), 4);
    }

    #[test]
    fn same_identity_across_two_polls_is_one_event() {
        let mut tracker = EvictionTracker::new();
        let first = tracker.ingest(&[event("x", "Node", "Evicted", "")]);
        let second = tracker.ingest(&[event("x", "Node", "Evicted", "")]);
        assert_eq!(first.len() + second.len(), 1);
    }

    #[test]
    fn monitor_collects_deduplicated_events_and_stops_promptly() {
        let cluster = Arc::new(InMemoryCluster::new("ctx"));
        cluster.push_event_poll(vec![event("a", "Node", "Evicted", "")]);
        cluster.push_event_poll(vec![
            event("a", "Node", "Evicted", ""),
            event("b", "Node", "SpotEviction", ""),
            event("c", "Pod", "Evicted", ""),
        ]);

        let adapter: Arc<dyn ClusterAdapter> = cluster.clone();
        let monitor = EvictionMonitor::start(adapter, Duration::from_millis(10)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while cluster.event_poll_count() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        let summary = monitor.stop();
        assert!(started.elapsed() < STOP_WAIT);
        assert!(summary.clean_shutdown);
        let mut uids: Vec<&str> = summary.events.iter().map(|e| e.uid.as_str()).collect();
        uids.sort_unstable();
        assert_eq!(uids, vec!["a", "b"]);
        assert!(summary.rate_per_hour > 0.0);
    }

    #[test]
    fn long_interval_does_not_delay_stop() {
        let adapter: Arc<dyn ClusterAdapter> = Arc::new(InMemoryCluster::new("ctx"));
        let monitor = EvictionMonitor::start(adapter, Duration::from_secs(3600)).unwrap();
        thread::sleep(Duration::from_millis(20));
        let summary = monitor.stop();
        assert!(summary.clean_shutdown);
        assert!(summary.events.is_empty());
        assert!(summary.rate_per_hour.abs() < f64::EPSILON);
    }
}
