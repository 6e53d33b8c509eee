//! Remediators: detect and remove infrastructure left behind by disruptive tests.
//!
//! Both remediators share one policy: compute each candidate's age from its own
//! state-transition timestamp and only act once it reaches the configured minimum.
//! Candidates without a timestamp are skipped.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

pub mod ghost_instances;
pub mod stuck_nodes;

use chrono::{DateTime, Utc};

use crate::cluster::adapter::ClusterAdapter;
use crate::core::config::RemediationConfig;
use crate::core::errors::{Result, StoError};
use crate::model::{RemediationAction, RemediationKind};

pub use ghost_instances::GhostInstanceRemediator;
pub use stuck_nodes::StuckNodeRemediator;

pub trait Remediator: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> RemediationKind;

    /// Every attempted action is returned, successful or not. `Err` means the
    /// candidates could not even be listed.
    fn detect_and_remediate(
        &self,
        adapter: &dyn ClusterAdapter,
        now: DateTime<Utc>,
    ) -> Result<Vec<RemediationAction>>;
}

/// Debounce on candidate age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeGate {
    min_age_minutes: u64,
}

/// Outcome of checking one candidate against an [`AgeGate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgeCheck {
    /// No timestamp to measure from.
    Unknown,
    TooYoung { age_minutes: f64 },
    Eligible { age_minutes: f64 },
}

impl AgeGate {
    #[must_use]
    pub const fn new(min_age_minutes: u64) -> Self {
        Self { min_age_minutes }
    }

    #[must_use]
    pub fn check(&self, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AgeCheck {
        let Some(since) = since else {
            return AgeCheck::Unknown;
        };
        let age_minutes = (now - since).num_milliseconds() as f64 / 60_000.0;
        if age_minutes >= self.min_age_minutes as f64 {
            AgeCheck::Eligible { age_minutes }
        } else {
            AgeCheck::TooYoung { age_minutes }
        }
    }
}

/// Build one action record, turning a failed mutation into `success = false`.
pub(crate) fn action_from(
    kind: RemediationKind,
    target: String,
    outcome: Result<()>,
    details: String,
) -> RemediationAction {
    let (success, details) = match outcome {
        Ok(()) => (true, details),
        Err(e) => (false, format!("Error: {e}")),
    };
    RemediationAction {
        timestamp: Utc::now(),
        action_type: kind,
        target,
        success,
        details,
    }
}

/// Failed action standing in for a remediator that could not list candidates.
#[must_use]
pub fn listing_failure(remediator: &dyn Remediator, error: &StoError) -> RemediationAction {
    RemediationAction {
        timestamp: Utc::now(),
        action_type: remediator.kind(),
        target: remediator.name().to_string(),
        success: false,
        details: format!("Error: {error}"),
    }
}

/// Enabled remediators in their fixed execution order.
#[must_use]
pub fn default_remediators(config: &RemediationConfig) -> Vec<Box<dyn Remediator>> {
    let mut remediators: Vec<Box<dyn Remediator>> = Vec::new();
    if config.vmss_ghosts.enabled {
        remediators.push(Box::new(GhostInstanceRemediator::new(AgeGate::new(
            config.vmss_ghosts.min_age_minutes,
        ))));
    }
    if config.stuck_nodes.enabled {
        remediators.push(Box::new(StuckNodeRemediator::new(AgeGate::new(
            config.stuck_nodes.min_age_minutes,
        ))));
    }
    remediators
}
