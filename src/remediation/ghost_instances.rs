//! Scale-set members stuck in a Failed or Unknown provisioning state.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};

use crate::cluster::adapter::ClusterAdapter;
use crate::core::errors::Result;
use crate::model::{RemediationAction, RemediationKind};
use crate::remediation::{AgeCheck, AgeGate, Remediator, action_from};

#[derive(Debug, Clone, Copy)]
pub struct GhostInstanceRemediator {
    gate: AgeGate,
}

impl GhostInstanceRemediator {
    #[must_use]
    pub const fn new(gate: AgeGate) -> Self {
        Self { gate }
    }
}

impl Remediator for GhostInstanceRemediator {
    fn name(&self) -> &'static str {
        "vmss_ghosts"
    }

    fn kind(&self) -> RemediationKind {
        RemediationKind::GhostInstanceDelete
    }

    fn detect_and_remediate(
        &self,
        adapter: &dyn ClusterAdapter,
        now: DateTime<Utc>,
    ) -> Result<Vec<RemediationAction>> {
        let mut actions = Vec::new();
        for instance in adapter
            .list_scale_set_instances()?
            .into_iter()
            .filter(|i| i.is_ghost())
        {
            // Creation time is the only timestamp the scale-set API exposes.
            match self.gate.check(instance.time_created, now) {
                AgeCheck::Unknown => {
                    eprintln!(
                        "[STO-REMEDIATE] skipping {}: no creation timestamp",
                        instance.target()
                    );
                }
                AgeCheck::TooYoung { .. } => {}
                AgeCheck::Eligible { age_minutes } => {
                    let outcome = adapter.delete_scale_set_instance(&instance);
                    actions.push(action_from(
                        self.kind(),
                        instance.target(),
                        outcome,
                        format!(
                            "Instance in {} state for {age_minutes:.1} minutes",
                            instance.provisioning_state
                        ),
                    ));
                }
            }
        }
        Ok(actions)
    }
}
