//! Startup reconciliation planning.
//!
//! Given the containers actually running and the scaling the store
//! records for services it believes are running, produce the synthetic
//! events that converge the store to reality: one "start" per running
//! container, and one "die" for every recorded replica beyond the running
//! count. Nothing is ever fabricated upward.

use std::collections::HashMap;

use crate::event::{ComposeLabels, ContainerInfo, EventKind, RuntimeEvent};

/// A service the store records as running, keyed the way compose labels
/// its containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedScaling {
    pub project: String,
    pub service: String,
    pub scaling: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub started: Vec<RuntimeEvent>,
    pub died: Vec<RuntimeEvent>,
}

/// Project labels are lowercased by compose, so projects compare
/// case-insensitively.
pub fn plan_reconciliation(
    containers: &[ContainerInfo],
    recorded: &[RecordedScaling],
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();
    let mut running: HashMap<(String, String), u32> = HashMap::new();

    for container in containers {
        let Some(labels) = container.compose_labels() else {
            continue;
        };
        *running
            .entry((labels.project.to_lowercase(), labels.service.clone()))
            .or_default() += 1;
        plan.started.push(RuntimeEvent::new(
            EventKind::Start,
            container.id.clone(),
            container.labels.clone(),
        ));
    }

    for record in recorded {
        let actual = running
            .get(&(record.project.to_lowercase(), record.service.clone()))
            .copied()
            .unwrap_or(0);
        // Highest ordinal first, so each event lowers scaling by one.
        for number in (actual + 1..=record.scaling).rev() {
            plan.died.push(RuntimeEvent::synthetic(
                EventKind::Die,
                &ComposeLabels {
                    project: record.project.clone(),
                    service: record.service.clone(),
                    number,
                },
            ));
        }
    }

    plan
}
