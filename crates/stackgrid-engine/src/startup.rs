//! Startup passes: replay triggers left over from a previous run, and
//! reconcile recorded state with the containers actually running.

use stackgrid_core::DeltaBatch;
use stackgrid_monitor::{EventStream, RecordedScaling, plan_reconciliation};
use tracing::info;

use crate::engine::Engine;
use crate::error::EngineResult;

/// What the reconciliation pass replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: usize,
    pub died: usize,
}

impl Engine {
    /// Subscribe to the runtime events the engine has handlers for. Call
    /// this before [`Engine::reconcile`] so nothing falls between the
    /// container snapshot and the subscription.
    pub async fn subscribe(&self) -> EngineResult<EventStream> {
        let kinds = self.event_handlers().kinds();
        Ok(self.runtime().events(&kinds).await?)
    }

    /// Dispatch every trigger still set in the store as if it had just been
    /// inserted. Returns the number of groups dispatched.
    pub async fn replay_pending_triggers(&self) -> EngineResult<usize> {
        let pending = self.store().pending_triggers().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!(triples = pending.len(), "replaying unresolved triggers");
        let batch = DeltaBatch::new(self.settings().graph.clone(), pending, Vec::new());
        Ok(self.dispatch(batch).await)
    }

    /// Replay a start event per running container, then a die event per
    /// recorded replica that is not running.
    pub async fn reconcile(&self) -> EngineResult<ReconcileSummary> {
        let containers = self.runtime().running_containers().await?;
        let recorded: Vec<RecordedScaling> = self
            .store()
            .running_services()
            .await?
            .into_iter()
            .map(|s| RecordedScaling {
                project: s.pipeline,
                service: s.title,
                scaling: s.scaling,
            })
            .collect();

        let plan = plan_reconciliation(&containers, &recorded);
        let summary = ReconcileSummary {
            started: plan.started.len(),
            died: plan.died.len(),
        };
        info!(
            containers = containers.len(),
            recorded = recorded.len(),
            started = summary.started,
            died = summary.died,
            "reconciling with running containers"
        );

        for event in plan.started {
            self.container_started(event).await?;
        }
        for event in plan.died {
            self.container_died(event).await?;
        }
        Ok(summary)
    }
}
