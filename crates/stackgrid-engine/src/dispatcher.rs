//! Change-feed ingestion: parse, select this graph's batch, group by
//! subject, and hand each group to its state machine.

use stackgrid_core::{DeltaBatch, ResourceKind, SubjectGroup};
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Handle a raw change-feed body.
    ///
    /// Only a malformed payload is an error. A batch for another graph is
    /// ignored, and per-group failures are logged without aborting the
    /// rest of the batch. Returns the number of groups dispatched.
    pub async fn handle_delta(&self, body: &[u8]) -> EngineResult<usize> {
        let batches = DeltaBatch::parse(body)?;
        let Some(batch) = DeltaBatch::select(batches, &self.settings().graph) else {
            debug!(graph = %self.settings().graph, "no batch for this graph");
            return Ok(0);
        };
        Ok(self.dispatch(batch).await)
    }

    /// Route every subject group of `batch` to its state machine.
    pub async fn dispatch(&self, batch: DeltaBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let groups = batch.group_by_subject(&self.settings().base);
        info!(
            inserts = batch.inserts.len(),
            deletes = batch.deletes.len(),
            groups = groups.len(),
            "dispatching delta"
        );

        let mut dispatched = 0;
        for group in groups {
            let subject = group.subject.clone();
            let kind = group.kind;
            match self.dispatch_group(group).await {
                Ok(()) => dispatched += 1,
                Err(e) => error!(%subject, ?kind, error = %e, "failed to handle delta group"),
            }
        }
        dispatched
    }

    async fn dispatch_group(&self, group: SubjectGroup) -> EngineResult<()> {
        match group.kind {
            ResourceKind::Repository => self.repository_update(&group).await,
            ResourceKind::Pipeline => self.pipeline_update(&group).await,
            ResourceKind::Service => self.service_update(&group).await,
        }
    }
}
