//! Service log retrieval.

use tracing::debug;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Tail of a service's container logs.
    pub async fn service_logs(&self, service_id: &str) -> EngineResult<String> {
        let not_found = || EngineError::NotFound(format!("service {service_id}"));
        let pipeline = self
            .store()
            .service_pipeline(service_id)
            .await?
            .ok_or_else(not_found)?;
        let title = self.store().title(service_id).await?.ok_or_else(not_found)?;
        let dir = self.projects().dir(&pipeline)?;

        let output = self.compose().logs(&dir, &title).await?;
        // A process ended by a signal counts as timed out.
        if output.timed_out || output.code.is_none() {
            return Err(EngineError::LogsTimedOut);
        }
        debug!(service = %service_id, bytes = output.stdout.len(), "service logs read");
        Ok(output.stdout)
    }
}
