//! Container-event transitions.
//!
//! A container start raises the service's recorded scaling to at least
//! the container's ordinal; a container death lowers it below the ordinal.
//! Both run as actions under the owning pipeline's key.

use stackgrid_core::Status;
use stackgrid_monitor::{ComposeLabels, EventKind, Handlers, RuntimeEvent, handler};
use stackgrid_scheduler::Flow;
use stackgrid_store::ScalingBound;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::EngineResult;

fn statuses(matching: fn(&Status) -> bool) -> Vec<Status> {
    Status::ALL.into_iter().filter(matching).collect()
}

impl Engine {
    /// Handlers for the runtime's `start` and `die` events.
    pub fn event_handlers(&self) -> Handlers {
        let on_start = self.clone();
        let on_die = self.clone();
        Handlers::new()
            .on(
                EventKind::Start,
                handler(move |event| {
                    let engine = on_start.clone();
                    async move { engine.container_started(event).await.map_err(Into::into) }
                }),
            )
            .on(
                EventKind::Die,
                handler(move |event| {
                    let engine = on_die.clone();
                    async move { engine.container_died(event).await.map_err(Into::into) }
                }),
            )
    }

    /// Resolve an event to `(pipeline uuid, service uuid, ordinal)`.
    /// Containers of projects this engine does not manage resolve to
    /// `None`.
    async fn resolve(&self, event: &RuntimeEvent) -> EngineResult<Option<(String, String, u32)>> {
        let Some(ComposeLabels {
            project,
            service,
            number,
        }) = event.compose_labels()
        else {
            return Ok(None);
        };
        let Some(pipeline) = self.store().pipeline_by_project(&project).await? else {
            debug!(%project, "container of an unmanaged project");
            return Ok(None);
        };
        let Some(service_id) = self.store().service_by_title(&pipeline, &service).await? else {
            debug!(%pipeline, %service, "container of an unknown service");
            return Ok(None);
        };
        Ok(Some((pipeline, service_id, number)))
    }

    pub async fn container_started(&self, event: RuntimeEvent) -> EngineResult<()> {
        let Some((pipeline, service, number)) = self.resolve(&event).await? else {
            return Ok(());
        };
        let engine = self.clone();
        let key = pipeline.clone();
        self.enqueue(
            &pipeline,
            format!("container started {service}#{number}"),
            async move {
                let store = engine.store();
                let scaling = store
                    .adjust_scaling(&service, ScalingBound::AtLeast(number))
                    .await?;
                store
                    .set_status_unless(&service, Status::Started, &statuses(Status::is_started))
                    .await?;
                store
                    .set_status_unless(&key, Status::Started, &statuses(Status::is_started))
                    .await?;
                info!(pipeline = %key, %service, scaling, "container started");
                Ok(Flow::Continue)
            },
        )
        .await;
        Ok(())
    }

    pub async fn container_died(&self, event: RuntimeEvent) -> EngineResult<()> {
        let Some((pipeline, service, number)) = self.resolve(&event).await? else {
            return Ok(());
        };
        let engine = self.clone();
        let key = pipeline.clone();
        self.enqueue(
            &pipeline,
            format!("container died {service}#{number}"),
            async move {
                let store = engine.store();
                let remaining = store
                    .adjust_scaling(&service, ScalingBound::AtMost(number.saturating_sub(1)))
                    .await?;
                if remaining > 0 {
                    store
                        .set_status_unless(&service, Status::Started, &statuses(Status::is_started))
                        .await?;
                } else {
                    store
                        .set_status_unless(&service, Status::Stopped, &statuses(Status::is_stopped))
                        .await?;
                }

                let any_started = store
                    .pipeline_services(&key)
                    .await?
                    .iter()
                    .any(|s| s.status.is_some_and(|s| s.is_started()));
                if !any_started {
                    store
                        .set_status_unless(&key, Status::Stopped, &statuses(Status::is_stopped))
                        .await?;
                }
                info!(pipeline = %key, %service, remaining, "container died");
                Ok(Flow::Continue)
            },
        )
        .await;
        Ok(())
    }
}
