//! Service state machine. Service actions run under the owning
//! pipeline's key, so they serialize against pipeline actions.

use stackgrid_core::{Status, SubjectGroup, Term, Trigger, Triple};
use stackgrid_scheduler::{ActionResult, Flow};
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Scale(u32),
}

impl ServiceAction {
    pub fn trigger(&self) -> Trigger {
        match self {
            ServiceAction::Start | ServiceAction::Stop => Trigger::RequestedStatus,
            ServiceAction::Restart => Trigger::RestartRequested,
            ServiceAction::Scale(_) => Trigger::RequestedScaling,
        }
    }

    pub fn pending(&self) -> Status {
        match self {
            ServiceAction::Start => Status::Starting,
            ServiceAction::Stop => Status::Stopping,
            ServiceAction::Restart => Status::Restarting,
            ServiceAction::Scale(_) => Status::Scaling,
        }
    }
}

fn requested_action(triple: &Triple) -> Option<ServiceAction> {
    match Trigger::from_predicate(&triple.p)? {
        Trigger::RequestedStatus => {
            let Some(iri) = triple.o.as_iri() else {
                error!(%triple, "requestedStatus must be an IRI");
                return None;
            };
            match Status::from_iri(iri) {
                Some(Status::Started) => Some(ServiceAction::Start),
                Some(Status::Stopped) => Some(ServiceAction::Stop),
                _ => {
                    error!(status = %iri, "requested service status not implemented");
                    None
                }
            }
        }
        Trigger::RestartRequested => {
            if triple.o.as_literal().is_none() {
                error!(%triple, "restartRequested must be a literal");
                return None;
            }
            triple.o.is_true().then_some(ServiceAction::Restart)
        }
        Trigger::RequestedScaling => {
            let Some(value) = triple.o.as_literal() else {
                error!(%triple, "requestedScaling must be a literal");
                return None;
            };
            match value.trim().parse::<u32>() {
                Ok(n) => Some(ServiceAction::Scale(n)),
                Err(_) => {
                    error!(%triple, "requestedScaling is not a replica count");
                    None
                }
            }
        }
        Trigger::DeleteRequested | Trigger::UpdateRequested => None,
    }
}

impl Engine {
    pub(crate) async fn service_update(&self, group: &SubjectGroup) -> EngineResult<()> {
        // Every trigger of a service group is acted upon, in order.
        let requests: Vec<(ServiceAction, Term)> = group
            .inserts
            .iter()
            .filter_map(|t| requested_action(t).map(|action| (action, t.o.clone())))
            .collect();
        if requests.is_empty() {
            return Ok(());
        }

        let Some(id) = self.store().resource_id(&group.subject).await? else {
            warn!(subject = %group.subject, "service has no uuid, ignoring triggers");
            return Ok(());
        };
        let Some(pipeline) = self.store().service_pipeline(&id).await? else {
            warn!(service = %id, "service belongs to no pipeline, ignoring triggers");
            return Ok(());
        };
        for (action, value) in requests {
            self.request_service(&pipeline, &id, action, Some(value))
                .await;
        }
        Ok(())
    }

    /// Queue `action` for service `id` under its pipeline's key.
    pub async fn request_service(
        &self,
        pipeline: &str,
        id: &str,
        action: ServiceAction,
        trigger_value: Option<Term>,
    ) -> bool {
        let engine = self.clone();
        let (pipeline_key, service) = (pipeline.to_string(), id.to_string());
        self.enqueue(
            pipeline,
            format!("service {action:?} {id}"),
            async move {
                engine
                    .run_service_action(&pipeline_key, &service, action, trigger_value.as_ref())
                    .await
            },
        )
        .await
    }

    async fn run_service_action(
        &self,
        pipeline: &str,
        id: &str,
        action: ServiceAction,
        trigger_value: Option<&Term>,
    ) -> ActionResult {
        if let Some(value) = trigger_value {
            if !self.claim_trigger(id, action.trigger(), value).await? {
                return Ok(Flow::Continue);
            }
        }

        info!(%pipeline, service = %id, ?action, "service transition");
        self.store().set_status(id, action.pending()).await?;

        let outcome = self.service_command(pipeline, id, action).await;
        match outcome {
            Ok(status) => {
                info!(service = %id, %status, "service transition finished");
                self.store().set_status(id, status).await?;
            }
            Err(e) => {
                error!(service = %id, ?action, error = %e, "service transition failed");
                self.store().set_status(id, Status::Error).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn service_command(
        &self,
        pipeline: &str,
        id: &str,
        action: ServiceAction,
    ) -> EngineResult<Status> {
        let title = self
            .store()
            .title(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("title of service {id}")))?;
        let dir = self.projects().dir(pipeline)?;
        let compose = self.compose();

        match action {
            ServiceAction::Start => {
                compose.start(&dir, Some(&title)).await?;
                Ok(Status::Started)
            }
            ServiceAction::Stop => {
                compose.stop(&dir, Some(&title)).await?;
                Ok(Status::Stopped)
            }
            ServiceAction::Restart => {
                if let Err(e) = compose.restart(&dir, Some(&title)).await {
                    warn!(service = %id, error = %e, "restart failed");
                }
                Ok(Status::Started)
            }
            ServiceAction::Scale(replicas) => {
                self.store().set_scaling(id, replicas).await?;
                compose.scale(&dir, &title, replicas).await?;
                Ok(Status::Started)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use stackgrid_core::vocab;

    use super::*;

    fn triple(p: &str, o: Term) -> Triple {
        Triple::new("http://r/services/s1", p, o)
    }

    #[test]
    fn triggers_map_to_actions() {
        let t = triple(vocab::REQUESTED_STATUS, Term::iri(Status::Started.iri()));
        assert_eq!(requested_action(&t), Some(ServiceAction::Start));

        let t = triple(vocab::REQUESTED_SCALING, Term::literal("3"));
        assert_eq!(requested_action(&t), Some(ServiceAction::Scale(3)));

        let t = triple(vocab::RESTART_REQUESTED, Term::literal("true"));
        assert_eq!(requested_action(&t), Some(ServiceAction::Restart));
    }

    #[test]
    fn unsupported_or_malformed_requests_are_skipped() {
        let t = triple(vocab::REQUESTED_STATUS, Term::iri(Status::Up.iri()));
        assert_eq!(requested_action(&t), None);

        let t = triple(vocab::REQUESTED_SCALING, Term::literal("many"));
        assert_eq!(requested_action(&t), None);

        let t = triple(vocab::REQUESTED_SCALING, Term::iri("3"));
        assert_eq!(requested_action(&t), None);

        let t = triple(vocab::DELETE_REQUESTED, Term::literal("true"));
        assert_eq!(requested_action(&t), None);
    }
}
