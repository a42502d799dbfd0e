//! Pipeline state machine.
//!
//! | trigger                  | pending      | action            | success   |
//! |--------------------------|--------------|-------------------|-----------|
//! | requestedStatus Up       | Starting     | compose up        | Up        |
//! | requestedStatus Down     | Stopping     | compose down      | Down      |
//! | requestedStatus Stopped  | Stopping     | compose stop      | Stopped   |
//! | requestedStatus Started  | Starting     | compose start     | Started   |
//! | restartRequested         | Restarting   | compose restart   | Started   |
//! | updateRequested          | Updating     | fetch, reset, up  | Up        |
//! | deleteRequested          | Removing     | down, rm, delete  | (removed) |
//!
//! Failures move the pipeline to `Error`, except restart which is
//! best-effort.

use std::path::Path;

use stackgrid_compose::descriptor;
use stackgrid_core::{Status, SubjectGroup, Term, Trigger, Triple, vocab};
use stackgrid_scheduler::{ActionResult, Flow};
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineAction {
    Up,
    Down,
    Stop,
    Start,
    Restart,
    Update,
    Delete,
}

impl PipelineAction {
    pub fn from_requested_status(status: Status) -> Option<Self> {
        match status {
            Status::Up => Some(PipelineAction::Up),
            Status::Down => Some(PipelineAction::Down),
            Status::Stopped => Some(PipelineAction::Stop),
            Status::Started => Some(PipelineAction::Start),
            _ => None,
        }
    }

    pub fn trigger(&self) -> Trigger {
        match self {
            PipelineAction::Up
            | PipelineAction::Down
            | PipelineAction::Stop
            | PipelineAction::Start => Trigger::RequestedStatus,
            PipelineAction::Restart => Trigger::RestartRequested,
            PipelineAction::Update => Trigger::UpdateRequested,
            PipelineAction::Delete => Trigger::DeleteRequested,
        }
    }

    pub fn pending(&self) -> Status {
        match self {
            PipelineAction::Up | PipelineAction::Start => Status::Starting,
            PipelineAction::Down | PipelineAction::Stop => Status::Stopping,
            PipelineAction::Restart => Status::Restarting,
            PipelineAction::Update => Status::Updating,
            PipelineAction::Delete => Status::Removing,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineAction::Up => "up",
            PipelineAction::Down => "down",
            PipelineAction::Stop => "stop",
            PipelineAction::Start => "start",
            PipelineAction::Restart => "restart",
            PipelineAction::Update => "update",
            PipelineAction::Delete => "delete",
        }
    }
}

/// The action a trigger triple asks for, if it is a well-formed pipeline
/// request. Ill-typed objects are logged and skipped.
fn requested_action(triple: &Triple) -> Option<PipelineAction> {
    let trigger = Trigger::from_predicate(&triple.p)?;
    match trigger {
        Trigger::RequestedStatus => {
            let Some(iri) = triple.o.as_iri() else {
                error!(%triple, "requestedStatus must be an IRI");
                return None;
            };
            let action = Status::from_iri(iri).and_then(PipelineAction::from_requested_status);
            if action.is_none() {
                error!(status = %iri, "requested pipeline status not implemented");
            }
            action
        }
        Trigger::RestartRequested | Trigger::UpdateRequested | Trigger::DeleteRequested => {
            if triple.o.as_literal().is_none() {
                error!(%triple, "{trigger} must be a literal");
                return None;
            }
            if !triple.o.is_true() {
                return None;
            }
            Some(match trigger {
                Trigger::RestartRequested => PipelineAction::Restart,
                Trigger::UpdateRequested => PipelineAction::Update,
                _ => PipelineAction::Delete,
            })
        }
        Trigger::RequestedScaling => None,
    }
}

impl Engine {
    pub(crate) async fn pipeline_update(&self, group: &SubjectGroup) -> EngineResult<()> {
        // One action per pipeline per batch: the first recognised trigger.
        if let Some((action, triple)) = group
            .inserts
            .iter()
            .find_map(|t| requested_action(t).map(|a| (a, t)))
        {
            match self.store().resource_id(&group.subject).await? {
                Some(id) => {
                    self.request_pipeline(&id, action, Some(triple.o.clone()))
                        .await;
                }
                None => warn!(subject = %group.subject, "pipeline has no uuid, ignoring trigger"),
            }
        }

        for triple in &group.deletes {
            match triple.p.as_str() {
                vocab::MU_UUID => match triple.o.as_literal() {
                    Some(id) => self.request_cleanup(id).await,
                    None => error!(%triple, "mu:uuid must be a literal"),
                },
                vocab::SERVICES => match triple.o.as_iri() {
                    Some(service) => {
                        info!(pipeline = %group.subject, %service, "service unlinked, deleting its record");
                        self.store().delete_resource(service).await?;
                    }
                    None => error!(%triple, "services must link to an IRI"),
                },
                _ => {}
            }
        }
        Ok(())
    }

    /// Queue `action` on pipeline `id`. With `trigger_value`, the action
    /// first claims the trigger and does nothing if it is already gone.
    pub async fn request_pipeline(
        &self,
        id: &str,
        action: PipelineAction,
        trigger_value: Option<Term>,
    ) -> bool {
        let engine = self.clone();
        let key = id.to_string();
        self.enqueue(
            id,
            format!("pipeline {} {id}", action.label()),
            async move {
                engine
                    .run_pipeline_action(&key, action, trigger_value.as_ref())
                    .await
            },
        )
        .await
    }

    async fn run_pipeline_action(
        &self,
        id: &str,
        action: PipelineAction,
        trigger_value: Option<&Term>,
    ) -> ActionResult {
        if let Some(value) = trigger_value {
            if !self.claim_trigger(id, action.trigger(), value).await? {
                return Ok(Flow::Continue);
            }
        }
        let dir = match self.projects().dir(id) {
            Ok(dir) => dir,
            Err(e) => {
                error!(pipeline = %id, action = action.label(), error = %e, "pipeline has no usable project directory");
                self.store().set_status(id, Status::Error).await?;
                return Ok(Flow::Continue);
            }
        };
        info!(pipeline = %id, action = action.label(), "pipeline transition");
        self.store().set_status(id, action.pending()).await?;

        let outcome: EngineResult<Status> = match action {
            PipelineAction::Up => {
                let result = self.compose().up(&dir).await;
                self.join_public_network(id).await;
                self.restart_proxy().await;
                result.map(|()| Status::Up).map_err(Into::into)
            }
            PipelineAction::Down => self
                .compose()
                .down(&dir)
                .await
                .map(|()| Status::Down)
                .map_err(Into::into),
            PipelineAction::Stop => self
                .compose()
                .stop(&dir, None)
                .await
                .map(|()| Status::Stopped)
                .map_err(Into::into),
            PipelineAction::Start => self
                .compose()
                .start(&dir, None)
                .await
                .map(|()| Status::Started)
                .map_err(Into::into),
            PipelineAction::Restart => {
                if let Err(e) = self.compose().restart(&dir, None).await {
                    warn!(pipeline = %id, error = %e, "restart failed");
                }
                Ok(Status::Started)
            }
            PipelineAction::Update => self.update_pipeline(id, &dir).await.map(|()| Status::Up),
            PipelineAction::Delete => return self.delete_pipeline(id).await,
        };

        match outcome {
            Ok(status) => {
                info!(pipeline = %id, %status, "pipeline transition finished");
                self.store().set_status(id, status).await?;
            }
            Err(e) => {
                error!(pipeline = %id, action = action.label(), error = %e, "pipeline transition failed");
                self.store().set_status(id, Status::Error).await?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Fetch and reset the checkout, resync service records with the
    /// descriptor, then pull and bring the project up.
    async fn update_pipeline(&self, id: &str, dir: &Path) -> EngineResult<()> {
        self.git().fetch(dir).await?;
        let branch = match self.store().repository_of_pipeline(id).await? {
            Some(repository) => self.store().repository_source(&repository).await?.branch,
            None => None,
        };
        self.git().reset_hard(dir, branch.as_deref()).await?;
        self.sync_services(id, dir).await?;
        self.compose().pull(dir).await?;
        self.compose().up(dir).await?;
        self.join_public_network(id).await;
        self.restart_proxy().await;
        Ok(())
    }

    /// Add records for new sub-services and drop records for sub-services
    /// no longer declared. Existing records keep their uuid.
    async fn sync_services(&self, id: &str, dir: &Path) -> EngineResult<()> {
        let subject = self
            .store()
            .subject_of(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("pipeline {id}")))?;
        let declared = descriptor::load(dir).await?;
        let recorded = self.store().pipeline_services(id).await?;

        for stale in recorded
            .iter()
            .filter(|r| !declared.iter().any(|d| d.name == r.title))
        {
            info!(pipeline = %id, service = %stale.title, "service removed from descriptor");
            self.store().delete_resource(&stale.subject).await?;
        }

        let added: Vec<_> = declared
            .iter()
            .filter(|d| !recorded.iter().any(|r| r.title == d.name))
            .map(|d| self.new_service(&d.name))
            .collect();
        if !added.is_empty() {
            info!(pipeline = %id, count = added.len(), "new services in descriptor");
            self.store().insert_services(&subject, &added).await?;
        }
        Ok(())
    }

    /// Tear the project down, remove its directory and every triple of the
    /// pipeline and its services, then stop the pipeline's queue.
    async fn delete_pipeline(&self, id: &str) -> ActionResult {
        info!(pipeline = %id, "deleting pipeline");
        let subject = self.store().subject_of(id).await?;

        if self.projects().exists(id).await? {
            let dir = self.projects().dir(id)?;
            if let Err(e) = self.compose().down(&dir).await {
                warn!(pipeline = %id, error = %e, "compose down failed during delete");
            }
            if self.settings().prune_images && self.store().is_last_pipeline(id).await? {
                self.prune_images(id, &dir).await;
            }
            self.projects().remove(id).await?;
        } else {
            info!(pipeline = %id, "project directory already gone");
        }

        if let Some(subject) = subject {
            for service in self.store().pipeline_services(id).await? {
                self.store().delete_resource(&service.subject).await?;
            }
            self.store().delete_resource(&subject).await?;
        }
        Ok(Flow::StopQueue)
    }

    async fn prune_images(&self, id: &str, dir: &Path) {
        let services = match descriptor::load(dir).await {
            Ok(services) => services,
            Err(e) => {
                warn!(pipeline = %id, error = %e, "cannot read descriptor, skipping image prune");
                return;
            }
        };
        for image in services.iter().filter_map(|s| s.image.as_deref()) {
            if let Err(e) = self.runtime().remove_image(image).await {
                warn!(pipeline = %id, %image, error = %e, "failed to remove image");
            }
        }
    }

    /// The pipeline record was removed by a client: shut the project down
    /// and remove its directory.
    async fn request_cleanup(&self, id: &str) {
        let engine = self.clone();
        let key = id.to_string();
        self.enqueue(id, format!("pipeline cleanup {id}"), async move {
            if !engine.projects().exists(&key).await? {
                return Ok(Flow::StopQueue);
            }
            info!(pipeline = %key, "pipeline record removed, cleaning up project");
            let dir = engine.projects().dir(&key)?;
            if let Err(e) = engine.compose().down(&dir).await {
                warn!(pipeline = %key, error = %e, "compose down failed during cleanup");
            }
            engine.projects().remove(&key).await?;
            Ok(Flow::StopQueue)
        })
        .await;
    }
}
