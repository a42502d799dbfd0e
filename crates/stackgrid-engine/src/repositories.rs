//! Repository handlers: pipeline initialization from a source checkout,
//! and cascading repository deletion.

use stackgrid_compose::{ComposeError, descriptor};
use stackgrid_core::{Status, SubjectGroup, Term, Trigger, vocab};
use stackgrid_scheduler::{ActionResult, Flow};
use stackgrid_store::RepositorySource;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::EngineResult;
use crate::pipelines::PipelineAction;

impl Engine {
    pub(crate) async fn repository_update(&self, group: &SubjectGroup) -> EngineResult<()> {
        for triple in &group.inserts {
            match triple.p.as_str() {
                vocab::PIPELINES => match triple.o.as_iri() {
                    Some(pipeline) => self.request_initialize(&group.subject, pipeline).await?,
                    None => error!(%triple, "pipelines must link to an IRI"),
                },
                vocab::DELETE_REQUESTED => {
                    if triple.o.as_literal().is_none() {
                        error!(%triple, "deleteRequested must be a literal");
                        continue;
                    }
                    if !triple.o.is_true() {
                        continue;
                    }
                    let Some(id) = self.store().resource_id(&group.subject).await? else {
                        warn!(subject = %group.subject, "repository has no uuid");
                        continue;
                    };
                    self.request_repository_delete(
                        &id,
                        Some(group.subject.clone()),
                        None,
                        Some(triple.o.clone()),
                    )
                    .await;
                }
                _ => {}
            }
        }

        // The repository record was removed by a client; its pipelines are
        // the `pipelines` links deleted alongside the uuid.
        let removed = group
            .deletes
            .iter()
            .find(|t| t.p == vocab::MU_UUID)
            .and_then(|t| t.o.as_literal());
        if let Some(repository_id) = removed {
            let mut pipelines = Vec::new();
            for link in group.deletes.iter().filter(|t| t.p == vocab::PIPELINES) {
                let Some(pipeline) = link.o.as_iri() else {
                    continue;
                };
                if let Some(id) = self.store().resource_id(pipeline).await? {
                    pipelines.push(id);
                }
            }
            self.request_repository_delete(repository_id, None, Some(pipelines), None)
                .await;
        }
        Ok(())
    }

    /// Queue checkout and service generation for a pipeline newly linked to
    /// `repository`.
    async fn request_initialize(&self, repository: &str, pipeline: &str) -> EngineResult<()> {
        let Some(id) = self.store().resource_id(pipeline).await? else {
            warn!(%pipeline, "pipeline has no uuid, cannot initialize");
            return Ok(());
        };
        let source = self.store().repository_source(repository).await?;
        if source.location.is_none() {
            error!(pipeline = %id, %repository, "cannot clone repository, location not specified");
            self.store().set_status(&id, Status::Error).await?;
            return Ok(());
        }

        let engine = self.clone();
        let key = id.clone();
        let subject = pipeline.to_string();
        self.enqueue(&id, format!("pipeline initialize {id}"), async move {
            engine.initialize_pipeline(&key, &subject, source).await
        })
        .await;
        Ok(())
    }

    /// Clone the sources into a fresh project directory and create one
    /// service record per declared sub-service. Any failure leaves the
    /// pipeline in `Error` with no directory and no service records.
    async fn initialize_pipeline(
        &self,
        id: &str,
        subject: &str,
        source: RepositorySource,
    ) -> ActionResult {
        let dir = match self.projects().dir(id) {
            Ok(dir) => dir,
            Err(e) => {
                error!(pipeline = %id, error = %e, "cannot initialize pipeline");
                self.store().set_status(id, Status::Error).await?;
                return Ok(Flow::Continue);
            }
        };
        if self.projects().exists(id).await? {
            warn!(pipeline = %id, "project directory already exists, not initializing");
            return Ok(Flow::Continue);
        }
        let Some(location) = source.location.as_deref() else {
            self.store().set_status(id, Status::Error).await?;
            return Ok(Flow::Continue);
        };

        info!(pipeline = %id, %location, branch = ?source.branch, "initializing pipeline");
        self.store().set_status(id, Status::Initializing).await?;

        let created: EngineResult<()> = async {
            tokio::fs::create_dir_all(self.projects().root())
                .await
                .map_err(ComposeError::from)?;
            self.git()
                .clone(location, source.branch.as_deref(), &dir)
                .await?;
            let services: Vec<_> = descriptor::load(&dir)
                .await?
                .iter()
                .map(|s| self.new_service(&s.name))
                .collect();
            self.store().insert_services(subject, &services).await?;
            Ok(())
        }
        .await;

        match created {
            Ok(()) => {
                self.store().set_status(id, Status::Down).await?;
                info!(pipeline = %id, "pipeline initialized");
            }
            Err(e) => {
                error!(pipeline = %id, %location, error = %e, "cannot initialize pipeline");
                if let Err(e) = self.projects().remove(id).await {
                    warn!(pipeline = %id, error = %e, "failed to remove partial checkout");
                }
                self.store().set_status(id, Status::Error).await?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Queue the cascade under the repository's own key: delete every
    /// pipeline, wait for each pipeline queue to drain, and only then
    /// delete the repository's triples.
    async fn request_repository_delete(
        &self,
        id: &str,
        subject: Option<String>,
        pipelines: Option<Vec<String>>,
        trigger_value: Option<Term>,
    ) {
        let engine = self.clone();
        let key = id.to_string();
        self.enqueue(id, format!("repository delete {id}"), async move {
            if let Some(value) = &trigger_value {
                if !engine
                    .claim_trigger(&key, Trigger::DeleteRequested, value)
                    .await?
                {
                    return Ok(Flow::Continue);
                }
            }
            let pipelines = match pipelines {
                Some(pipelines) => pipelines,
                None => engine.store().repository_pipelines(&key).await?,
            };

            info!(repository = %key, pipelines = pipelines.len(), "deleting repository");
            for pipeline in &pipelines {
                engine
                    .request_pipeline(pipeline, PipelineAction::Delete, None)
                    .await;
            }
            for pipeline in &pipelines {
                engine.scheduler().cancel(pipeline).await;
            }

            if let Some(subject) = subject {
                engine.store().delete_resource(&subject).await?;
            }
            info!(repository = %key, "repository deleted");
            Ok(Flow::StopQueue)
        })
        .await;
    }
}
