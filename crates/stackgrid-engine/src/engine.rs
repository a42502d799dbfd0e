//! The engine context shared by every handler.

use std::future::Future;
use std::sync::Arc;

use stackgrid_compose::{Compose, Git, Projects};
use stackgrid_core::{StackConfig, Term, Trigger};
use stackgrid_monitor::ContainerRuntime;
use stackgrid_scheduler::{Action, ActionResult, ActionScheduler, Flow};
use stackgrid_store::{NewService, ResourceStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineResult;

/// Single-slot scheduler key for proxy restarts.
pub const PROXY_KEY: &str = "proxy";

/// Engine behaviour taken from the configuration file.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Named graph this instance reads, writes, and accepts deltas for.
    pub graph: String,
    /// Base of resource IRIs.
    pub base: String,
    pub public_network: Option<String>,
    pub proxy_container: Option<String>,
    pub prune_images: bool,
}

impl EngineSettings {
    pub fn from_config(config: &StackConfig) -> Self {
        Self {
            graph: config.store.graph.clone(),
            base: config.resources.base.clone(),
            public_network: config.runtime.public_network.clone(),
            proxy_container: config.runtime.proxy_container.clone(),
            prune_images: config.runtime.prune_images,
        }
    }
}

struct Inner {
    settings: EngineSettings,
    store: Arc<dyn ResourceStore>,
    runtime: Arc<dyn ContainerRuntime>,
    compose: Compose,
    git: Git,
    projects: Projects,
    scheduler: ActionScheduler,
    proxy: ActionScheduler,
}

/// Owns the scheduler registry and every collaborator the state machines
/// talk to. Cloning is cheap; clones share everything.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        store: Arc<dyn ResourceStore>,
        runtime: Arc<dyn ContainerRuntime>,
        compose: Compose,
        git: Git,
        projects: Projects,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                store,
                runtime,
                compose,
                git,
                projects,
                scheduler: ActionScheduler::new(),
                proxy: ActionScheduler::single_slot(),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.inner.store.as_ref()
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.inner.runtime.as_ref()
    }

    pub fn compose(&self) -> &Compose {
        &self.inner.compose
    }

    pub fn git(&self) -> &Git {
        &self.inner.git
    }

    pub fn projects(&self) -> &Projects {
        &self.inner.projects
    }

    /// Per-pipeline action queues.
    pub fn scheduler(&self) -> &ActionScheduler {
        &self.inner.scheduler
    }

    /// Queue `fut` under `key`. Every mutation of a pipeline, its services,
    /// or its project directory goes through here keyed by the pipeline id.
    pub(crate) async fn enqueue<F>(&self, key: &str, label: String, fut: F) -> bool
    where
        F: Future<Output = ActionResult> + Send + 'static,
    {
        debug!(%key, action = %label, "enqueueing action");
        self.inner.scheduler.enqueue(key, Action::new(label, fut)).await
    }

    /// Take ownership of a trigger: if `value` is still recorded on the
    /// resource, clear the predicate and return `true`. Returns `false`
    /// when another action (or a redelivered notification) got there first.
    pub(crate) async fn claim_trigger(
        &self,
        uuid: &str,
        trigger: Trigger,
        value: &Term,
    ) -> EngineResult<bool> {
        let values = self.store().trigger_values(uuid, trigger).await?;
        if !values.contains(value) {
            debug!(%uuid, %trigger, "trigger already handled");
            return Ok(false);
        }
        self.store().clear_trigger(uuid, trigger).await?;
        Ok(true)
    }

    /// A fresh service record for `title`.
    pub(crate) fn new_service(&self, title: &str) -> NewService {
        let uuid = Uuid::new_v4().to_string();
        NewService {
            subject: format!("{}services/{uuid}", self.settings().base),
            uuid,
            title: title.to_string(),
        }
    }

    /// Connect every container of the pipeline's compose project to the
    /// public network, when one is configured.
    pub(crate) async fn join_public_network(&self, pipeline_id: &str) {
        let Some(network) = self.settings().public_network.as_deref() else {
            return;
        };
        let containers = match self
            .runtime()
            .project_containers(&compose_project_name(pipeline_id))
            .await
        {
            Ok(containers) => containers,
            Err(e) => {
                warn!(pipeline = %pipeline_id, error = %e, "failed to list project containers");
                return;
            }
        };
        for container in containers {
            if container.networks.iter().any(|n| n == network) {
                continue;
            }
            if let Err(e) = self.runtime().connect_network(network, &container.id).await {
                warn!(
                    pipeline = %pipeline_id,
                    container = %container.name,
                    %network,
                    error = %e,
                    "failed to join public network"
                );
            }
        }
    }

    /// Restart the proxy container through the single-slot queue, so a
    /// burst of requests restarts it once.
    pub(crate) async fn restart_proxy(&self) {
        let Some(container) = self.settings().proxy_container.clone() else {
            return;
        };
        let runtime = self.inner.runtime.clone();
        let accepted = self
            .inner
            .proxy
            .enqueue(
                PROXY_KEY,
                Action::new("restart proxy", async move {
                    runtime.restart_container(&container).await?;
                    Ok(Flow::Continue)
                }),
            )
            .await;
        if !accepted {
            debug!("proxy restart already pending");
        }
    }

    /// Wait for every queued action to finish and tear the queues down.
    /// Queues come back on demand, so the engine stays usable.
    pub async fn graceful_shutdown(&self) {
        info!("draining engine queues");
        self.inner.scheduler.graceful_shutdown().await;
        self.inner.proxy.graceful_shutdown().await;
    }
}

/// Compose derives project names from the directory name: lowercased,
/// keeping only alphanumerics, `-` and `_`.
pub fn compose_project_name(pipeline_id: &str) -> String {
    pipeline_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
