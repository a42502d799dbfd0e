//! [`ContainerRuntime`] backed by the local Docker daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{ContainerSummary, EventMessage, NetworkConnectRequest};
use bollard::query_parameters::{
    EventsOptions, InspectContainerOptions, ListContainersOptions, RemoveImageOptions,
    RestartContainerOptions,
};
use futures::StreamExt;
use tracing::{debug, info};

use crate::error::{MonitorError, MonitorResult};
use crate::event::{ContainerInfo, EventKind, PROJECT_LABEL, RuntimeEvent};
use crate::runtime::{ContainerRuntime, EventStream};

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` or the default local socket.
    pub fn connect() -> MonitorResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn list(&self, label: String) -> MonitorResult<Vec<ContainerInfo>> {
        let filters = HashMap::from([
            ("label".to_string(), vec![label]),
            ("status".to_string(), vec!["running".to_string()]),
        ]);
        let options = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().map(summary_to_info).collect())
    }
}

fn summary_to_info(summary: ContainerSummary) -> ContainerInfo {
    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name: summary
            .names
            .and_then(|names| names.first().cloned())
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image: summary.image,
        labels: summary.labels.unwrap_or_default(),
        networks: summary
            .network_settings
            .and_then(|ns| ns.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default(),
    }
}

fn message_to_event(message: EventMessage) -> Option<RuntimeEvent> {
    let action = message.action?;
    let actor = message.actor?;
    Some(RuntimeEvent::new(
        EventKind::parse(&action),
        actor.id.unwrap_or_default(),
        actor.attributes.unwrap_or_default(),
    ))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> MonitorResult<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn running_containers(&self) -> MonitorResult<Vec<ContainerInfo>> {
        self.list(PROJECT_LABEL.to_string()).await
    }

    async fn project_containers(&self, project: &str) -> MonitorResult<Vec<ContainerInfo>> {
        self.list(format!("{PROJECT_LABEL}={project}")).await
    }

    async fn inspect(&self, container: &str) -> MonitorResult<Option<ContainerInfo>> {
        match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => {
                let config = inspect.config.unwrap_or_default();
                Ok(Some(ContainerInfo {
                    id: inspect.id.unwrap_or_default(),
                    name: inspect
                        .name
                        .map(|name| name.trim_start_matches('/').to_string())
                        .unwrap_or_default(),
                    image: config.image,
                    labels: config.labels.unwrap_or_default(),
                    networks: inspect
                        .network_settings
                        .and_then(|ns| ns.networks)
                        .map(|networks| networks.into_keys().collect())
                        .unwrap_or_default(),
                }))
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn connect_network(&self, network: &str, container: &str) -> MonitorResult<()> {
        let request = NetworkConnectRequest {
            container: Some(container.to_string()),
            ..Default::default()
        };
        self.docker.connect_network(network, request).await?;
        info!(%network, %container, "connected container to network");
        Ok(())
    }

    async fn restart_container(&self, container: &str) -> MonitorResult<()> {
        self.docker
            .restart_container(container, None::<RestartContainerOptions>)
            .await?;
        info!(%container, "restarted container");
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> MonitorResult<()> {
        match self
            .docker
            .remove_image(image, None::<RemoveImageOptions>, None)
            .await
        {
            Ok(_) => {
                info!(%image, "removed image");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(%image, "image already removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn events(&self, kinds: &[EventKind]) -> MonitorResult<EventStream> {
        let filters = HashMap::from([
            ("type".to_string(), vec!["container".to_string()]),
            (
                "event".to_string(),
                kinds.iter().map(|k| k.as_str().to_string()).collect(),
            ),
        ]);
        let options = EventsOptions {
            filters: Some(filters),
            ..Default::default()
        };
        let stream = self
            .docker
            .events(Some(options))
            .filter_map(|item| async move {
                match item {
                    Ok(message) => message_to_event(message).map(Ok),
                    Err(e) => Some(Err(MonitorError::from(e))),
                }
            })
            .boxed();
        Ok(stream)
    }
}
