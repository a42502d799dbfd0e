//! The container runtime seen from the engine.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::MonitorResult;
use crate::event::{ContainerInfo, EventKind, RuntimeEvent};

/// Live runtime events. A stream-level error or the end of the stream
/// means event delivery has failed.
pub type EventStream = BoxStream<'static, MonitorResult<RuntimeEvent>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> MonitorResult<()>;

    /// Running containers carrying compose labels.
    async fn running_containers(&self) -> MonitorResult<Vec<ContainerInfo>>;

    /// Running containers of one compose project.
    async fn project_containers(&self, project: &str) -> MonitorResult<Vec<ContainerInfo>>;

    async fn inspect(&self, container: &str) -> MonitorResult<Option<ContainerInfo>>;

    async fn connect_network(&self, network: &str, container: &str) -> MonitorResult<()>;

    async fn restart_container(&self, container: &str) -> MonitorResult<()>;

    async fn remove_image(&self, image: &str) -> MonitorResult<()>;

    /// Subscribe to container events of the given kinds.
    async fn events(&self, kinds: &[EventKind]) -> MonitorResult<EventStream>;
}
