//! Runtime events and the compose labels carried by containers.

use std::collections::HashMap;
use std::fmt;

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
pub const NUMBER_LABEL: &str = "com.docker.compose.container-number";

/// Container lifecycle event type, as named by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Die,
    Other(String),
}

impl EventKind {
    pub fn parse(action: &str) -> Self {
        match action {
            "start" => EventKind::Start,
            "die" => EventKind::Die,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Start => "start",
            EventKind::Die => "die",
            EventKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compose identity of a container: which project and service it belongs
/// to, and its replica ordinal within the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeLabels {
    pub project: String,
    pub service: String,
    pub number: u32,
}

impl ComposeLabels {
    /// `None` for containers not started by compose. A missing or garbled
    /// container number counts as the first replica.
    pub fn from_labels(labels: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            project: labels.get(PROJECT_LABEL)?.clone(),
            service: labels.get(SERVICE_LABEL)?.clone(),
            number: labels
                .get(NUMBER_LABEL)
                .and_then(|n| n.parse().ok())
                .unwrap_or(1),
        })
    }

    pub fn to_labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (PROJECT_LABEL.to_string(), self.project.clone()),
            (SERVICE_LABEL.to_string(), self.service.clone()),
            (NUMBER_LABEL.to_string(), self.number.to_string()),
        ])
    }
}

/// One event from the runtime's stream, or synthesised at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub kind: EventKind,
    pub container_id: String,
    pub attributes: HashMap<String, String>,
}

impl RuntimeEvent {
    pub fn new(kind: EventKind, container_id: impl Into<String>, attributes: HashMap<String, String>) -> Self {
        Self {
            kind,
            container_id: container_id.into(),
            attributes,
        }
    }

    /// Synthetic event for a compose replica.
    pub fn synthetic(kind: EventKind, labels: &ComposeLabels) -> Self {
        Self::new(kind, String::new(), labels.to_labels())
    }

    pub fn compose_labels(&self) -> Option<ComposeLabels> {
        ComposeLabels::from_labels(&self.attributes)
    }
}

/// A running container as listed by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub labels: HashMap<String, String>,
    pub networks: Vec<String>,
}

impl ContainerInfo {
    pub fn compose_labels(&self) -> Option<ComposeLabels> {
        ComposeLabels::from_labels(&self.labels)
    }
}
