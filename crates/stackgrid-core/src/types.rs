//! Shared types used across stackgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vocab;

/// Recorded lifecycle status of a pipeline or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Initializing,
    Down,
    Starting,
    Up,
    Started,
    Stopping,
    Stopped,
    Restarting,
    Scaling,
    Updating,
    Removing,
    Removed,
    Killing,
    Killed,
    Error,
}

impl Status {
    pub const ALL: [Status; 15] = [
        Status::Initializing,
        Status::Down,
        Status::Starting,
        Status::Up,
        Status::Started,
        Status::Stopping,
        Status::Stopped,
        Status::Restarting,
        Status::Scaling,
        Status::Updating,
        Status::Removing,
        Status::Removed,
        Status::Killing,
        Status::Killed,
        Status::Error,
    ];

    /// Local name within the core vocabulary.
    pub fn name(&self) -> &'static str {
        match self {
            Status::Initializing => "Initializing",
            Status::Down => "Down",
            Status::Starting => "Starting",
            Status::Up => "Up",
            Status::Started => "Started",
            Status::Stopping => "Stopping",
            Status::Stopped => "Stopped",
            Status::Restarting => "Restarting",
            Status::Scaling => "Scaling",
            Status::Updating => "Updating",
            Status::Removing => "Removing",
            Status::Removed => "Removed",
            Status::Killing => "Killing",
            Status::Killed => "Killed",
            Status::Error => "Error",
        }
    }

    pub fn iri(&self) -> String {
        format!("{}{}", vocab::SWARMUI, self.name())
    }

    pub fn from_iri(iri: &str) -> Option<Status> {
        let name = iri.strip_prefix(vocab::SWARMUI)?;
        Status::ALL.into_iter().find(|s| s.name() == name)
    }

    /// `Up` and `Started` both mean containers are expected to run.
    pub fn is_started(&self) -> bool {
        matches!(self, Status::Up | Status::Started)
    }

    /// Statuses a container "died" event must not overwrite with `Stopped`.
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            Status::Down | Status::Stopped | Status::Removing | Status::Removed
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A store predicate whose presence requests a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    RequestedStatus,
    RestartRequested,
    DeleteRequested,
    UpdateRequested,
    RequestedScaling,
}

impl Trigger {
    pub const ALL: [Trigger; 5] = [
        Trigger::RequestedStatus,
        Trigger::RestartRequested,
        Trigger::DeleteRequested,
        Trigger::UpdateRequested,
        Trigger::RequestedScaling,
    ];

    pub fn predicate(&self) -> &'static str {
        match self {
            Trigger::RequestedStatus => vocab::REQUESTED_STATUS,
            Trigger::RestartRequested => vocab::RESTART_REQUESTED,
            Trigger::DeleteRequested => vocab::DELETE_REQUESTED,
            Trigger::UpdateRequested => vocab::UPDATE_REQUESTED,
            Trigger::RequestedScaling => vocab::REQUESTED_SCALING,
        }
    }

    pub fn from_predicate(predicate: &str) -> Option<Trigger> {
        Trigger::ALL.into_iter().find(|t| t.predicate() == predicate)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .predicate()
            .strip_prefix(vocab::SWARMUI)
            .unwrap_or(self.predicate());
        f.write_str(name)
    }
}

/// Kind of a managed resource, derived once from its subject IRI.
///
/// Ordered the way groups are dispatched: repositories first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Repository,
    Pipeline,
    Service,
}

impl ResourceKind {
    /// Classify a subject IRI by its prefix under `base`.
    ///
    /// `pipelines/` is accepted as an alias for `pipeline-instances/`.
    pub fn classify(subject: &str, base: &str) -> Option<ResourceKind> {
        let rest = subject.strip_prefix(base)?;
        if rest.starts_with("repositories/") {
            Some(ResourceKind::Repository)
        } else if rest.starts_with("pipeline-instances/") || rest.starts_with("pipelines/") {
            Some(ResourceKind::Pipeline)
        } else if rest.starts_with("services/") {
            Some(ResourceKind::Service)
        } else {
            None
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Repository => "repository",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Service => "service",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = vocab::DEFAULT_BASE_RESOURCE;

    #[test]
    fn status_iri_roundtrip() {
        for status in Status::ALL {
            assert_eq!(Status::from_iri(&status.iri()), Some(status));
        }
        assert_eq!(Status::from_iri("http://example.org/Up"), None);
    }

    #[test]
    fn status_groups() {
        assert!(Status::Up.is_started());
        assert!(Status::Started.is_started());
        assert!(!Status::Starting.is_started());
        assert!(Status::Down.is_stopped());
        assert!(!Status::Error.is_stopped());
    }

    #[test]
    fn trigger_from_predicate() {
        assert_eq!(
            Trigger::from_predicate(vocab::RESTART_REQUESTED),
            Some(Trigger::RestartRequested)
        );
        assert_eq!(Trigger::from_predicate(vocab::STATUS), None);
        assert_eq!(Trigger::RequestedStatus.to_string(), "requestedStatus");
    }

    #[test]
    fn classify_subjects() {
        let repo = format!("{BASE}repositories/abc");
        let pipe = format!("{BASE}pipeline-instances/abc");
        let alias = format!("{BASE}pipelines/abc");
        let svc = format!("{BASE}services/abc");
        assert_eq!(ResourceKind::classify(&repo, BASE), Some(ResourceKind::Repository));
        assert_eq!(ResourceKind::classify(&pipe, BASE), Some(ResourceKind::Pipeline));
        assert_eq!(ResourceKind::classify(&alias, BASE), Some(ResourceKind::Pipeline));
        assert_eq!(ResourceKind::classify(&svc, BASE), Some(ResourceKind::Service));
        assert_eq!(ResourceKind::classify("http://other.org/services/abc", BASE), None);
        assert_eq!(ResourceKind::classify(&format!("{BASE}grants/x"), BASE), None);
    }
}
