//! The `ResourceStore` trait: every read and write the engine performs.
//!
//! Resources are addressed by their `mu:uuid` unless a method says it takes
//! a subject IRI. Writes are delete-then-insert under a `WHERE` clause so
//! concurrent writers converge.

use async_trait::async_trait;
use stackgrid_core::{Status, Term, Trigger, Triple};

use crate::error::StoreResult;
use crate::types::{NewService, RepositorySource, RunningService, ScalingBound, ServiceRecord};

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Cheap round trip used for readiness probing.
    async fn ping(&self) -> StoreResult<()>;

    /// `mu:uuid` of a subject.
    async fn resource_id(&self, subject: &str) -> StoreResult<Option<String>>;

    /// Subject carrying the given `mu:uuid`.
    async fn subject_of(&self, uuid: &str) -> StoreResult<Option<String>>;

    async fn set_status(&self, uuid: &str, status: Status) -> StoreResult<()>;

    /// Set `status` unless the current status is one of `unless`.
    async fn set_status_unless(
        &self,
        uuid: &str,
        status: Status,
        unless: &[Status],
    ) -> StoreResult<()>;

    /// Current values of a trigger predicate on a resource.
    async fn trigger_values(&self, uuid: &str, trigger: Trigger) -> StoreResult<Vec<Term>>;

    /// Remove every value of a trigger predicate.
    async fn clear_trigger(&self, uuid: &str, trigger: Trigger) -> StoreResult<()>;

    async fn title(&self, uuid: &str) -> StoreResult<Option<String>>;

    /// uuid of the pipeline owning a service.
    async fn service_pipeline(&self, service_uuid: &str) -> StoreResult<Option<String>>;

    /// Location and branch of a repository, by subject.
    async fn repository_source(&self, repository: &str) -> StoreResult<RepositorySource>;

    /// Subject of the repository a pipeline belongs to.
    async fn repository_of_pipeline(&self, pipeline_uuid: &str) -> StoreResult<Option<String>>;

    /// uuids of the pipelines of a repository.
    async fn repository_pipelines(&self, repository_uuid: &str) -> StoreResult<Vec<String>>;

    /// True iff no other pipeline references the same repository.
    async fn is_last_pipeline(&self, pipeline_uuid: &str) -> StoreResult<bool>;

    /// Insert service records (stopped, scaling 0) linked to a pipeline.
    async fn insert_services(&self, pipeline: &str, services: &[NewService]) -> StoreResult<()>;

    async fn pipeline_services(&self, pipeline_uuid: &str) -> StoreResult<Vec<ServiceRecord>>;

    async fn set_scaling(&self, uuid: &str, scaling: u32) -> StoreResult<()>;

    /// Clamp the recorded scaling and return the resulting value.
    async fn adjust_scaling(&self, uuid: &str, bound: ScalingBound) -> StoreResult<u32>;

    /// Delete every triple with `subject` as subject or object.
    async fn delete_resource(&self, subject: &str) -> StoreResult<()>;

    /// Pipeline uuid matching a compose project name (case-insensitive).
    async fn pipeline_by_project(&self, project: &str) -> StoreResult<Option<String>>;

    /// uuid of the service titled `title` within a pipeline.
    async fn service_by_title(&self, pipeline_uuid: &str, title: &str)
    -> StoreResult<Option<String>>;

    /// Trigger triples still set in the store, plus `pipelines` links to
    /// pipelines that were never initialized.
    async fn pending_triggers(&self) -> StoreResult<Vec<Triple>>;

    /// Services recorded as `Up` or `Started`.
    async fn running_services(&self) -> StoreResult<Vec<RunningService>>;
}
