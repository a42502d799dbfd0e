//! stackgrid-engine — the reconciliation engine.
//!
//! Two event sources drive the same per-resource state machines: the
//! graph store's change feed and the container runtime's event stream.
//! Every mutation of a pipeline, of its services, or of its project
//! directory is an action on the pipeline's scheduler queue, so at most
//! one runs at a time per pipeline no matter which source asked for it.
//!
//! # Architecture
//!
//! ```text
//! POST /update ─► handle_delta ─► group_by_subject ─┬─► repository_update
//!                                                   ├─► pipeline_update
//!                                                   └─► service_update
//! runtime events ─► event_handlers ─► container_started / container_died
//!                                          │
//!                        ActionScheduler (key = pipeline id)
//!                                          │
//!                    compose / git / projects ─► status written back
//! ```
//!
//! At startup the daemon calls [`Engine::subscribe`], then
//! [`Engine::reconcile`] and [`Engine::replay_pending_triggers`].

pub mod containers;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logs;
pub mod pipelines;
pub mod repositories;
pub mod services;
pub mod startup;

#[cfg(feature = "testing")]
pub mod testing;

pub use engine::{Engine, EngineSettings, PROXY_KEY, compose_project_name};
pub use error::{EngineError, EngineResult};
pub use pipelines::PipelineAction;
pub use services::ServiceAction;
pub use startup::ReconcileSummary;
