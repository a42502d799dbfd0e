//! stackgrid-monitor — container runtime events and reconciliation.
//!
//! # Architecture
//!
//! ```text
//! ContainerRuntime (trait)
//!   └── DockerRuntime → bollard
//!
//! events() ──► watch() ──► Handlers { start: [..], die: [..] }
//!
//! running_containers() + recorded scaling ──► plan_reconciliation()
//!                                             ├── start per running container
//!                                             └── die per stale replica
//! ```
//!
//! A failed or closed event stream is fatal: state can no longer be kept
//! fresh, so [`watch`] returns an error and the daemon exits.

pub mod docker;
pub mod error;
pub mod event;
pub mod reconcile;
pub mod runtime;
pub mod watch;

pub use docker::DockerRuntime;
pub use error::{MonitorError, MonitorResult};
pub use event::{ComposeLabels, ContainerInfo, EventKind, RuntimeEvent};
pub use reconcile::{RecordedScaling, ReconciliationPlan, plan_reconciliation};
pub use runtime::{ContainerRuntime, EventStream};
pub use watch::{EventHandler, HandlerFuture, Handlers, handler, watch};
