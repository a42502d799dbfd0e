//! stackgrid-scheduler — per-key serialized action queues.
//!
//! Every mutation of a pipeline (and its services) goes through one
//! `ActionScheduler` keyed by the pipeline id, so two actions touching the
//! same compose project never overlap. Different keys run concurrently.
//!
//! # Architecture
//!
//! ```text
//! ActionScheduler
//!   └── registry: key → Executor
//!       ├── FIFO channel of Actions
//!       ├── worker task (one action at a time)
//!       └── queue state (queued / running / stopped)
//! ```
//!
//! An action returns `Flow::StopQueue` to tear its own queue down, e.g.
//! after the resource it serves has been deleted. Failures and panics are
//! logged by the worker and never stop the queue.

pub mod action;
pub mod scheduler;

pub use action::{Action, ActionResult, Flow};
pub use scheduler::ActionScheduler;
