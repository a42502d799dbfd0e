//! Units of work accepted by the scheduler.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// What the worker should do once an action has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep draining the queue.
    Continue,
    /// Deregister this key; anything still queued behind is discarded.
    StopQueue,
}

pub type ActionResult = anyhow::Result<Flow>;

type BoxFuture = Pin<Box<dyn Future<Output = ActionResult> + Send>>;

/// A labelled future queued under a scheduler key.
pub struct Action {
    pub(crate) label: String,
    pub(crate) fut: BoxFuture,
}

impl Action {
    pub fn new<F>(label: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = ActionResult> + Send + 'static,
    {
        Self {
            label: label.into(),
            fut: Box::pin(fut),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("label", &self.label).finish()
    }
}
