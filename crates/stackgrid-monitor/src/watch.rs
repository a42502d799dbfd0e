//! Event stream consumption with per-kind handler lists.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::{MonitorError, MonitorResult};
use crate::event::{EventKind, RuntimeEvent};
use crate::runtime::EventStream;

/// Callback run for every event of the kind it was registered for.
pub type EventHandler = Arc<dyn Fn(RuntimeEvent) -> HandlerFuture + Send + Sync>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Wrap an async function as an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(RuntimeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| -> HandlerFuture { Box::pin(f(event)) })
}

/// Handlers keyed by event kind.
#[derive(Clone, Default)]
pub struct Handlers {
    handlers: HashMap<EventKind, Vec<EventHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, kind: EventKind, handler: EventHandler) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Kinds with at least one handler, for filtering the subscription.
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.handlers.keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }

    /// Run every handler registered for the event's kind, in registration
    /// order. A failing handler is logged and the rest still run.
    pub async fn dispatch(&self, event: RuntimeEvent) {
        let Some(handlers) = self.handlers.get(&event.kind) else {
            return;
        };
        for callback in handlers {
            if let Err(e) = callback(event.clone()).await {
                error!(
                    kind = %event.kind,
                    container = %event.container_id,
                    error = %e,
                    "container event handler failed"
                );
            }
        }
    }
}

/// Consume `stream` until shutdown. Returns `Ok` only on shutdown; a
/// stream error or the stream ending is returned as an error so the
/// caller can stop the process.
pub async fn watch(
    mut stream: EventStream,
    handlers: &Handlers,
    mut shutdown: watch::Receiver<bool>,
) -> MonitorResult<()> {
    info!(kinds = ?handlers.kinds(), "watching container events");
    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    debug!(kind = %event.kind, container = %event.container_id, "container event");
                    handlers.dispatch(event).await;
                }
                Some(Err(e)) => return Err(e),
                None => return Err(MonitorError::StreamClosed),
            },
            _ = shutdown.changed() => {
                info!("container event watch shutting down");
                return Ok(());
            }
        }
    }
}
