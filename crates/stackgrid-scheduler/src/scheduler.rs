//! Action scheduler: one FIFO queue and one worker per key.
//!
//! `enqueue` creates the key's worker on demand. `cancel` is a flush: it
//! waits until every queued action has run and then tears the worker down.
//! The single-slot flavour coalesces bursts by refusing a new action while
//! another one is still waiting to start.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::{Action, Flow};

#[derive(Debug, Clone, Copy, Default)]
struct QueueState {
    /// Actions sent to the worker but not yet started.
    queued: usize,
    running: bool,
    stopped: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.stopped || (self.queued == 0 && !self.running)
    }
}

/// Per-key worker bookkeeping.
struct Executor {
    tx: mpsc::UnboundedSender<Action>,
    handle: JoinHandle<()>,
    /// Distinguishes a recreated queue from the one a worker was spawned for.
    generation: u64,
    state: Arc<watch::Sender<QueueState>>,
}

type Registry = Arc<Mutex<HashMap<String, Executor>>>;

/// Per-key serialized task queues.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ActionScheduler {
    registry: Registry,
    generations: Arc<AtomicU64>,
    single_slot: bool,
}

impl Default for ActionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            single_slot: false,
        }
    }

    /// A scheduler whose queues hold at most one unstarted action.
    pub fn single_slot() -> Self {
        Self {
            single_slot: true,
            ..Self::new()
        }
    }

    /// Queue `action` under `key`.
    ///
    /// Returns `false` only when a single-slot queue already holds a
    /// waiting action and the new one was dropped.
    pub async fn enqueue(&self, key: &str, action: Action) -> bool {
        let mut registry = self.registry.lock().await;

        let action = match registry.get(key) {
            Some(executor) if !executor.state.borrow().stopped => {
                if self.single_slot && executor.state.borrow().queued > 0 {
                    debug!(%key, action = %action.label, "queue slot taken, dropping action");
                    return false;
                }
                executor.state.send_modify(|s| s.queued += 1);
                match executor.tx.send(action) {
                    Ok(()) => return true,
                    Err(mpsc::error::SendError(returned)) => {
                        executor.state.send_modify(|s| s.queued -= 1);
                        warn!(%key, "worker gone, recreating queue");
                        returned
                    }
                }
            }
            _ => action,
        };

        let executor = self.spawn_executor(key);
        executor.state.send_modify(|s| s.queued += 1);
        let _ = executor.tx.send(action);
        registry.insert(key.to_string(), executor);
        true
    }

    fn spawn_executor(&self, key: &str) -> Executor {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(watch::Sender::new(QueueState::default()));
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(run_worker(
            key.to_string(),
            generation,
            rx,
            state.clone(),
            self.registry.clone(),
        ));

        debug!(%key, generation, "queue worker started");
        Executor {
            tx,
            handle,
            generation,
            state,
        }
    }

    /// Wait for `key`'s queue to drain, then stop and remove its worker.
    ///
    /// Returns immediately when the key has no queue.
    pub async fn cancel(&self, key: &str) {
        loop {
            let (mut state, generation) = {
                let registry = self.registry.lock().await;
                match registry.get(key) {
                    Some(executor) => (executor.state.subscribe(), executor.generation),
                    None => return,
                }
            };

            let _ = state.wait_for(QueueState::is_drained).await;

            let removed = {
                let mut registry = self.registry.lock().await;
                let drained = registry.get(key).map(|executor| {
                    executor.generation == generation && executor.state.borrow().is_drained()
                });
                match drained {
                    None => return,
                    Some(true) => registry.remove(key),
                    // Work arrived (or the queue was recreated) meanwhile.
                    Some(false) => None,
                }
            };

            if let Some(executor) = removed {
                drop(executor.tx);
                if let Err(e) = executor.handle.await {
                    error!(%key, error = %e, "queue worker ended abnormally");
                }
                debug!(%key, "queue cancelled");
                return;
            }
        }
    }

    /// Drain and remove every live queue.
    pub async fn graceful_shutdown(&self) {
        loop {
            let keys = self.live_keys().await;
            if keys.is_empty() {
                break;
            }
            info!(queues = keys.len(), "draining action queues");
            for key in keys {
                self.cancel(&key).await;
            }
        }
        info!("all action queues drained");
    }

    pub async fn live_keys(&self) -> Vec<String> {
        let registry = self.registry.lock().await;
        registry.keys().cloned().collect()
    }

    pub async fn is_live(&self, key: &str) -> bool {
        let registry = self.registry.lock().await;
        registry.contains_key(key)
    }
}

/// Drain one key's queue until its sender is dropped or an action stops it.
async fn run_worker(
    key: String,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Action>,
    state: Arc<watch::Sender<QueueState>>,
    registry: Registry,
) {
    while let Some(action) = rx.recv().await {
        state.send_modify(|s| {
            s.queued = s.queued.saturating_sub(1);
            s.running = true;
        });

        let label = action.label;
        debug!(%key, action = %label, "action starting");

        let flow = match tokio::spawn(action.fut).await {
            Ok(Ok(flow)) => flow,
            Ok(Err(e)) => {
                error!(%key, action = %label, error = format!("{e:#}"), "action failed");
                Flow::Continue
            }
            Err(e) => {
                error!(%key, action = %label, error = %e, "action panicked");
                Flow::Continue
            }
        };

        if flow == Flow::StopQueue {
            {
                let mut registry = registry.lock().await;
                if registry
                    .get(&key)
                    .is_some_and(|executor| executor.generation == generation)
                {
                    registry.remove(&key);
                }
            }
            state.send_modify(|s| {
                s.running = false;
                s.stopped = true;
            });
            info!(%key, action = %label, "queue stopped by action");
            return;
        }

        state.send_modify(|s| s.running = false);
        debug!(%key, action = %label, "action finished");
    }

    state.send_modify(|s| s.stopped = true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Log = Arc<std::sync::Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(std::sync::Mutex::new(Vec::new()))
    }

    fn record(log: &Log, entry: &str) -> Action {
        let log = log.clone();
        let entry = entry.to_string();
        Action::new(entry.clone(), async move {
            log.lock().unwrap().push(entry);
            Ok(Flow::Continue)
        })
    }

    #[tokio::test]
    async fn same_key_runs_in_order_one_at_a_time() {
        let scheduler = ActionScheduler::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..10u64 {
            let order = order.clone();
            let active = active.clone();
            let peak = peak.clone();
            let action = Action::new(format!("step-{i}"), async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                order.lock().unwrap().push(i);
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(Flow::Continue)
            });
            assert!(scheduler.enqueue("pipeline-1", action).await);
        }

        scheduler.graceful_shutdown().await;

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let scheduler = ActionScheduler::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        for key in ["a", "b"] {
            let barrier = barrier.clone();
            scheduler
                .enqueue(
                    key,
                    Action::new("meet", async move {
                        barrier.wait().await;
                        Ok(Flow::Continue)
                    }),
                )
                .await;
        }

        tokio::time::timeout(Duration::from_secs(5), scheduler.graceful_shutdown())
            .await
            .expect("keys should not block each other");
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_queue() {
        let scheduler = ActionScheduler::new();
        let log = log();

        scheduler
            .enqueue("k", Action::new("fails", async { anyhow::bail!("boom") }))
            .await;
        scheduler
            .enqueue(
                "k",
                Action::new("panics", async {
                    if true {
                        panic!("unexpected");
                    }
                    Ok(Flow::Continue)
                }),
            )
            .await;
        scheduler.enqueue("k", record(&log, "after")).await;

        assert!(scheduler.is_live("k").await);
        scheduler.cancel("k").await;

        assert_eq!(*log.lock().unwrap(), vec!["after".to_string()]);
        assert!(!scheduler.is_live("k").await);
    }

    #[tokio::test]
    async fn stop_signal_removes_key_and_discards_the_rest() {
        let scheduler = ActionScheduler::new();
        let log = log();
        let gate = Arc::new(Notify::new());

        let g = gate.clone();
        let l = log.clone();
        scheduler
            .enqueue(
                "k",
                Action::new("delete", async move {
                    g.notified().await;
                    l.lock().unwrap().push("delete".to_string());
                    Ok(Flow::StopQueue)
                }),
            )
            .await;
        scheduler.enqueue("k", record(&log, "behind")).await;

        gate.notify_one();
        scheduler.cancel("k").await;

        assert_eq!(*log.lock().unwrap(), vec!["delete".to_string()]);
        assert!(!scheduler.is_live("k").await);

        // A fresh enqueue recreates the queue.
        scheduler.enqueue("k", record(&log, "again")).await;
        scheduler.cancel("k").await;
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("again"));
    }

    #[tokio::test]
    async fn cancel_flushes_queued_work() {
        let scheduler = ActionScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let count = count.clone();
            scheduler
                .enqueue(
                    "k",
                    Action::new("tick", async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(Flow::Continue)
                    }),
                )
                .await;
        }

        scheduler.cancel("k").await;
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(scheduler.live_keys().await.is_empty());

        // Unknown keys are a no-op.
        scheduler.cancel("missing").await;
    }

    #[tokio::test]
    async fn graceful_shutdown_leaves_no_live_keys() {
        let scheduler = ActionScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        for key in ["p1", "p2", "p3"] {
            for _ in 0..3 {
                let count = count.clone();
                scheduler
                    .enqueue(
                        key,
                        Action::new("tick", async move {
                            tokio::task::yield_now().await;
                            count.fetch_add(1, Ordering::SeqCst);
                            Ok(Flow::Continue)
                        }),
                    )
                    .await;
            }
        }

        scheduler.graceful_shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 9);
        assert!(scheduler.live_keys().await.is_empty());
    }

    #[tokio::test]
    async fn single_slot_drops_while_one_is_waiting() {
        let scheduler = ActionScheduler::single_slot();
        let log = log();
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());

        let (s, g, l) = (started.clone(), gate.clone(), log.clone());
        assert!(
            scheduler
                .enqueue(
                    "proxy",
                    Action::new("first", async move {
                        s.notify_one();
                        g.notified().await;
                        l.lock().unwrap().push("first".to_string());
                        Ok(Flow::Continue)
                    }),
                )
                .await
        );
        started.notified().await;

        assert!(scheduler.enqueue("proxy", record(&log, "second")).await);
        assert!(!scheduler.enqueue("proxy", record(&log, "third")).await);

        gate.notify_one();
        scheduler.cancel("proxy").await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );

        assert!(scheduler.enqueue("proxy", record(&log, "fourth")).await);
        scheduler.cancel("proxy").await;
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn single_slot_burst_keeps_only_the_first() {
        let scheduler = ActionScheduler::single_slot();
        let log = log();

        assert!(scheduler.enqueue("proxy", record(&log, "foo")).await);
        assert!(!scheduler.enqueue("proxy", record(&log, "bar")).await);
        assert!(!scheduler.enqueue("proxy", record(&log, "baz")).await);

        scheduler.cancel("proxy").await;
        assert_eq!(*log.lock().unwrap(), vec!["foo".to_string()]);
    }
}
