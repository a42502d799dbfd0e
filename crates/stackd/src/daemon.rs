//! Daemon assembly and lifecycle.
//!
//! Startup order:
//! 1. Wait for the graph store, with backoff
//! 2. Ping the container runtime
//! 3. Subscribe to container events and start watching
//! 4. Reconcile recorded scaling with the running containers
//! 5. Replay triggers left unresolved by a previous run
//! 6. Serve the HTTP API until ctrl-c or a fatal event-stream error

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use stackgrid_compose::{CommandRunner, Compose, Git, ProcessRunner, Projects};
use stackgrid_core::StackConfig;
use stackgrid_engine::{Engine, EngineSettings};
use stackgrid_monitor::{ContainerRuntime, DockerRuntime, MonitorResult};
use stackgrid_store::{ResourceStore, SparqlClient, SparqlStore, wait_until_ready};
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info};

enum Exit {
    Signal(std::io::Result<()>),
    Server(Result<std::io::Result<()>, JoinError>),
    Watcher(Result<MonitorResult<()>, JoinError>),
}

/// Run the daemon until shutdown.
pub async fn run(config: StackConfig, port: u16) -> anyhow::Result<()> {
    info!(
        endpoint = %config.store.endpoint,
        graph = %config.store.graph,
        root = ?config.projects.root,
        "StackGrid daemon starting"
    );

    // ── Graph store ────────────────────────────────────────────

    let client = SparqlClient::new(&config.store.endpoint, config.store.request_timeout()?)?;
    let store: Arc<dyn ResourceStore> = Arc::new(SparqlStore::new(client, &config.store.graph));
    wait_until_ready(
        store.as_ref(),
        config.store.ready_attempts,
        config.store.ready_backoff()?,
    )
    .await
    .context("graph store did not become ready")?;

    // ── Container runtime ──────────────────────────────────────

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect()?);
    runtime
        .ping()
        .await
        .context("container runtime is not reachable")?;
    info!("container runtime reachable");

    // ── Engine ─────────────────────────────────────────────────

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let timeout = config.commands.timeout()?;
    let compose = Compose::new(
        runner.clone(),
        &config.commands.compose,
        timeout,
        config.commands.up_timeout()?,
        config.commands.log_tail,
    );
    let git = Git::new(runner, &config.commands.git, timeout);
    let projects = Projects::new(config.projects.root.clone());
    let engine = Engine::new(
        EngineSettings::from_config(&config),
        store,
        runtime,
        compose,
        git,
        projects,
    );

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let events = engine.subscribe().await?;
    let handlers = engine.event_handlers();
    let watch_shutdown = shutdown_rx.clone();
    let mut watcher = tokio::spawn(async move {
        stackgrid_monitor::watch(events, &handlers, watch_shutdown).await
    });

    let summary = engine.reconcile().await?;
    info!(
        started = summary.started,
        died = summary.died,
        "reconciliation queued"
    );
    let replayed = engine.replay_pending_triggers().await?;
    info!(groups = replayed, "pending triggers replayed");

    // ── API server ─────────────────────────────────────────────

    let router = stackgrid_api::build_router(engine.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    let mut server_shutdown = shutdown_rx;
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => Exit::Signal(signal),
        served = &mut server => Exit::Server(served),
        watched = &mut watcher => Exit::Watcher(watched),
    };
    let _ = shutdown_tx.send(true);

    let (served, watched) = match exit {
        Exit::Signal(signal) => {
            match signal {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(error = %e, "cannot listen for shutdown signal"),
            }
            (server.await, watcher.await)
        }
        Exit::Server(served) => {
            error!("API server stopped unexpectedly");
            (served, watcher.await)
        }
        Exit::Watcher(watched) => (server.await, watched),
    };

    engine.graceful_shutdown().await;

    served?.context("API server failed")?;
    watched?.context("container event stream failed")?;
    info!("StackGrid daemon stopped");
    Ok(())
}
