//! Test doubles for the engine's collaborators and a harness wiring them
//! to an in-memory store and a temporary projects root.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use serde_json::json;
use stackgrid_compose::{
    CommandOutput, CommandRunner, CommandSpec, Compose, ComposeResult, Git, Projects,
};
use stackgrid_core::{Status, Term, vocab};
use stackgrid_monitor::{
    ComposeLabels, ContainerInfo, ContainerRuntime, EventKind, EventStream, MonitorError,
    MonitorResult, RuntimeEvent,
};
use stackgrid_store::MemoryStore;

use crate::engine::{Engine, EngineSettings};

pub const BASE: &str = "http://stackgrid.test/resources/";
pub const GRAPH: &str = "http://mu.semte.ch/application";

/// Descriptor written into every checkout made by [`ScriptedRunner`].
pub const DEFAULT_DESCRIPTOR: &str = "services:\n  web:\n    image: nginx:1.25\n  db:\n    image: postgres:16\n";

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Records every command and answers from a script instead of spawning.
///
/// `git clone` creates the destination directory with a compose
/// descriptor, so initialization can proceed. Commands whose arguments
/// contain a registered needle fail or time out.
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<String>>,
    descriptor: Mutex<String>,
    stdout: Mutex<String>,
    delay: Mutex<Option<Duration>>,
    hook: Mutex<Option<RunHook>>,
}

type RunHook = Arc<dyn Fn(&CommandSpec) + Send + Sync>;

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            descriptor: Mutex::new(DEFAULT_DESCRIPTOR.to_string()),
            stdout: Mutex::new(String::new()),
            delay: Mutex::new(None),
            hook: Mutex::new(None),
        }
    }
}

impl ScriptedRunner {
    pub fn fail_on(&self, needle: &str) {
        lock(&self.failures).push(needle.to_string());
    }

    pub fn time_out_on(&self, needle: &str) {
        lock(&self.timeouts).push(needle.to_string());
    }

    pub fn set_descriptor(&self, yaml: &str) {
        *lock(&self.descriptor) = yaml.to_string();
    }

    /// Stdout returned by captured commands.
    pub fn set_stdout(&self, text: &str) {
        *lock(&self.stdout) = text.to_string();
    }

    /// Make every command take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Call `hook` with every command before it is answered.
    pub fn on_run(&self, hook: impl Fn(&CommandSpec) + Send + Sync + 'static) {
        *lock(&self.hook) = Some(Arc::new(hook));
    }

    /// Every command run so far, as `"program args.."`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).iter().map(CommandSpec::display).collect()
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: CommandSpec) -> ComposeResult<CommandOutput> {
        lock(&self.calls).push(spec.clone());
        let hook = lock(&self.hook).clone();
        if let Some(hook) = hook {
            hook(&spec);
        }
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let args = spec.args.join(" ");
        if lock(&self.timeouts).iter().any(|n| args.contains(n.as_str())) {
            return Ok(CommandOutput::timeout());
        }
        if lock(&self.failures).iter().any(|n| args.contains(n.as_str())) {
            return Ok(CommandOutput::exited(1));
        }

        if spec.args.first().map(String::as_str) == Some("clone") {
            if let Some(dest) = spec.args.last() {
                let dest = PathBuf::from(dest);
                tokio::fs::create_dir_all(&dest).await?;
                let descriptor = lock(&self.descriptor).clone();
                tokio::fs::write(dest.join("docker-compose.yml"), descriptor).await?;
            }
        }

        let mut output = CommandOutput::exited(0);
        if spec.capture {
            output.stdout = lock(&self.stdout).clone();
        }
        Ok(output)
    }
}

/// In-memory container runtime with an injectable event stream.
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerInfo>>,
    connected: Mutex<Vec<(String, String)>>,
    restarted: Mutex<Vec<String>>,
    removed_images: Mutex<Vec<String>>,
    events_tx: mpsc::UnboundedSender<MonitorResult<RuntimeEvent>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<MonitorResult<RuntimeEvent>>>>,
    reachable: Mutex<bool>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded();
        Self {
            containers: Mutex::new(Vec::new()),
            connected: Mutex::new(Vec::new()),
            restarted: Mutex::new(Vec::new()),
            removed_images: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            reachable: Mutex::new(true),
        }
    }
}

impl FakeRuntime {
    /// Add a running compose container.
    pub fn run_container(&self, id: &str, project: &str, service: &str, number: u32) {
        lock(&self.containers).push(ContainerInfo {
            id: id.to_string(),
            name: format!("{project}_{service}_{number}"),
            image: None,
            labels: ComposeLabels {
                project: project.to_string(),
                service: service.to_string(),
                number,
            }
            .to_labels(),
            networks: vec!["default".to_string()],
        });
    }

    /// Push an event into the stream returned by `events`.
    pub fn emit(&self, kind: EventKind, project: &str, service: &str, number: u32) {
        let labels = ComposeLabels {
            project: project.to_string(),
            service: service.to_string(),
            number,
        };
        let _ = self
            .events_tx
            .unbounded_send(Ok(RuntimeEvent::synthetic(kind, &labels)));
    }

    /// Fail the event stream.
    pub fn break_stream(&self) {
        let _ = self
            .events_tx
            .unbounded_send(Err(MonitorError::Stream("connection reset".into())));
    }

    pub fn set_reachable(&self, reachable: bool) {
        *lock(&self.reachable) = reachable;
    }

    pub fn connected(&self) -> Vec<(String, String)> {
        lock(&self.connected).clone()
    }

    pub fn restarted(&self) -> Vec<String> {
        lock(&self.restarted).clone()
    }

    pub fn removed_images(&self) -> Vec<String> {
        lock(&self.removed_images).clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> MonitorResult<()> {
        if *lock(&self.reachable) {
            Ok(())
        } else {
            Err(MonitorError::Runtime("docker is not reachable".into()))
        }
    }

    async fn running_containers(&self) -> MonitorResult<Vec<ContainerInfo>> {
        Ok(lock(&self.containers).clone())
    }

    async fn project_containers(&self, project: &str) -> MonitorResult<Vec<ContainerInfo>> {
        Ok(lock(&self.containers)
            .iter()
            .filter(|c| c.compose_labels().is_some_and(|l| l.project == project))
            .cloned()
            .collect())
    }

    async fn inspect(&self, container: &str) -> MonitorResult<Option<ContainerInfo>> {
        Ok(lock(&self.containers)
            .iter()
            .find(|c| c.id == container || c.name == container)
            .cloned())
    }

    async fn connect_network(&self, network: &str, container: &str) -> MonitorResult<()> {
        lock(&self.connected).push((network.to_string(), container.to_string()));
        Ok(())
    }

    async fn restart_container(&self, container: &str) -> MonitorResult<()> {
        lock(&self.restarted).push(container.to_string());
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> MonitorResult<()> {
        lock(&self.removed_images).push(image.to_string());
        Ok(())
    }

    async fn events(&self, _kinds: &[EventKind]) -> MonitorResult<EventStream> {
        match lock(&self.events_rx).take() {
            Some(rx) => Ok(rx.boxed()),
            None => Err(MonitorError::Runtime("already subscribed".into())),
        }
    }
}

/// An engine over [`MemoryStore`], [`ScriptedRunner`] and [`FakeRuntime`]
/// with projects under a temporary directory.
pub struct TestEngine {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub runner: Arc<ScriptedRunner>,
    pub runtime: Arc<FakeRuntime>,
    pub root: tempfile::TempDir,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(adjust: impl FnOnce(&mut EngineSettings)) -> Self {
        let mut settings = EngineSettings {
            graph: GRAPH.to_string(),
            base: BASE.to_string(),
            public_network: None,
            proxy_container: None,
            prune_images: false,
        };
        adjust(&mut settings);

        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(ScriptedRunner::default());
        let runtime = Arc::new(FakeRuntime::default());
        let root = match tempfile::tempdir() {
            Ok(root) => root,
            Err(e) => panic!("cannot create projects root: {e}"),
        };

        let timeout = Duration::from_secs(60);
        let engine = Engine::new(
            settings,
            store.clone(),
            runtime.clone(),
            Compose::new(runner.clone(), "docker-compose", timeout, timeout, 1000),
            Git::new(runner.clone(), "git", timeout),
            Projects::new(root.path()),
        );
        Self {
            engine,
            store,
            runner,
            runtime,
            root,
        }
    }

    /// Run every queued action to completion.
    pub async fn settle(&self) {
        self.engine.graceful_shutdown().await;
    }

    pub fn iri(kind: &str, id: &str) -> String {
        format!("{BASE}{kind}/{id}")
    }

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.path().join(id)
    }

    /// Record a repository at `location`; returns its subject.
    pub fn seed_repository(&self, id: &str, location: Option<&str>) -> String {
        let subject = Self::iri("repositories", id);
        self.store.insert(&subject, vocab::MU_UUID, Term::literal(id));
        self.store
            .insert(&subject, vocab::RDF_TYPE, Term::iri(vocab::DOAP_STACK));
        if let Some(location) = location {
            self.store
                .insert(&subject, vocab::DOAP_LOCATION, Term::literal(location));
        }
        subject
    }

    /// Record a pipeline, optionally linked to a repository subject.
    pub fn seed_pipeline(&self, id: &str, repository: Option<&str>, status: Option<Status>) -> String {
        let subject = Self::iri("pipeline-instances", id);
        self.store.insert(&subject, vocab::MU_UUID, Term::literal(id));
        self.store
            .insert(&subject, vocab::RDF_TYPE, Term::iri(vocab::PIPELINE_CLASS));
        if let Some(status) = status {
            self.store
                .insert(&subject, vocab::STATUS, Term::iri(status.iri()));
        }
        if let Some(repository) = repository {
            self.store
                .insert(repository, vocab::PIPELINES, Term::iri(&subject));
        }
        subject
    }

    /// Record a service under a pipeline subject.
    pub fn seed_service(
        &self,
        pipeline: &str,
        id: &str,
        title: &str,
        scaling: u32,
        status: Status,
    ) -> String {
        let subject = Self::iri("services", id);
        self.store.insert(pipeline, vocab::SERVICES, Term::iri(&subject));
        self.store.insert(&subject, vocab::MU_UUID, Term::literal(id));
        self.store
            .insert(&subject, vocab::RDF_TYPE, Term::iri(vocab::SERVICE_CLASS));
        self.store
            .insert(&subject, vocab::DCT_TITLE, Term::literal(title));
        self.store
            .insert(&subject, vocab::SCALING, Term::literal(scaling.to_string()));
        self.store
            .insert(&subject, vocab::STATUS, Term::iri(status.iri()));
        subject
    }

    /// Create an on-disk project for a seeded pipeline.
    pub fn seed_project(&self, id: &str) {
        let dir = self.project_dir(id);
        if let Err(e) = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::write(dir.join("docker-compose.yml"), DEFAULT_DESCRIPTOR))
        {
            panic!("cannot create project {id}: {e}");
        }
    }

    /// Store a trigger on `subject` and dispatch it as a change-feed insert,
    /// the way a client write reaches the engine.
    pub async fn trigger(&self, subject: &str, predicate: &str, object: Term) -> usize {
        self.store.insert(subject, predicate, object.clone());
        let body = delta_body(GRAPH, &[(subject, predicate, &object)], &[]);
        match self.engine.handle_delta(body.as_bytes()).await {
            Ok(groups) => groups,
            Err(e) => panic!("delta rejected: {e}"),
        }
    }

    pub fn status(&self, subject: &str) -> Option<Status> {
        self.store
            .value(subject, vocab::STATUS)
            .and_then(|t| t.as_iri().and_then(Status::from_iri))
    }

    pub fn scaling(&self, subject: &str) -> Option<u32> {
        self.store
            .value(subject, vocab::SCALING)
            .and_then(|t| t.value().parse().ok())
    }

    /// Services recorded under a pipeline, keyed by title.
    pub fn services_by_title(&self, pipeline: &str) -> HashMap<String, String> {
        self.store
            .objects(pipeline, vocab::SERVICES)
            .iter()
            .filter_map(|o| {
                let subject = o.as_iri()?.to_string();
                let title = self.store.value(&subject, vocab::DCT_TITLE)?;
                Some((title.value().to_string(), subject))
            })
            .collect()
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON change-feed body with one batch for `graph`.
pub fn delta_body(
    graph: &str,
    inserts: &[(&str, &str, &Term)],
    deletes: &[(&str, &str, &Term)],
) -> String {
    let triple = |(s, p, o): &(&str, &str, &Term)| {
        let object = match o {
            Term::Iri(v) => json!({ "type": "uri", "value": v }),
            Term::Literal(v) => json!({ "type": "literal", "value": v }),
        };
        json!({
            "s": { "type": "uri", "value": s },
            "p": { "type": "uri", "value": p },
            "o": object,
        })
    };
    json!({
        "delta": [{
            "graph": graph,
            "inserts": inserts.iter().map(triple).collect::<Vec<_>>(),
            "deletes": deletes.iter().map(triple).collect::<Vec<_>>(),
        }]
    })
    .to_string()
}
