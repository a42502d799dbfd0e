//! End-to-end engine scenarios over the in-memory store, a scripted
//! command runner, and a fake container runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use stackgrid_core::{Status, Term, vocab};
use stackgrid_engine::EngineError;
use stackgrid_engine::testing::{GRAPH, TestEngine, delta_body};
use stackgrid_monitor::EventKind;
use stackgrid_scheduler::{Action, Flow};
use tokio::sync::{Notify, watch};

const LOCATION: &str = "https://git.example.org/stacks/app.git";

/// Record `(command, status of subject)` for every command run.
fn status_log(t: &TestEngine, subject: &str) -> Arc<Mutex<Vec<(String, Option<Status>)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (store, subject, seen) = (t.store.clone(), subject.to_string(), log.clone());
    t.runner.on_run(move |spec| {
        let status = store
            .value(&subject, vocab::STATUS)
            .and_then(|o| o.as_iri().and_then(Status::from_iri));
        let verb = spec.args.first().cloned().unwrap_or_default();
        seen.lock().unwrap().push((verb, status));
    });
    log
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn flag() -> Term {
    Term::literal("true")
}

#[tokio::test]
async fn pipeline_lifecycle() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", Some(LOCATION));
    let pipeline = t.seed_pipeline("p1", None, None);
    let log = status_log(&t, &pipeline);

    // Linking the pipeline to its repository initializes it.
    t.trigger(&repo, vocab::PIPELINES, Term::iri(&pipeline)).await;
    t.settle().await;

    assert_eq!(t.status(&pipeline), Some(Status::Down));
    assert!(t.project_dir("p1").join("docker-compose.yml").exists());
    let dir = t.project_dir("p1");
    assert!(t.runner.calls().contains(&format!(
        "git clone --branch master {LOCATION} {}",
        dir.display()
    )));
    let services = t.services_by_title(&pipeline);
    assert_eq!(services.len(), 2);
    for subject in services.values() {
        assert_eq!(t.status(subject), Some(Status::Stopped));
        assert_eq!(t.scaling(subject), Some(0));
    }

    t.trigger(&pipeline, vocab::REQUESTED_STATUS, Term::iri(Status::Up.iri()))
        .await;
    t.settle().await;
    assert_eq!(t.status(&pipeline), Some(Status::Up));
    assert!(t.store.value(&pipeline, vocab::REQUESTED_STATUS).is_none());

    t.trigger(&pipeline, vocab::RESTART_REQUESTED, flag()).await;
    t.settle().await;
    assert_eq!(t.status(&pipeline), Some(Status::Started));
    assert!(t.store.value(&pipeline, vocab::RESTART_REQUESTED).is_none());

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("clone".to_string(), Some(Status::Initializing)),
            ("up".to_string(), Some(Status::Starting)),
            ("restart".to_string(), Some(Status::Restarting)),
        ]
    );

    t.trigger(&pipeline, vocab::DELETE_REQUESTED, flag()).await;
    t.settle().await;
    assert!(!dir.exists());
    assert!(!t.store.mentions(&pipeline));
    for subject in services.values() {
        assert!(t.store.describe(subject).is_empty());
    }
    assert!(t.store.objects(&repo, vocab::PIPELINES).is_empty());
    assert!(!t.engine.scheduler().is_live("p1").await);
}

#[tokio::test]
async fn failed_checkout_leaves_nothing_behind() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", Some(LOCATION));
    let pipeline = t.seed_pipeline("p1", None, None);
    t.runner.fail_on("clone");

    t.trigger(&repo, vocab::PIPELINES, Term::iri(&pipeline)).await;
    t.settle().await;

    assert_eq!(t.status(&pipeline), Some(Status::Error));
    assert!(!t.project_dir("p1").exists());
    assert!(t.services_by_title(&pipeline).is_empty());
}

#[tokio::test]
async fn repository_without_location_fails_immediately() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", None);
    let pipeline = t.seed_pipeline("p1", None, None);

    t.trigger(&repo, vocab::PIPELINES, Term::iri(&pipeline)).await;
    t.settle().await;

    assert_eq!(t.status(&pipeline), Some(Status::Error));
    assert!(t.runner.calls().is_empty());
}

#[tokio::test]
async fn command_failures_and_timeouts_end_in_error() {
    let t = TestEngine::new();
    let p1 = t.seed_pipeline("p1", None, Some(Status::Down));
    let p2 = t.seed_pipeline("p2", None, Some(Status::Up));
    t.seed_project("p1");
    t.seed_project("p2");
    t.runner.fail_on("up -d");
    t.runner.time_out_on("stop");

    t.trigger(&p1, vocab::REQUESTED_STATUS, Term::iri(Status::Up.iri()))
        .await;
    t.trigger(&p2, vocab::REQUESTED_STATUS, Term::iri(Status::Stopped.iri()))
        .await;
    t.settle().await;

    assert_eq!(t.status(&p1), Some(Status::Error));
    assert_eq!(t.status(&p2), Some(Status::Error));
}

#[tokio::test]
async fn unusable_project_id_ends_in_error() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p 1", None, Some(Status::Down));

    t.trigger(&pipeline, vocab::REQUESTED_STATUS, Term::iri(Status::Up.iri()))
        .await;
    t.settle().await;

    assert_eq!(t.status(&pipeline), Some(Status::Error));
    assert!(t.runner.calls().is_empty());
}

#[tokio::test]
async fn initializing_an_unusable_project_id_ends_in_error() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", Some(LOCATION));
    let pipeline = t.seed_pipeline("p 1", None, None);

    t.trigger(&repo, vocab::PIPELINES, Term::iri(&pipeline)).await;
    t.settle().await;

    assert_eq!(t.status(&pipeline), Some(Status::Error));
    assert!(t.runner.calls().is_empty());
    assert!(t.services_by_title(&pipeline).is_empty());
}

#[tokio::test]
async fn failing_group_does_not_abort_the_batch() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    t.seed_project("p1");
    let service = t.seed_service(&pipeline, "s1", "web", 1, Status::Stopped);
    t.store.fail_lookups_of(&pipeline);

    let up = Term::iri(Status::Up.iri());
    let started = Term::iri(Status::Started.iri());
    t.store.insert(&pipeline, vocab::REQUESTED_STATUS, up.clone());
    t.store.insert(&service, vocab::REQUESTED_STATUS, started.clone());
    let body = delta_body(
        GRAPH,
        &[
            (&pipeline, vocab::REQUESTED_STATUS, &up),
            (&service, vocab::REQUESTED_STATUS, &started),
        ],
        &[],
    );
    let dispatched = t.engine.handle_delta(body.as_bytes()).await.unwrap();
    t.settle().await;

    assert_eq!(dispatched, 1);
    assert_eq!(t.status(&service), Some(Status::Started));
    assert_eq!(t.status(&pipeline), Some(Status::Down));
    assert_eq!(t.runner.calls(), vec!["docker-compose start web"]);
}

#[tokio::test]
async fn redelivered_trigger_runs_once() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    t.seed_project("p1");

    t.trigger(&pipeline, vocab::RESTART_REQUESTED, flag()).await;
    let body = delta_body(GRAPH, &[(&pipeline, vocab::RESTART_REQUESTED, &flag())], &[]);
    t.engine.handle_delta(body.as_bytes()).await.unwrap();
    t.settle().await;

    let restarts = t
        .runner
        .calls()
        .iter()
        .filter(|c| c.ends_with("restart"))
        .count();
    assert_eq!(restarts, 1);
}

#[tokio::test]
async fn only_the_first_pipeline_trigger_of_a_batch_acts() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    t.seed_project("p1");
    let up = Term::iri(Status::Up.iri());
    t.store.insert(&pipeline, vocab::REQUESTED_STATUS, up.clone());
    t.store.insert(&pipeline, vocab::RESTART_REQUESTED, flag());

    let body = delta_body(
        GRAPH,
        &[
            (&pipeline, vocab::REQUESTED_STATUS, &up),
            (&pipeline, vocab::RESTART_REQUESTED, &flag()),
        ],
        &[],
    );
    t.engine.handle_delta(body.as_bytes()).await.unwrap();
    t.settle().await;

    assert_eq!(t.runner.calls(), vec!["docker-compose up -d".to_string()]);
    assert_eq!(t.status(&pipeline), Some(Status::Up));
}

#[tokio::test]
async fn update_resyncs_services_with_the_descriptor() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", Some(LOCATION));
    t.store.insert(&repo, vocab::BRANCH, Term::literal("prod"));
    let pipeline = t.seed_pipeline("p1", Some(&repo), Some(Status::Up));
    t.seed_project("p1");
    let web = t.seed_service(&pipeline, "s-web", "web", 1, Status::Started);
    let db = t.seed_service(&pipeline, "s-db", "db", 1, Status::Started);
    std::fs::write(
        t.project_dir("p1").join("docker-compose.yml"),
        "services:\n  web:\n    image: nginx:1.27\n  worker:\n    build: .\n",
    )
    .unwrap();

    t.trigger(&pipeline, vocab::UPDATE_REQUESTED, flag()).await;
    t.settle().await;

    assert_eq!(t.status(&pipeline), Some(Status::Up));
    let services = t.services_by_title(&pipeline);
    assert_eq!(services.len(), 2);
    assert_eq!(services["web"], web);
    assert!(!t.store.mentions(&db));
    assert_eq!(t.status(&services["worker"]), Some(Status::Stopped));
    assert_eq!(
        t.runner.calls(),
        vec![
            "git fetch origin",
            "git reset --hard origin/prod",
            "docker-compose pull",
            "docker-compose up -d",
        ]
    );
}

#[tokio::test]
async fn up_joins_the_public_network_and_restarts_the_proxy() {
    let t = TestEngine::with_settings(|s| {
        s.public_network = Some("public".to_string());
        s.proxy_container = Some("proxy".to_string());
    });
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    t.seed_project("p1");
    t.runtime.run_container("c1", "p1", "web", 1);
    t.runtime.run_container("c2", "other", "web", 1);

    t.trigger(&pipeline, vocab::REQUESTED_STATUS, Term::iri(Status::Up.iri()))
        .await;
    t.settle().await;

    assert_eq!(
        t.runtime.connected(),
        vec![("public".to_string(), "c1".to_string())]
    );
    assert_eq!(t.runtime.restarted(), vec!["proxy".to_string()]);
}

#[tokio::test]
async fn deleting_the_last_pipeline_prunes_images() {
    let t = TestEngine::with_settings(|s| s.prune_images = true);
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    t.seed_project("p1");

    t.trigger(&pipeline, vocab::DELETE_REQUESTED, flag()).await;
    t.settle().await;

    let mut images = t.runtime.removed_images();
    images.sort();
    assert_eq!(images, ["nginx:1.25", "postgres:16"]);
    assert!(!t.project_dir("p1").exists());
}

#[tokio::test]
async fn removed_pipeline_record_cleans_up_the_project() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    t.seed_project("p1");

    let body = delta_body(
        GRAPH,
        &[],
        &[(&pipeline, vocab::MU_UUID, &Term::literal("p1"))],
    );
    t.engine.handle_delta(body.as_bytes()).await.unwrap();
    t.settle().await;

    assert!(!t.project_dir("p1").exists());
    assert_eq!(t.runner.calls(), vec!["docker-compose down".to_string()]);
}

#[tokio::test]
async fn unlinked_service_loses_its_triples() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    let service = t.seed_service(&pipeline, "s1", "web", 1, Status::Started);
    t.store
        .remove(&pipeline, vocab::SERVICES, &Term::iri(&service));

    let body = delta_body(
        GRAPH,
        &[],
        &[(&pipeline, vocab::SERVICES, &Term::iri(&service))],
    );
    t.engine.handle_delta(body.as_bytes()).await.unwrap();

    assert!(t.store.describe(&service).is_empty());
}

#[tokio::test]
async fn repository_delete_waits_for_pipeline_queues() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", Some(LOCATION));
    let p1 = t.seed_pipeline("p1", Some(&repo), Some(Status::Up));
    let p2 = t.seed_pipeline("p2", Some(&repo), Some(Status::Down));
    t.seed_project("p1");
    t.seed_project("p2");

    // Hold p1's queue so its delete cannot finish yet.
    let gate = Arc::new(Notify::new());
    let held = gate.clone();
    t.engine
        .scheduler()
        .enqueue(
            "p1",
            Action::new("hold", async move {
                held.notified().await;
                Ok(Flow::Continue)
            }),
        )
        .await;

    t.trigger(&repo, vocab::DELETE_REQUESTED, flag()).await;
    eventually("p2 delete", || !t.project_dir("p2").exists()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(t.store.value(&repo, vocab::MU_UUID).is_some());
    assert!(t.project_dir("p1").exists());

    gate.notify_one();
    t.settle().await;

    assert!(!t.store.mentions(&repo));
    assert!(!t.store.mentions(&p1));
    assert!(!t.store.mentions(&p2));
    assert!(!t.project_dir("p1").exists());
    assert!(t.engine.scheduler().live_keys().await.is_empty());
}

#[tokio::test]
async fn service_scaling_and_status_requests() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    t.seed_project("p1");
    let service = t.seed_service(&pipeline, "s1", "web", 1, Status::Started);
    let log = status_log(&t, &service);

    t.trigger(&service, vocab::REQUESTED_SCALING, Term::literal("3"))
        .await;
    t.settle().await;
    assert_eq!(t.scaling(&service), Some(3));
    assert_eq!(t.status(&service), Some(Status::Started));
    assert!(t.store.value(&service, vocab::REQUESTED_SCALING).is_none());

    t.trigger(&service, vocab::REQUESTED_STATUS, Term::iri(Status::Stopped.iri()))
        .await;
    t.settle().await;
    assert_eq!(t.status(&service), Some(Status::Stopped));

    assert_eq!(
        t.runner.calls(),
        vec![
            "docker-compose up -d --no-recreate --scale web=3 web",
            "docker-compose stop web",
        ]
    );
    let specs = t.runner.specs();
    assert_eq!(specs[0].cwd.as_deref(), Some(t.project_dir("p1").as_path()));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("up".to_string(), Some(Status::Scaling)),
            ("stop".to_string(), Some(Status::Stopping)),
        ]
    );
}

#[tokio::test]
async fn stale_running_record_converges_to_stopped() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Error));
    let service = t.seed_service(&pipeline, "s1", "service1", 3, Status::Started);

    let summary = t.engine.reconcile().await.unwrap();
    t.settle().await;

    assert_eq!(summary.started, 0);
    assert_eq!(summary.died, 3);
    assert_eq!(t.scaling(&service), Some(0));
    assert_eq!(t.status(&service), Some(Status::Stopped));
    assert_eq!(t.status(&pipeline), Some(Status::Stopped));
}

#[tokio::test]
async fn running_container_converges_to_started() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Error));
    let service = t.seed_service(&pipeline, "s2", "service2", 0, Status::Stopped);
    t.runtime.run_container("c1", "p1", "service2", 1);

    t.engine.reconcile().await.unwrap();
    t.settle().await;

    assert_eq!(t.scaling(&service), Some(1));
    assert_eq!(t.status(&service), Some(Status::Started));
    assert_eq!(t.status(&pipeline), Some(Status::Started));
}

#[tokio::test]
async fn reconciliation_only_lowers_to_what_runs() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    let service = t.seed_service(&pipeline, "s1", "web", 3, Status::Started);
    t.runtime.run_container("c1", "p1", "web", 1);
    t.runtime.run_container("x1", "unmanaged", "web", 1);

    let summary = t.engine.reconcile().await.unwrap();
    t.settle().await;

    assert_eq!(summary.died, 2);
    assert_eq!(t.scaling(&service), Some(1));
    assert_eq!(t.status(&service), Some(Status::Started));
    assert_eq!(t.status(&pipeline), Some(Status::Up));
}

#[tokio::test]
async fn startup_replays_unresolved_triggers() {
    let t = TestEngine::new();
    let repo = t.seed_repository("r1", Some(LOCATION));
    let fresh = t.seed_pipeline("p1", Some(&repo), None);
    let restarting = t.seed_pipeline("p2", None, Some(Status::Up));
    t.seed_project("p2");
    t.store
        .insert(&restarting, vocab::RESTART_REQUESTED, flag());

    let groups = t.engine.replay_pending_triggers().await.unwrap();
    t.settle().await;

    assert_eq!(groups, 2);
    assert_eq!(t.status(&fresh), Some(Status::Down));
    assert_eq!(t.services_by_title(&fresh).len(), 2);
    assert_eq!(t.status(&restarting), Some(Status::Started));
    assert!(t.store.value(&restarting, vocab::RESTART_REQUESTED).is_none());
}

#[tokio::test]
async fn watched_events_drive_service_state() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Stopped));
    let service = t.seed_service(&pipeline, "s1", "web", 0, Status::Stopped);

    let stream = t.engine.subscribe().await.unwrap();
    let handlers = t.engine.event_handlers();
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(async move { stackgrid_monitor::watch(stream, &handlers, rx).await });

    t.runtime.emit(EventKind::Start, "p1", "web", 2);
    eventually("scale up", || t.scaling(&service) == Some(2)).await;
    assert_eq!(t.status(&service), Some(Status::Started));
    eventually("pipeline started", || t.status(&pipeline) == Some(Status::Started)).await;

    t.runtime.emit(EventKind::Die, "p1", "web", 1);
    eventually("scale down", || t.scaling(&service) == Some(0)).await;
    eventually("pipeline stopped", || t.status(&pipeline) == Some(Status::Stopped)).await;

    tx.send(true).unwrap();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn broken_event_stream_is_fatal() {
    let t = TestEngine::new();
    let stream = t.engine.subscribe().await.unwrap();
    let handlers = t.engine.event_handlers();
    let (_tx, rx) = watch::channel(false);

    t.runtime.break_stream();
    assert!(stackgrid_monitor::watch(stream, &handlers, rx).await.is_err());
}

#[tokio::test]
async fn service_logs() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    t.seed_project("p1");
    t.seed_service(&pipeline, "s1", "web", 1, Status::Started);
    t.runner.set_stdout("web_1 | ready\n");

    assert_eq!(t.engine.service_logs("s1").await.unwrap(), "web_1 | ready\n");
    assert_eq!(
        t.runner.calls(),
        vec!["docker-compose logs --no-color --tail=1000 web".to_string()]
    );

    assert!(matches!(
        t.engine.service_logs("missing").await,
        Err(EngineError::NotFound(_))
    ));

    t.runner.time_out_on("logs");
    assert!(matches!(
        t.engine.service_logs("s1").await,
        Err(EngineError::LogsTimedOut)
    ));
}

#[tokio::test]
async fn delta_boundaries() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    let up = Term::iri(Status::Up.iri());

    assert!(matches!(
        t.engine.handle_delta(b"{not json").await,
        Err(EngineError::Delta(_))
    ));
    assert!(matches!(
        t.engine.handle_delta(br#"{"delta": [{"graph": "g"}]}"#).await,
        Err(EngineError::Delta(_))
    ));

    let other = delta_body("http://other/graph", &[(&pipeline, vocab::REQUESTED_STATUS, &up)], &[]);
    assert_eq!(t.engine.handle_delta(other.as_bytes()).await.unwrap(), 0);

    let cancelled = delta_body(
        GRAPH,
        &[(&pipeline, vocab::REQUESTED_STATUS, &up)],
        &[(&pipeline, vocab::REQUESTED_STATUS, &up)],
    );
    assert_eq!(t.engine.handle_delta(cancelled.as_bytes()).await.unwrap(), 0);

    t.settle().await;
    assert!(t.runner.calls().is_empty());
    assert_eq!(t.status(&pipeline), Some(Status::Down));
}
