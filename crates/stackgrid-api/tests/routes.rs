//! Router-level tests against an engine over test doubles.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use stackgrid_api::build_router;
use stackgrid_core::{Status, Term, vocab};
use stackgrid_engine::testing::{GRAPH, TestEngine, delta_body};
use tower::ServiceExt;

fn post_update(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/update")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn update_queues_the_requested_transition() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    t.seed_project("p1");
    let up = Term::iri(Status::Up.iri());
    t.store.insert(&pipeline, vocab::REQUESTED_STATUS, up.clone());

    let router = build_router(t.engine.clone());
    let body = delta_body(GRAPH, &[(&pipeline, vocab::REQUESTED_STATUS, &up)], &[]);
    let resp = router.oneshot(post_update(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    t.settle().await;
    assert_eq!(t.status(&pipeline), Some(Status::Up));
}

#[tokio::test]
async fn update_for_another_graph_is_ignored() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Down));
    let up = Term::iri(Status::Up.iri());

    let router = build_router(t.engine.clone());
    let body = delta_body("http://example.org/other", &[(&pipeline, vocab::REQUESTED_STATUS, &up)], &[]);
    let resp = router.oneshot(post_update(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    t.settle().await;
    assert!(t.runner.calls().is_empty());
}

#[tokio::test]
async fn malformed_update_is_rejected() {
    let t = TestEngine::new();
    let router = build_router(t.engine.clone());

    let resp = router
        .clone()
        .oneshot(post_update("{\"delta\": 42}".to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .oneshot(post_update("not json".to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_are_plain_text() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    t.seed_project("p1");
    t.seed_service(&pipeline, "s1", "web", 1, Status::Started);
    t.runner.set_stdout("web_1 | listening on :80\n");

    let router = build_router(t.engine.clone());
    let resp = router.oneshot(get("/services/s1/logs")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"web_1 | listening on :80\n");
}

#[tokio::test]
async fn logs_error_statuses() {
    let t = TestEngine::new();
    let pipeline = t.seed_pipeline("p1", None, Some(Status::Up));
    t.seed_project("p1");
    t.seed_service(&pipeline, "s1", "web", 1, Status::Started);
    let router = build_router(t.engine.clone());

    let resp = router
        .clone()
        .oneshot(get("/services/unknown/logs"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    t.runner.time_out_on("logs");
    let resp = router
        .clone()
        .oneshot(get("/services/s1/logs"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);

    // A pipeline id that cannot name a project directory.
    let odd = t.seed_pipeline("..", None, Some(Status::Up));
    t.seed_service(&odd, "s2", "web", 1, Status::Started);
    let resp = router.oneshot(get("/services/s2/logs")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
