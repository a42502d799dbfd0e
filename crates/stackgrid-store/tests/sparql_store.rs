//! SparqlStore against a local fake endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use stackgrid_core::{Status, Term, Trigger, vocab};
use stackgrid_store::{ResourceStore, SparqlClient, SparqlStore, StoreError};

#[derive(Clone)]
struct Fake {
    requests: Arc<Mutex<Vec<(String, String)>>>,
    response: Arc<(StatusCode, String)>,
}

async fn endpoint(State(fake): State<Fake>, body: String) -> impl IntoResponse {
    let (field, value) = body.split_once('=').unwrap_or(("", ""));
    let value = urlencoding::decode(value).map(|v| v.into_owned()).unwrap_or_default();
    fake.requests.lock().unwrap().push((field.to_string(), value));
    let (status, text) = &*fake.response;
    (
        *status,
        [(header::CONTENT_TYPE, "application/sparql-results+json")],
        text.clone(),
    )
}

async fn serve(status: StatusCode, response: serde_json::Value) -> (SparqlStore, Fake) {
    let fake = Fake {
        requests: Arc::new(Mutex::new(Vec::new())),
        response: Arc::new((status, response.to_string())),
    };
    let app = Router::new()
        .route("/sparql", post(endpoint))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = SparqlClient::new(&format!("http://{addr}/sparql"), Duration::from_secs(5)).unwrap();
    (SparqlStore::new(client, "http://mu.semte.ch/application"), fake)
}

fn bindings(rows: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "head": { "vars": [] }, "results": { "bindings": rows } })
}

#[tokio::test]
async fn select_decodes_typed_bindings() {
    let (store, fake) = serve(
        StatusCode::OK,
        bindings(serde_json::json!([
            { "title": { "type": "literal", "value": "web" } }
        ])),
    )
    .await;

    assert_eq!(store.title("s1").await.unwrap().as_deref(), Some("web"));

    let requests = fake.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (field, text) = &requests[0];
    assert_eq!(field, "query");
    assert!(text.starts_with("PREFIX swarmui:"));
    assert!(text.contains("FROM <http://mu.semte.ch/application>"));
    assert!(text.contains("mu:uuid \"s1\""));
}

#[tokio::test]
async fn updates_are_posted_as_update_form_field() {
    let (store, fake) = serve(StatusCode::OK, serde_json::json!({})).await;

    store
        .set_status_unless("s1", Status::Stopped, &[Status::Down, Status::Stopped])
        .await
        .unwrap();
    store.clear_trigger("s1", Trigger::RestartRequested).await.unwrap();

    let requests = fake.requests.lock().unwrap();
    assert_eq!(requests[0].0, "update");
    assert!(requests[0].1.contains("WITH <http://mu.semte.ch/application>"));
    assert!(requests[0].1.contains("NOT IN ("));
    assert!(requests[1].1.contains(vocab::RESTART_REQUESTED));
}

#[tokio::test]
async fn interpolated_values_are_escaped() {
    let (store, fake) = serve(StatusCode::OK, bindings(serde_json::json!([]))).await;

    let evil = "x\" } ; DROP ALL ; #";
    assert_eq!(store.title(evil).await.unwrap(), None);

    let requests = fake.requests.lock().unwrap();
    assert!(requests[0].1.contains("\"x\\\" } ; DROP ALL ; #\""));
}

#[tokio::test]
async fn pending_triggers_skip_blank_nodes() {
    let (store, _fake) = serve(
        StatusCode::OK,
        bindings(serde_json::json!([
            {
                "s": { "type": "uri", "value": "http://r/services/s1" },
                "p": { "type": "uri", "value": vocab::RESTART_REQUESTED },
                "o": { "type": "literal", "value": "true" }
            },
            {
                "s": { "type": "bnode", "value": "b0" },
                "p": { "type": "uri", "value": vocab::REQUESTED_STATUS },
                "o": { "type": "uri", "value": Status::Up.iri() }
            }
        ])),
    )
    .await;

    let pending = store.pending_triggers().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].o, Term::literal("true"));
}

#[tokio::test]
async fn error_status_and_bad_bodies_surface() {
    let (store, _fake) = serve(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!("boom")).await;
    assert!(matches!(
        store.ping().await,
        Err(StoreError::Status { status: 500, .. })
    ));

    // A 200 that is not a result set does not count as ready.
    let (store, _fake) = serve(StatusCode::OK, serde_json::json!({ "hello": "world" })).await;
    assert!(matches!(store.ping().await, Err(StoreError::Decode(_))));
}
