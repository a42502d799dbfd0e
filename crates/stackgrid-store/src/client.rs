//! Minimal HTTP client for the graph store's query endpoint.
//!
//! Each request opens a fresh HTTP/1 connection, posts a form-encoded
//! `query=` or `update=` body and decodes the JSON result set. Every
//! request carries a timeout. Only plain `http://` endpoints are
//! supported; the store is expected on the internal network.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use stackgrid_core::{Term, vocab};
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};

/// One solution of a `SELECT`: variable name → bound term.
pub type Row = HashMap<String, Term>;

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    boolean: Option<bool>,
    #[serde(default)]
    results: Option<ResultSet>,
}

#[derive(Deserialize)]
struct ResultSet {
    bindings: Vec<HashMap<String, Binding>>,
}

#[derive(Deserialize)]
struct Binding {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl Binding {
    fn into_term(self) -> Option<Term> {
        match self.kind.as_str() {
            "uri" => Some(Term::Iri(self.value)),
            "literal" | "typed-literal" => Some(Term::Literal(self.value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SparqlClient {
    /// `host:port` to connect to.
    address: String,
    /// Value of the `Host` header.
    authority: String,
    path: String,
    timeout: Duration,
}

impl SparqlClient {
    pub fn new(endpoint: &str, timeout: Duration) -> StoreResult<Self> {
        let invalid = |reason: &str| StoreError::Endpoint(endpoint.to_string(), reason.to_string());

        let uri: http::Uri = endpoint.parse().map_err(|_| invalid("not a valid URI"))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme {other}"))),
            None => return Err(invalid("missing scheme")),
        }
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        let port = uri.port_u16().unwrap_or(80);
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            address: format!("{host}:{port}"),
            authority,
            path,
            timeout,
        })
    }

    /// Run a `SELECT` and return its solutions. Blank-node bindings are
    /// dropped from the rows.
    pub async fn select(&self, query: &str) -> StoreResult<Vec<Row>> {
        let response = self.query(query).await?;
        let results = response
            .results
            .ok_or_else(|| StoreError::Decode("missing results in SELECT response".into()))?;
        Ok(results
            .bindings
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .filter_map(|(var, binding)| binding.into_term().map(|t| (var, t)))
                    .collect()
            })
            .collect())
    }

    pub async fn ask(&self, query: &str) -> StoreResult<bool> {
        self.query(query)
            .await?
            .boolean
            .ok_or_else(|| StoreError::Decode("missing boolean in ASK response".into()))
    }

    pub async fn update(&self, update: &str) -> StoreResult<()> {
        self.post("update", update).await.map(|_| ())
    }

    async fn query(&self, query: &str) -> StoreResult<QueryResponse> {
        let body = self.post("query", query).await?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn post(&self, field: &str, text: &str) -> StoreResult<Bytes> {
        let text = format!("{}{text}", vocab::prefixes());
        trace!(%field, %text, "store request");

        let request = async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .map_err(|e| StoreError::Connect(e.to_string()))?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| StoreError::Connect(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "store connection closed with error");
                }
            });

            let body = format!("{field}={}", urlencoding::encode(&text));
            let req = http::Request::builder()
                .method("POST")
                .uri(&self.path)
                .header(HOST, &self.authority)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(ACCEPT, "application/sparql-results+json")
                .header(USER_AGENT, "stackd/0.1")
                .body(Full::new(Bytes::from(body)))
                .map_err(|e| StoreError::Request(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| StoreError::Request(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| StoreError::Request(e.to_string()))?
                .to_bytes();

            if !status.is_success() {
                let body: String = String::from_utf8_lossy(&bytes).chars().take(512).collect();
                return Err(StoreError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(bytes)
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parsing() {
        let client = SparqlClient::new("http://database:8890/sparql", Duration::from_secs(1)).unwrap();
        assert_eq!(client.address, "database:8890");
        assert_eq!(client.authority, "database:8890");
        assert_eq!(client.path, "/sparql");

        let client = SparqlClient::new("http://db/sparql?x=1", Duration::from_secs(1)).unwrap();
        assert_eq!(client.address, "db:80");
        assert_eq!(client.path, "/sparql?x=1");
    }

    #[test]
    fn rejects_unsupported_endpoints() {
        assert!(matches!(
            SparqlClient::new("https://db/sparql", Duration::from_secs(1)),
            Err(StoreError::Endpoint(..))
        ));
        assert!(matches!(
            SparqlClient::new("db/sparql", Duration::from_secs(1)),
            Err(StoreError::Endpoint(..))
        ));
    }

    #[test]
    fn bindings_map_to_terms() {
        let b = |kind: &str| Binding {
            kind: kind.to_string(),
            value: "v".to_string(),
        };
        assert_eq!(b("uri").into_term(), Some(Term::iri("v")));
        assert_eq!(b("typed-literal").into_term(), Some(Term::literal("v")));
        assert_eq!(b("bnode").into_term(), None);
    }

    #[tokio::test]
    async fn unreachable_store_is_a_connect_error() {
        // Port 9 (discard) is not expected to be listening locally.
        let client = SparqlClient::new("http://127.0.0.1:9/sparql", Duration::from_secs(2)).unwrap();
        let err = client.ask("ASK {}").await.unwrap_err();
        assert!(matches!(err, StoreError::Connect(_) | StoreError::Timeout(_)));
    }
}
