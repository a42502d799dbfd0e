//! stackgrid-api — HTTP surface of the StackGrid daemon.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/update` | Change-feed notification from the graph store |
//! | GET | `/services/{id}/logs` | Tail of a service's container logs |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use stackgrid_engine::Engine;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Engine,
}

/// Build the API router.
pub fn build_router(engine: Engine) -> Router {
    Router::new()
        .route("/update", post(handlers::receive_delta))
        .route("/services/{id}/logs", get(handlers::service_logs))
        .with_state(ApiState { engine })
}
