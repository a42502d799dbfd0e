//! Route handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use stackgrid_engine::EngineError;
use tracing::{debug, error, warn};

use crate::ApiState;

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// POST /update
///
/// Accepts a change-feed body. Actions are queued, not awaited, so the
/// response only says whether the payload was understood.
pub async fn receive_delta(State(state): State<ApiState>, body: Bytes) -> Response {
    match state.engine.handle_delta(&body).await {
        Ok(groups) => {
            debug!(groups, "delta accepted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(EngineError::Delta(e)) => {
            warn!(error = %e, "rejected malformed delta");
            error_response(&e.to_string(), StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            error!(error = %e, "failed to handle delta");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /services/{id}/logs
pub async fn service_logs(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.engine.service_logs(&id).await {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(EngineError::NotFound(what)) => {
            error_response(&format!("{what} not found"), StatusCode::NOT_FOUND)
        }
        Err(EngineError::LogsTimedOut) => {
            warn!(service = %id, "log retrieval timed out");
            error_response("log retrieval timed out", StatusCode::REQUEST_TIMEOUT)
        }
        Err(e) => {
            error!(service = %id, error = %e, "log retrieval failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
