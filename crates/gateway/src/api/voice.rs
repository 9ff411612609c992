//! Voice API endpoints — the primary interface for running orchestrated
//! turns.
//!
//! - `POST /voice/query`          — non-streaming: drains progress, returns the final result
//! - `POST /voice/query/stream`   — SSE: streams `progress`/`error`/`done` events
//! - `POST /voice/confirm`        — resumes a plan paused on a confirmation
//! - `GET  /voice/capabilities`   — per-user registry snapshot
//! - `GET  /activity`             — paginated activity feed

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde::Deserialize;

use vco_domain::ids::{ConfirmationId, UserId};
use vco_domain::progress::ProgressEvent;

use crate::orchestrator::{self, QueryOptions};
use crate::registry_snapshot;
use crate::state::AppState;

const MAX_QUERY_CHARS: usize = 500;
const DEFAULT_USER: &str = "default";

/// Single-tenant deployments omit `X-User-Id` entirely and every request is
/// routed to the `default` user; multi-tenant deployments set it per caller.
fn extract_user(headers: &HeaderMap) -> UserId {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(UserId::from)
        .unwrap_or_else(|| UserId::from(DEFAULT_USER))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

fn too_long() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(serde_json::json!({
            "error": "QUERY_TOO_LONG",
            "message": format!("query must be at most {MAX_QUERY_CHARS} characters"),
        })),
    )
        .into_response()
}

type Response = axum::response::Response;

// ── POST /voice/query ──────────────────────────────────────────────────

pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<QueryRequest>,
) -> Response {
    if body.query.chars().count() > MAX_QUERY_CHARS {
        return too_long();
    }

    let user = extract_user(&headers);
    let mut rx = orchestrator::process_query(Arc::new(state), user, body.query, QueryOptions::default());

    while let Some(event) = rx.recv().await {
        if let ProgressEvent::Done { result } = event {
            return Json(result).into_response();
        }
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "NO_RESULT", "message": "the orchestrator closed without a result" })),
    )
        .into_response()
}

// ── POST /voice/query/stream ───────────────────────────────────────────

pub async fn query_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<QueryRequest>,
) -> Response {
    if body.query.chars().count() > MAX_QUERY_CHARS {
        return too_long();
    }

    let user = extract_user(&headers);
    let rx = orchestrator::process_query(Arc::new(state), user, body.query, QueryOptions::default());

    let stream = make_sse_stream(rx);
    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    response
        .headers_mut()
        .insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    response
}

fn make_sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<ProgressEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let event_type = match &event {
                ProgressEvent::Error { .. } => "error",
                ProgressEvent::Done { .. } => "done",
                _ => "progress",
            };
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event_type).data(data));
        }
    }
}

// ── POST /voice/confirm ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    #[serde(rename = "confirmationID")]
    pub confirmation_id: String,
    pub response: String,
}

pub async fn confirm(State(state): State<AppState>, Json(body): Json<ConfirmRequest>) -> Response {
    let confirmation_id = ConfirmationId(body.confirmation_id);

    if body.response.eq_ignore_ascii_case("reject") {
        let resolved = state.executor.reject(&confirmation_id);
        return Json(serde_json::json!({ "confirmationID": confirmation_id.to_string(), "resolved": resolved, "accepted": false })).into_response();
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let outcome = state.executor.resume(&confirmation_id, &body.response, &tx).await;
    drop(tx);
    while rx.recv().await.is_some() {}

    match outcome {
        Ok(outcome) => Json(serde_json::json!({
            "confirmationID": confirmation_id.to_string(),
            "accepted": true,
            "outcome": outcome_to_json(&outcome),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "CONFIRMATION_REJECTED", "message": e.to_string() })),
        )
            .into_response(),
    }
}

fn outcome_to_json(outcome: &vco_executor::ExecutionOutcome) -> serde_json::Value {
    match outcome {
        vco_executor::ExecutionOutcome::Completed { results, success } => {
            serde_json::json!({ "completed": true, "success": success, "results": results })
        }
        vco_executor::ExecutionOutcome::ConfirmationRequired { confirmation_id, summary, .. } => {
            serde_json::json!({ "completed": false, "confirmationID": confirmation_id.to_string(), "summary": summary })
        }
    }
}

// ── GET /voice/capabilities ─────────────────────────────────────────────

pub async fn capabilities(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = extract_user(&headers);
    let (snapshot, connected_count) =
        registry_snapshot::build(&state.connections, &state.config.connections, &user).await;

    Json(serde_json::json!({ "providers": snapshot, "connectedCount": connected_count })).into_response()
}

// ── GET /activity ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
    pub before: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn activity(State(state): State<AppState>, Query(params): Query<ActivityQuery>) -> Response {
    let items = state.activity.list(params.limit, params.before);
    Json(serde_json::json!({ "items": items })).into_response()
}
