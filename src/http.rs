use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::{Stream, StreamExt};
use tower_http::trace::TraceLayer;

use crate::{
    orchestrator::ChatOrchestrator,
    store::MessageStore,
    types::SendOutcome,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub store: Arc<dyn MessageStore>,
    pub default_language: String,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    200
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/chat/sessions", post(start_session))
        .route(
            "/chat/sessions/{session_id}",
            axum::routing::delete(close_session),
        )
        .route(
            "/chat/sessions/{session_id}/messages",
            post(send_message).get(list_messages),
        )
        .route(
            "/chat/sessions/{session_id}/staff-replies",
            post(staff_reply),
        )
        .route("/chat/sessions/{session_id}/limit", get(limit_status))
        .route("/chat/sessions/{session_id}/events", get(session_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> &'static str {
    "parkchat API"
}

async fn health() -> &'static str {
    "ok"
}

async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let language = request
        .language
        .unwrap_or_else(|| state.default_language.clone());
    let start = state
        .orchestrator
        .start_session(&language)
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(start)))
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.content.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "content must not be empty",
        ));
    }

    let outcome = state
        .orchestrator
        .handle_message(&session_id, &request.content)
        .await
        .map_err(internal_error)?;

    let status = match &outcome {
        SendOutcome::Replied { .. } | SendOutcome::Queued { .. } => StatusCode::OK,
        SendOutcome::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        SendOutcome::Rejected { .. } => StatusCode::FORBIDDEN,
    };
    Ok((status, Json(outcome)))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .store
        .list_messages(&session_id, query.limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(messages))
}

async fn staff_reply(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state
        .orchestrator
        .staff_reply(&session_id, &request.content)
        .await
        .map_err(internal_error)?
    {
        Some(message) => Ok(Json(message)),
        None => Err(error_response(
            StatusCode::FORBIDDEN,
            "session not found or closed",
        )),
    }
}

async fn limit_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    Json(state.orchestrator.limit_status(&session_id).await)
}

async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let closed = state
        .orchestrator
        .close_session(&session_id)
        .await
        .map_err(internal_error)?;
    if closed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            "session not found or closed",
        ))
    }
}

/// Staff replies streamed to the open chat widget as server-sent
/// events. The subscription unsubscribes itself when the client
/// disconnects and the stream is dropped.
async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.store.subscribe_staff_replies(&session_id);
    let stream = subscription
        .map(|message| Event::default().event("staff_reply").json_data(&message));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Failure bodies keep the `{"error": ...}` wire shape of the hosted
/// endpoints.
type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn internal_error(error: anyhow::Error) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string())
}
