//! Tutor chat sessions and the streaming send endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use mindcraft_core::CoreError;
use mindcraft_core::chat::ChatContext;
use mindcraft_core::models::{ChatMessage, ChatSession, NewChatSession};
use serde::Deserialize;

use super::EntityId;
use crate::{ApiResult, AppState};

/// Stops nginx-style proxies from holding back streamed events.
const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat-sessions", post(create))
        .route("/api/chat-sessions/{id}/messages", get(messages))
        .route("/api/chat-sessions/{id}/send", post(send))
}

async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewChatSession>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    let Json(session) = body?;
    if state.store.get_kid(session.kid_id).await?.is_none() {
        return Err(CoreError::NotFound(format!("Kid profile {}", session.kid_id)).into());
    }
    let session = state.store.create_chat_session(session).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn messages(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    if state.store.get_chat_session(id).await?.is_none() {
        return Err(CoreError::NotFound(format!("Chat session {id}")).into());
    }
    Ok(Json(state.store.list_messages(id).await?))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    context: Option<ChatContext>,
}

/// Relay one kid message as `data: {"type": ..., "content": ...}` events.
async fn send(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let events = state
        .relay
        .send(id, &request.message, request.context)
        .await?
        .map(|event| Event::default().json_data(event));
    Ok(([(X_ACCEL_BUFFERING, "no")], Sse::new(events)))
}
