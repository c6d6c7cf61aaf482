//! Research session pipeline and media resources.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use mindcraft_core::models::{
    FindingPatch, MediaPatch, MediaResource, NewMedia, NewResearchSession, ResearchSessionDetail,
};

use super::{EntityId, PublishRequest};
use crate::{ApiResult, AppState};

type Detail = ApiResult<Json<ResearchSessionDetail>>;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/research-sessions", post(create))
        .route("/api/research-sessions/{id}", get(detail))
        .route("/api/research-sessions/{id}/research", post(research))
        .route(
            "/api/research-sessions/{id}/generate-lesson",
            post(generate_lesson),
        )
        .route(
            "/api/research-sessions/{id}/discover-media",
            post(discover_media),
        )
        .route("/api/research-sessions/{id}/publish", post(publish))
        .route(
            "/api/research-sessions/{id}/update-finding",
            patch(update_finding),
        )
        .route("/api/research-sessions/{id}/add-media", post(add_media))
        .route("/api/media/{id}", patch(update_media).delete(delete_media))
}

async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewResearchSession>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ResearchSessionDetail>)> {
    let Json(session) = body?;
    let detail = state.research.create(session).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn detail(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.research.detail(id).await?))
}

async fn research(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.research.research(id).await?))
}

async fn generate_lesson(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.research.generate_lesson(id).await?))
}

async fn discover_media(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.research.discover_media(id).await?))
}

async fn publish(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Detail {
    let Json(request) = body?;
    Ok(Json(state.research.publish(id, request.kid_ids).await?))
}

async fn update_finding(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<FindingPatch>, JsonRejection>,
) -> Detail {
    let Json(patch) = body?;
    Ok(Json(state.research.update_finding(id, patch).await?))
}

async fn add_media(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<NewMedia>, JsonRejection>,
) -> Detail {
    let Json(media) = body?;
    Ok(Json(state.research.add_media(id, media).await?))
}

async fn update_media(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<MediaPatch>, JsonRejection>,
) -> ApiResult<Json<MediaResource>> {
    let Json(patch) = body?;
    Ok(Json(state.research.update_media(id, patch).await?))
}

async fn delete_media(State(state): State<AppState>, EntityId(id): EntityId) -> ApiResult<StatusCode> {
    state.research.delete_media(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
