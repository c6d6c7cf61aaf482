use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use mindcraft_core::models::{CurriculumPlanDetail, NewCurriculumPlan, OutlinePatch};
use serde::Deserialize;

use super::{EntityId, PublishRequest};
use crate::{ApiError, ApiResult, AppState};

type Detail = ApiResult<Json<CurriculumPlanDetail>>;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/curriculum-plans", post(create))
        .route("/api/curriculum-plans/{id}", get(detail))
        .route(
            "/api/curriculum-plans/{id}/generate-outline",
            post(generate_outline),
        )
        .route(
            "/api/curriculum-plans/{id}/generate-lessons",
            post(generate_lessons),
        )
        .route(
            "/api/curriculum-plans/{id}/generate-single-lesson",
            post(generate_single_lesson),
        )
        .route("/api/curriculum-plans/{id}/publish", post(publish))
        .route(
            "/api/curriculum-plans/{id}/update-outline",
            patch(update_outline),
        )
}

async fn create(
    State(state): State<AppState>,
    body: Result<Json<NewCurriculumPlan>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CurriculumPlanDetail>)> {
    let Json(plan) = body?;
    let detail = state.curriculum.create(plan).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn detail(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.curriculum.detail(id).await?))
}

async fn generate_outline(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.curriculum.generate_outline(id).await?))
}

async fn generate_lessons(State(state): State<AppState>, EntityId(id): EntityId) -> Detail {
    Ok(Json(state.curriculum.generate_lessons(id).await?))
}

#[derive(Debug, Deserialize)]
struct SingleLessonRequest {
    #[serde(default)]
    week_number: Option<u32>,
    /// Zero-based position within the week.
    #[serde(default)]
    lesson_index: Option<u32>,
}

async fn generate_single_lesson(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<SingleLessonRequest>, JsonRejection>,
) -> Detail {
    let Json(request) = body?;
    let (Some(week_number), Some(lesson_index)) = (request.week_number, request.lesson_index)
    else {
        return Err(ApiError::bad_request(
            "week_number and lesson_index are required",
        ));
    };
    Ok(Json(
        state
            .curriculum
            .generate_single_lesson(id, week_number, lesson_index)
            .await?,
    ))
}

async fn publish(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Detail {
    let Json(request) = body?;
    Ok(Json(state.curriculum.publish(id, request.kid_ids).await?))
}

async fn update_outline(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<OutlinePatch>, JsonRejection>,
) -> Detail {
    let Json(patch) = body?;
    Ok(Json(state.curriculum.update_outline(id, patch).await?))
}
