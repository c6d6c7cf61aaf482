//! Handwritten math practice: sessions, attempts, problems and grading.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use mindcraft_core::CoreError;
use mindcraft_core::evaluate::Evaluation;
use mindcraft_core::generate::MathProblem;
use mindcraft_core::models::{MathPracticeSession, MathProblemAttempt, NewMathAttempt, NewMathSession};
use serde::Deserialize;

use super::{EntityId, required};
use crate::{ApiError, ApiResult, AppState};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/math/sessions", post(create_session))
        .route("/api/math/sessions/{id}/attempts", post(add_attempt))
        .route("/api/math/generate-problem", post(generate_problem))
        .route("/api/math/evaluate", post(evaluate))
}

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<NewMathSession>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MathPracticeSession>)> {
    let Json(session) = body?;
    if state.store.get_kid(session.kid_id).await?.is_none() {
        return Err(CoreError::NotFound(format!("Kid profile {}", session.kid_id)).into());
    }
    let session = state.store.create_math_session(session).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn add_attempt(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    body: Result<Json<NewMathAttempt>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MathProblemAttempt>)> {
    let Json(mut attempt) = body?;
    if state.store.get_math_session(id).await?.is_none() {
        return Err(CoreError::NotFound(format!("Math session {id}")).into());
    }
    attempt.problem_text = required(&attempt.problem_text, "problem_text is required")?;
    let attempt = state.store.add_math_attempt(id, attempt).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

#[derive(Debug, Deserialize)]
struct ProblemRequest {
    #[serde(default)]
    grade: Option<u32>,
    #[serde(default = "default_topic")]
    topic: String,
}

async fn generate_problem(
    State(state): State<AppState>,
    body: Result<Json<ProblemRequest>, JsonRejection>,
) -> ApiResult<Json<MathProblem>> {
    let Json(request) = body?;
    let grade = checked_grade(request.grade)?;
    let problem = state
        .generator
        .generate_math_problem(request.topic.trim(), grade)
        .await?;
    Ok(Json(problem))
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    #[serde(default)]
    problem: String,
    #[serde(default)]
    image_base64: String,
    #[serde(default)]
    grade: Option<u32>,
}

async fn evaluate(
    State(state): State<AppState>,
    body: Result<Json<EvaluateRequest>, JsonRejection>,
) -> ApiResult<Json<Evaluation>> {
    let Json(request) = body?;
    let problem = required(&request.problem, "problem is required")?;
    let image = required(&request.image_base64, "image_base64 is required")?;
    let grade = checked_grade(request.grade)?;
    let evaluation = state.evaluator.evaluate(&problem, &image, grade).await?;
    Ok(Json(evaluation))
}

/// Required school grade, 1 through 12.
fn checked_grade(value: Option<u32>) -> ApiResult<u32> {
    let grade = value.ok_or_else(|| ApiError::bad_request("grade is required"))?;
    if !(1..=12).contains(&grade) {
        return Err(ApiError::bad_request("grade must be between 1 and 12"));
    }
    Ok(grade)
}

fn default_topic() -> String {
    "arithmetic".to_string()
}
