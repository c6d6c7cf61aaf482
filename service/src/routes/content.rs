//! Kids, subjects and the stateless generators.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use mindcraft_core::CoreError;
use mindcraft_core::generate::{GeneratedLesson, Quiz};
use mindcraft_core::models::{Difficulty, KidProfile, NewKid, NewLesson, NewSubject, Subject};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{EntityId, required};
use crate::{ApiResult, AppState};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/kids", post(create_kid))
        .route("/api/subjects", post(create_subject))
        .route("/api/subjects/{id}/suggest-topics", post(suggest_topics))
        .route("/api/generate/lesson", post(generate_lesson))
        .route("/api/generate/quiz", post(generate_quiz))
        .route("/api/generate/hint", post(generate_hint))
        .route("/api/generate/feedback", post(generate_feedback))
}

async fn create_kid(
    State(state): State<AppState>,
    body: Result<Json<NewKid>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<KidProfile>)> {
    let Json(mut kid) = body?;
    kid.display_name = required(&kid.display_name, "display_name is required")?;
    let kid = state
        .store
        .create_kid(kid, state.default_daily_limit)
        .await?;
    tracing::info!(kid_id = kid.id, "kid profile created");
    Ok((StatusCode::CREATED, Json(kid)))
}

async fn create_subject(
    State(state): State<AppState>,
    body: Result<Json<NewSubject>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Subject>)> {
    let Json(mut subject) = body?;
    subject.name = required(&subject.name, "Subject name is required")?;
    let subject = state.store.create_subject(subject).await?;
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn suggest_topics(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> ApiResult<Json<Value>> {
    let subject = state
        .store
        .get_subject(id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("Subject {id}")))?;
    let topics = state
        .generator
        .suggest_topics(&subject.name, &subject.description)
        .await?;
    Ok(Json(json!({ "topics": topics })))
}

#[derive(Debug, Deserialize)]
struct LessonRequest {
    #[serde(default)]
    topic: String,
    #[serde(default = "default_grade")]
    grade_level: u32,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default)]
    additional_context: String,
    /// Saves the lesson as a draft under this topic.
    #[serde(default)]
    topic_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct LessonResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    lesson_id: Option<i64>,
    #[serde(flatten)]
    lesson: GeneratedLesson,
}

async fn generate_lesson(
    State(state): State<AppState>,
    body: Result<Json<LessonRequest>, JsonRejection>,
) -> ApiResult<Json<LessonResponse>> {
    let Json(request) = body?;
    let topic = required(&request.topic, "Topic is required")?;
    if let Some(topic_id) = request.topic_id {
        if state.store.get_topic(topic_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("Topic {topic_id}")).into());
        }
    }

    let lesson = state
        .generator
        .generate_lesson(
            &topic,
            request.grade_level,
            request.difficulty.as_str(),
            &request.additional_context,
        )
        .await?;

    let lesson_id = match request.topic_id {
        Some(topic_id) => {
            let saved = state
                .store
                .create_lesson(NewLesson {
                    topic_id,
                    title: lesson.title.clone(),
                    description: lesson.description.clone(),
                    content: lesson.content.clone(),
                    grade_level: request.grade_level,
                    difficulty: request.difficulty,
                    estimated_minutes: lesson.estimated_minutes,
                })
                .await?;
            tracing::info!(lesson_id = saved.id, topic_id, "draft lesson saved");
            Some(saved.id)
        }
        None => None,
    };
    Ok(Json(LessonResponse { lesson_id, lesson }))
}

#[derive(Debug, Deserialize)]
struct QuizRequest {
    #[serde(default)]
    lesson_content: String,
    #[serde(default = "default_num_questions")]
    num_questions: u32,
    #[serde(default = "default_grade")]
    grade_level: u32,
}

async fn generate_quiz(
    State(state): State<AppState>,
    body: Result<Json<QuizRequest>, JsonRejection>,
) -> ApiResult<Json<Quiz>> {
    let Json(request) = body?;
    let content = required(&request.lesson_content, "lesson_content is required")?;
    let quiz = state
        .generator
        .generate_quiz(&content, request.num_questions, request.grade_level)
        .await?;
    Ok(Json(quiz))
}

#[derive(Debug, Deserialize)]
struct HintRequest {
    #[serde(default)]
    question_text: String,
    #[serde(default)]
    choices: Vec<String>,
    #[serde(default = "default_attempt")]
    attempt: u32,
}

async fn generate_hint(
    State(state): State<AppState>,
    body: Result<Json<HintRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    let question = required(&request.question_text, "question_text is required")?;
    let hint = state
        .generator
        .generate_hint(&question, &request.choices, request.attempt)
        .await?;
    Ok(Json(json!({ "hint": hint })))
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    #[serde(default)]
    journal_content: String,
    #[serde(default)]
    kid_name: String,
    #[serde(default)]
    age: Option<u32>,
}

async fn generate_feedback(
    State(state): State<AppState>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;
    let journal = required(&request.journal_content, "journal_content is required")?;
    let feedback = state
        .generator
        .generate_feedback(&journal, request.kid_name.trim(), request.age)
        .await?;
    Ok(Json(json!({ "feedback": feedback })))
}

fn default_grade() -> u32 {
    5
}

fn default_num_questions() -> u32 {
    5
}

fn default_attempt() -> u32 {
    1
}
