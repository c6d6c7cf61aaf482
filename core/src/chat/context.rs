//! Picks the system prompt for a chat turn from the session's context.

use serde::Deserialize;

use crate::db::Store;
use crate::error::{Result, truncate_chars};
use crate::models::{ChatSession, ContextType, KidProfile};
use crate::prompts;

/// Longest slice of lesson content placed in a lesson-chat prompt.
pub const LESSON_CONTEXT_CHARS: usize = 3000;

const DEFAULT_MATH_TOPIC: &str = "math";

/// Extra context the client sends with a message, e.g. the math problem
/// currently on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub problem_text: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

pub async fn system_prompt(
    store: &Store,
    session: &ChatSession,
    kid: &KidProfile,
    context: Option<&ChatContext>,
) -> Result<String> {
    let name = kid.display_name.as_str();
    let grade = kid.grade_level;

    match (session.context_type, session.context_id) {
        (ContextType::Lesson, Some(lesson_id)) => {
            if let Some(lesson) = store.get_lesson(lesson_id).await? {
                let excerpt = truncate_chars(&lesson.content, LESSON_CONTEXT_CHARS);
                return Ok(prompts::lesson_system_prompt(name, grade, &excerpt));
            }
        }
        (ContextType::Math, context_id) => {
            if let Some((problem, topic)) = math_problem(store, context, context_id).await? {
                return Ok(prompts::math_tutor_system_prompt(
                    name, grade, &problem, &topic,
                ));
            }
        }
        _ => {}
    }
    Ok(prompts::tutor_system_prompt(name, grade, kid.age))
}

/// (problem, topic) for a math chat. The client's view wins; otherwise the
/// practice session or lesson named by `context_id`.
async fn math_problem(
    store: &Store,
    context: Option<&ChatContext>,
    context_id: Option<i64>,
) -> Result<Option<(String, String)>> {
    if let Some(problem) = context
        .and_then(|ctx| ctx.problem_text.as_deref())
        .filter(|problem| !problem.trim().is_empty())
    {
        let topic = context
            .and_then(|ctx| ctx.topic.clone())
            .unwrap_or_else(|| DEFAULT_MATH_TOPIC.to_string());
        return Ok(Some((problem.to_string(), topic)));
    }

    let Some(id) = context_id else {
        return Ok(None);
    };
    if let Some(practice) = store.get_math_session(id).await? {
        let problem = match store.latest_math_attempt(practice.id).await? {
            Some(attempt) => attempt.problem_text,
            None => practice.topic.clone(),
        };
        return Ok(Some((problem, practice.topic)));
    }
    if let Some(lesson) = store.get_lesson(id).await? {
        let topic = store
            .get_topic(lesson.topic_id)
            .await?
            .map_or_else(|| DEFAULT_MATH_TOPIC.to_string(), |topic| topic.name);
        return Ok(Some((lesson.title, topic)));
    }
    Ok(None)
}
