//! Generation functions: build a prompt, run a non-streaming completion,
//! parse the result.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::completion::{CompletionBackend, CompletionRequest};
use crate::config::ModelDefaults;
use crate::error::{CoreError, Result};
use crate::models::CurriculumOutline;
use crate::prompts::{self, Prompt};

pub use crate::prompts::{CurriculumLessonInput, MediaRef, ResearchLessonInput};

const HINT_MAX_TOKENS: u32 = 200;

/// A markdown lesson ready to be stored as a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedLesson {
    pub title: String,
    pub content: String,
    pub description: String,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question_text: String,
    #[serde(default = "default_question_type")]
    pub question_type: String,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub choices: Vec<QuizChoice>,
}

fn default_question_type() -> String {
    "multiple_choice".to_string()
}

fn default_points() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizChoice {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathProblem {
    pub problem_text: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSuggestion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_min_grade")]
    pub grade_level_min: u32,
    #[serde(default = "default_max_grade")]
    pub grade_level_max: u32,
}

fn default_min_grade() -> u32 {
    1
}

fn default_max_grade() -> u32 {
    12
}

#[derive(Debug, Deserialize)]
struct TopicSuggestions {
    #[serde(default)]
    topics: Vec<TopicSuggestion>,
}

/// Reading time for a lesson of the given difficulty.
pub fn estimated_minutes(difficulty: &str) -> u32 {
    match difficulty {
        "easy" => 15,
        "medium" => 20,
        _ => 25,
    }
}

/// Text of the first `# ` heading, if any.
pub fn extract_title(markdown: &str) -> Option<String> {
    markdown
        .lines()
        .find(|line| line.starts_with("# "))
        .map(|line| line.trim_start_matches(['#', ' ']).trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Drop a surrounding code fence: when the trimmed text opens with three
/// backticks, the first and last lines go.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = match trimmed.split_once('\n') {
        Some((_, rest)) => rest,
        None => return "",
    };
    match body.rfind('\n') {
        Some(idx) => &body[..idx],
        None => "",
    }
}

/// Parse a JSON completion, tolerating a markdown code fence around it.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        tracing::error!(
            response = %crate::error::truncate_chars(text, crate::error::MAX_DIAGNOSTIC_CHARS),
            "Completion was not the expected JSON: {e}"
        );
        CoreError::MalformedResponse(format!("Expected JSON: {e}"))
    })
}

/// Turns prompts into content through a completion backend.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn CompletionBackend>,
    models: ModelDefaults,
}

impl Generator {
    pub fn new(backend: Arc<dyn CompletionBackend>, models: ModelDefaults) -> Self {
        Self { backend, models }
    }

    pub fn backend(&self) -> &Arc<dyn CompletionBackend> {
        &self.backend
    }

    async fn run(&self, prompt: Prompt, model: &str) -> Result<String> {
        let request = CompletionRequest::user(prompt.user)
            .with_system(prompt.system)
            .with_model(model);
        self.backend.complete(&request).await
    }

    async fn content(&self, prompt: Prompt) -> Result<String> {
        self.run(prompt, &self.models.content).await
    }

    async fn chat(&self, prompt: Prompt) -> Result<String> {
        self.run(prompt, &self.models.chat).await
    }

    pub async fn generate_lesson(
        &self,
        topic: &str,
        grade_level: u32,
        difficulty: &str,
        additional_context: &str,
    ) -> Result<GeneratedLesson> {
        let content = self
            .content(prompts::lesson_prompt(
                topic,
                grade_level,
                difficulty,
                additional_context,
            ))
            .await?;
        Ok(GeneratedLesson {
            title: extract_title(&content).unwrap_or_else(|| topic.to_string()),
            description: format!("AI-generated lesson about {topic} for grade {grade_level}"),
            estimated_minutes: estimated_minutes(difficulty),
            content,
        })
    }

    pub async fn generate_lesson_from_research(
        &self,
        input: &ResearchLessonInput,
    ) -> Result<GeneratedLesson> {
        let content = self.content(prompts::research_lesson_prompt(input)).await?;
        Ok(GeneratedLesson {
            title: extract_title(&content).unwrap_or_else(|| input.topic.clone()),
            description: format!(
                "Research-backed lesson about {} for grade {}",
                input.topic, input.grade_level
            ),
            estimated_minutes: estimated_minutes(&input.difficulty),
            content,
        })
    }

    pub async fn generate_quiz(
        &self,
        lesson_content: &str,
        num_questions: u32,
        grade_level: u32,
    ) -> Result<Quiz> {
        let text = self
            .content(prompts::quiz_prompt(lesson_content, num_questions, grade_level))
            .await?;
        parse_json_response(&text)
    }

    pub async fn generate_math_problem(&self, topic: &str, grade_level: u32) -> Result<MathProblem> {
        let text = self
            .content(prompts::math_problem_prompt(topic, grade_level))
            .await?;
        parse_json_response(&text)
    }

    pub async fn generate_curriculum_outline(
        &self,
        concept: &str,
        grade_level: u32,
        duration_weeks: u32,
        lessons_per_week: u32,
        difficulty: &str,
    ) -> Result<CurriculumOutline> {
        let text = self
            .content(prompts::curriculum_outline_prompt(
                concept,
                grade_level,
                duration_weeks,
                lessons_per_week,
                difficulty,
            ))
            .await?;
        parse_json_response(&text)
    }

    pub async fn generate_curriculum_lesson(
        &self,
        input: &CurriculumLessonInput,
    ) -> Result<GeneratedLesson> {
        let content = self.content(prompts::curriculum_lesson_prompt(input)).await?;
        let description = if input.lesson_description.is_empty() {
            format!("Week {} lesson about {}", input.week_number, input.lesson_title)
        } else {
            input.lesson_description.clone()
        };
        Ok(GeneratedLesson {
            title: extract_title(&content).unwrap_or_else(|| input.lesson_title.clone()),
            description,
            estimated_minutes: estimated_minutes(&input.difficulty),
            content,
        })
    }

    pub async fn suggest_topics(
        &self,
        subject_name: &str,
        subject_description: &str,
    ) -> Result<Vec<TopicSuggestion>> {
        let text = self
            .content(prompts::topic_suggestions_prompt(
                subject_name,
                subject_description,
            ))
            .await?;
        let parsed: TopicSuggestions = parse_json_response(&text)?;
        Ok(parsed.topics)
    }

    /// Progressive quiz hint. Short, so it runs on the chat model.
    pub async fn generate_hint(
        &self,
        question_text: &str,
        choices: &[String],
        attempt: u32,
    ) -> Result<String> {
        let prompt = prompts::hint_prompt(question_text, choices, attempt);
        let request = CompletionRequest::user(prompt.user)
            .with_system(prompt.system)
            .with_model(self.models.chat.clone())
            .with_max_tokens(HINT_MAX_TOKENS);
        self.backend.complete(&request).await
    }

    pub async fn generate_feedback(
        &self,
        journal_content: &str,
        kid_name: &str,
        age: Option<u32>,
    ) -> Result<String> {
        self.chat(prompts::feedback_prompt(journal_content, kid_name, age))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::completion::TextStream;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Replies with a fixed text and records every request.
    struct Canned {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionBackend for Canned {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(request.clone());
            Ok(self.reply.clone())
        }

        async fn stream(&self, _request: &CompletionRequest) -> Result<TextStream> {
            Err(CoreError::InvalidInput("not used".to_string()))
        }

        fn name(&self) -> &'static str {
            "canned"
        }
    }

    fn generator(reply: &str) -> (Generator, Arc<Canned>) {
        let backend = Arc::new(Canned {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let models = ModelDefaults {
            content: "content-model".to_string(),
            chat: "chat-model".to_string(),
        };
        (Generator::new(backend.clone(), models), backend)
    }

    #[test]
    fn test_estimated_minutes() {
        assert_eq!(estimated_minutes("easy"), 15);
        assert_eq!(estimated_minutes("medium"), 20);
        assert_eq!(estimated_minutes("hard"), 25);
        assert_eq!(estimated_minutes(""), 25);
        assert_eq!(estimated_minutes("EXTREME"), 25);
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("Intro text\n# 🌋 Volcanoes Rock!  \n## Hook"),
            Some("🌋 Volcanoes Rock!".to_string())
        );
        assert_eq!(extract_title("## Only a subheading"), None);
        assert_eq!(extract_title("#NoSpace"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  ```\n{\"a\":1}\n```  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_json_response_errors_are_malformed() {
        let result: Result<MathProblem> = parse_json_response("Sorry, I can't do that.");
        assert!(matches!(result, Err(CoreError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_generate_lesson_uses_heading_and_content_model() {
        let (generator, backend) = generator("# Fire Mountains\n\nLava is hot.");
        let lesson = generator
            .generate_lesson("Volcanoes", 4, "easy", "")
            .await
            .unwrap_or_else(|e| panic!("generate failed: {e}"));
        assert_eq!(lesson.title, "Fire Mountains");
        assert_eq!(lesson.estimated_minutes, 15);
        assert_eq!(
            lesson.description,
            "AI-generated lesson about Volcanoes for grade 4"
        );

        let seen = backend
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen[0].model.as_deref(), Some("content-model"));
        assert_eq!(seen[0].system.as_deref(), Some(prompts::LESSON_GENERATOR_PROMPT));
    }

    #[tokio::test]
    async fn test_lesson_title_falls_back_to_topic() {
        let (generator, _) = generator("No heading here.");
        let lesson = generator
            .generate_lesson("Volcanoes", 4, "medium", "")
            .await
            .unwrap_or_else(|e| panic!("generate failed: {e}"));
        assert_eq!(lesson.title, "Volcanoes");
    }

    #[tokio::test]
    async fn test_fenced_math_problem() {
        let (generator, _) = generator(
            "```json\n{\"problem_text\":\"3 + 4 = ?\",\"difficulty\":\"easy\",\"hint\":\"Count up\"}\n```",
        );
        let problem = generator
            .generate_math_problem("addition", 1)
            .await
            .unwrap_or_else(|e| panic!("generate failed: {e}"));
        assert_eq!(problem.problem_text, "3 + 4 = ?");
        assert_eq!(problem.hint, "Count up");
    }

    #[tokio::test]
    async fn test_curriculum_lesson_description_fallback() {
        let (generator, _) = generator("plain text");
        let input = CurriculumLessonInput {
            week_number: 2,
            lesson_title: "Saving".to_string(),
            difficulty: "hard".to_string(),
            ..Default::default()
        };
        let lesson = generator
            .generate_curriculum_lesson(&input)
            .await
            .unwrap_or_else(|e| panic!("generate failed: {e}"));
        assert_eq!(lesson.title, "Saving");
        assert_eq!(lesson.description, "Week 2 lesson about Saving");
        assert_eq!(lesson.estimated_minutes, 25);
    }

    #[tokio::test]
    async fn test_hint_uses_chat_model_and_small_budget() {
        let (generator, backend) = generator("Think about pairs.");
        let hint = generator
            .generate_hint("2+2?", &["3".to_string(), "4".to_string()], 2)
            .await
            .unwrap_or_else(|e| panic!("hint failed: {e}"));
        assert_eq!(hint, "Think about pairs.");

        let seen = backend
            .seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(seen[0].model.as_deref(), Some("chat-model"));
        assert_eq!(seen[0].max_tokens, Some(HINT_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_suggest_topics_unwraps_list() {
        let (generator, _) = generator(
            r#"{"topics":[{"name":"Coins","description":"Kinds of coins","grade_level_min":1,"grade_level_max":3}]}"#,
        );
        let topics = generator
            .suggest_topics("Money", "")
            .await
            .unwrap_or_else(|e| panic!("suggest failed: {e}"));
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, "Coins");
    }
}
