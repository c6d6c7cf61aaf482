//! Handwritten answer evaluation through a vision-capable chat completions API.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Duration;

use crate::config::AppConfig;
use crate::error::{BackendKind, CoreError, Result};
use crate::generate::strip_code_fence;

const EVALUATION_MAX_TOKENS: u32 = 300;
const FALLBACK_FEEDBACK: &str = "Great effort! Let me take another look at your work.";

/// Verdict on one drawn answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub correct: bool,
    pub correct_answer: String,
    pub feedback: String,
}

impl Evaluation {
    fn fallback() -> Self {
        Self {
            correct: false,
            correct_answer: String::new(),
            feedback: FALLBACK_FEEDBACK.to_string(),
        }
    }

    /// Lenient read of the model's JSON: wrong-typed fields become defaults.
    fn from_value(value: &Value) -> Self {
        let text = |key: &str| match value.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            correct: value.get("correct").and_then(Value::as_bool).unwrap_or(false),
            correct_answer: text("correct_answer"),
            feedback: text("feedback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl VisionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.vision.base_url.clone(),
            model: config.vision.model.clone(),
            api_key: config.credentials.openai_api_key.clone(),
            timeout: Duration::from_secs(config.completion.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

pub fn evaluation_prompt(problem: &str, grade_level: u32) -> String {
    let age = grade_level.saturating_add(5);
    format!(
        "The math problem shown to the student was: {problem}. \
         The student drew this answer on a canvas. \
         Look at their work and tell me: \
         (1) Is the answer correct? \
         (2) If wrong, what is the correct answer? \
         (3) Give one short encouraging sentence. \
         Keep language appropriate for a child aged {age} years. \
         Respond ONLY with valid JSON: \
         {{\"correct\": true/false, \"correct_answer\": \"...\", \"feedback\": \"...\"}}"
    )
}

pub struct VisionEvaluator {
    client: reqwest::Client,
    config: VisionConfig,
}

impl VisionEvaluator {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Judge a base64 PNG of the kid's work against `problem`.
    ///
    /// An unparseable verdict degrades to an encouraging "not correct" reply;
    /// transport and status failures are errors.
    pub async fn evaluate(
        &self,
        problem: &str,
        image_base64: &str,
        grade_level: u32,
    ) -> Result<Evaluation> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CoreError::Credential("OpenAI API key is not configured".to_string()))?;

        let body = json!({
            "model": self.config.model,
            "max_tokens": EVALUATION_MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": evaluation_prompt(problem, grade_level)},
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:image/png;base64,{image_base64}")}
                    }
                ]
            }]
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                CoreError::backend(BackendKind::Vision, None, format!("Request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Vision request failed");
            return Err(CoreError::backend(
                BackendKind::Vision,
                Some(status.as_u16()),
                text,
            ));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| CoreError::MalformedResponse(format!("Invalid vision response: {e}")))?;
        let raw = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(parse_evaluation(&raw))
    }
}

pub fn parse_evaluation(raw: &str) -> Evaluation {
    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(value) if value.is_object() => Evaluation::from_value(&value),
        _ => {
            tracing::error!(raw, "Failed to parse vision response as JSON");
            Evaluation::fallback()
        }
    }
}
