//! Research adapter: topic research and media discovery through a
//! search-augmented chat completions API.

pub mod parse;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Duration;

use crate::config::AppConfig;
use crate::error::{BackendKind, CoreError, Result};
use crate::models::{Citation, MediaType};
use crate::prompts;

/// Parsed output of one research call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchResult {
    pub summary: String,
    pub key_facts: Vec<String>,
    pub citations: Vec<Citation>,
    /// `{content, model, citations: [urls]}`
    pub raw_response: Value,
}

/// One resource suggested by media discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredMedia {
    pub url: String,
    pub title: String,
    pub description: String,
    pub media_type: MediaType,
    pub thumbnail_url: String,
}

#[async_trait]
pub trait ResearchBackend: Send + Sync {
    async fn research_topic(
        &self,
        topic: &str,
        grade_level: u32,
        subject: &str,
    ) -> Result<ResearchResult>;

    async fn discover_multimedia(
        &self,
        topic: &str,
        grade_level: u32,
        subject: &str,
    ) -> Result<Vec<DiscoveredMedia>>;
}

#[derive(Debug, Clone)]
pub struct PerplexityConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl PerplexityConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.research.base_url.clone(),
            model: config.research.model.clone(),
            api_key: config.credentials.perplexity_api_key.clone(),
            timeout: Duration::from_secs(config.completion.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible error body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Perplexity Sonar client.
pub struct PerplexityClient {
    client: reqwest::Client,
    config: PerplexityConfig,
}

impl PerplexityClient {
    pub fn new(config: PerplexityConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                CoreError::Credential(
                    "Perplexity API key is invalid or missing. Check PERPLEXITY_API_KEY in .env."
                        .to_string(),
                )
            })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                CoreError::Credential("Perplexity API key contains invalid characters".to_string())
            })?,
        );
        Ok(headers)
    }

    /// Run one system + user exchange and return the raw completion.
    async fn ask(&self, system: String, user: String) -> Result<ChatCompletion> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                CoreError::backend(BackendKind::Research, None, format!("Request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Research request failed");
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(CoreError::backend(
                BackendKind::Research,
                Some(status.as_u16()),
                message,
            ));
        }

        response.json().await.map_err(|e| {
            CoreError::MalformedResponse(format!("Invalid research response: {e}"))
        })
    }
}

fn first_content(completion: &ChatCompletion) -> String {
    completion
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .unwrap_or_default()
}

#[async_trait]
impl ResearchBackend for PerplexityClient {
    async fn research_topic(
        &self,
        topic: &str,
        grade_level: u32,
        subject: &str,
    ) -> Result<ResearchResult> {
        tracing::info!(topic, grade_level, "Researching topic");
        let completion = self
            .ask(
                prompts::research_system_prompt(grade_level, subject),
                prompts::research_user_message(topic),
            )
            .await?;

        let content = first_content(&completion);
        let urls = completion.citations.unwrap_or_default();
        Ok(ResearchResult {
            summary: parse::parse_summary(&content),
            key_facts: parse::parse_key_facts(&content),
            citations: parse::citations_from_urls(&urls),
            raw_response: json!({
                "content": content,
                "model": self.config.model,
                "citations": urls,
            }),
        })
    }

    async fn discover_multimedia(
        &self,
        topic: &str,
        grade_level: u32,
        subject: &str,
    ) -> Result<Vec<DiscoveredMedia>> {
        tracing::info!(topic, grade_level, "Discovering media");
        let completion = self
            .ask(
                prompts::media_discovery_system_prompt(grade_level, subject),
                prompts::media_user_message(topic),
            )
            .await?;
        let media = parse::parse_media_list(&first_content(&completion));
        tracing::debug!(count = media.len(), "Media discovery parsed");
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> PerplexityClient {
        PerplexityClient::new(PerplexityConfig {
            base_url: server.uri(),
            model: "sonar".to_string(),
            api_key: key.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_research_topic_parses_sections_and_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-test"))
            .and(body_partial_json(json!({"model": "sonar"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content":
                    "## Summary\nBees pollinate.\n\n## Key Facts\n- Bees dance\n- Bees buzz"}}],
                "citations": ["https://a.example", "https://b.example"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server, Some("pplx-test"))
            .research_topic("Bees", 3, "Science")
            .await
            .unwrap_or_else(|e| panic!("research failed: {e}"));

        assert_eq!(result.summary, "Bees pollinate.");
        assert_eq!(result.key_facts, vec!["Bees dance", "Bees buzz"]);
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.citations[0].title, "Source 1");
        assert_eq!(result.raw_response["model"], "sonar");
        assert_eq!(result.raw_response["citations"][1], "https://b.example");
    }

    #[tokio::test]
    async fn test_missing_key_is_credential_error() {
        let server = MockServer::start().await;
        let err = client(&server, None)
            .research_topic("Bees", 3, "Science")
            .await
            .err();
        assert!(matches!(err, Some(CoreError::Credential(_))));
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Invalid API key", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Some("bad"))
            .discover_multimedia("Bees", 3, "Science")
            .await
            .err();
        match err {
            Some(
                ref e @ CoreError::Backend {
                    kind: BackendKind::Research,
                    status: Some(401),
                    ..
                },
            ) => assert_eq!(
                e.public_message(),
                "Perplexity API key is invalid or missing. Check PERPLEXITY_API_KEY in .env."
            ),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discover_multimedia_parses_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content":
                    "[YOUTUBE] Bee Dance | https://youtu.be/abcdefghijk | Waggle dance\nchatter"}}]
            })))
            .mount(&server)
            .await;

        let media = client(&server, Some("k"))
            .discover_multimedia("Bees", 3, "Science")
            .await
            .unwrap_or_else(|e| panic!("discovery failed: {e}"));
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].media_type, MediaType::Youtube);
        assert_eq!(
            media[0].thumbnail_url,
            "https://img.youtube.com/vi/abcdefghijk/mqdefault.jpg"
        );
    }
}
