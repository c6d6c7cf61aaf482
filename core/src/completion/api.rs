//! Anthropic Messages API backend.
//!
//! Non-streaming calls read the first text block of the response. Streaming
//! calls parse the server-sent event stream and forward `text_delta`s.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

use super::CompletionBackend;
use super::credentials::{Credential, resolve_credential};
use super::types::{CompletionRequest, Role, TextStream};
use crate::config::{AppConfig, ModelDefaults};
use crate::error::{BackendKind, CoreError, Result};

/// Anthropic API version header.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Upper bound for one non-streaming response.
const MAX_COMPLETE_TOKENS: u32 = 8192;

#[derive(Debug, Clone)]
pub struct ApiBackendConfig {
    /// Base URL without the `/v1/messages` suffix.
    pub base_url: String,
    pub models: ModelDefaults,
    /// Default `max_tokens` for streaming calls.
    pub max_tokens: u32,
    /// Whole-call limit for `complete`. For `stream` it bounds the wait for
    /// the response head and the gap between chunks.
    pub timeout: Duration,
}

impl ApiBackendConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.completion.api_base_url.clone(),
            models: config.completion.models.clone(),
            max_tokens: config.completion.max_tokens,
            timeout: Duration::from_secs(config.completion.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Streaming events. Only text deltas, the stop marker and errors matter.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum SseEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaData },

    #[serde(rename = "message_stop")]
    MessageStop,

    #[serde(rename = "error")]
    Error { error: AnthropicError },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeltaData {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// What one parsed SSE event means for the text stream.
#[derive(Debug, PartialEq, Eq)]
enum SseOutcome {
    Text(String),
    Stop,
}

pub struct ApiBackend {
    client: reqwest::Client,
    credential: Credential,
    config: ApiBackendConfig,
}

impl ApiBackend {
    pub fn new(credential: Credential, config: ApiBackendConfig) -> Self {
        Self::with_client(reqwest::Client::new(), credential, config)
    }

    /// Build from application config, resolving credentials up front.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let credential = resolve_credential(&config.credentials)?;
        Ok(Self::new(credential, ApiBackendConfig::from_app_config(config)))
    }

    /// Creates a backend with a custom HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        credential: Credential,
        config: ApiBackendConfig,
    ) -> Self {
        Self {
            client,
            credential,
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        self.credential.apply(&mut headers)?;
        Ok(headers)
    }

    fn build_request_body(
        request: &CompletionRequest,
        model: &str,
        max_tokens: u32,
        stream: bool,
    ) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|turn| turn.role != Role::System)
            .map(|turn| json!({ "role": turn.role.as_str(), "content": turn.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages,
        });
        if stream {
            body["stream"] = json!(true);
        }
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        body
    }

    async fn post(&self, body: &Value, stream: bool) -> Result<reqwest::Response> {
        let request = self
            .client
            .post(self.endpoint())
            .headers(self.headers()?)
            .json(body);
        let sent = if stream {
            tokio::time::timeout(self.config.timeout, request.send())
                .await
                .map_err(|_| {
                    CoreError::backend(
                        BackendKind::Api,
                        None,
                        format!("No response within {}s", self.config.timeout.as_secs()),
                    )
                })?
        } else {
            request.timeout(self.config.timeout).send().await
        };
        let response = sent
            .map_err(|e| CoreError::backend(BackendKind::Api, None, format!("Request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), "Anthropic API request failed");
        let message = match serde_json::from_str::<ErrorResponse>(&error_text) {
            Ok(parsed) => format!("{}: {}", parsed.error.error_type, parsed.error.message),
            Err(_) => error_text,
        };
        Err(CoreError::backend(
            BackendKind::Api,
            Some(status.as_u16()),
            message,
        ))
    }

    async fn process_stream(
        mut stream: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin,
        idle_timeout: Duration,
        tx: &mpsc::Sender<Result<String>>,
    ) -> Result<()> {
        // Raw bytes: a multi-byte character may be split across chunks.
        let mut buffer = Vec::new();

        loop {
            let next = tokio::time::timeout(idle_timeout, stream.next())
                .await
                .map_err(|_| {
                    CoreError::backend(
                        BackendKind::Api,
                        None,
                        format!("Stream idle for {}s", idle_timeout.as_secs()),
                    )
                })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| {
                CoreError::backend(BackendKind::Api, None, format!("Stream interrupted: {e}"))
            })?;
            buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

            while let Some(event) = extract_sse_event(&mut buffer) {
                match parse_sse_event(&event)? {
                    Some(SseOutcome::Text(text)) => {
                        if tx.send(Ok(text)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Some(SseOutcome::Stop) => return Ok(()),
                    None => {}
                }
            }
        }

        Ok(())
    }
}

/// Removes and decodes the first complete SSE event in `buffer`.
///
/// Carriage returns are stripped before bytes reach the buffer.
fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.windows(2).position(|pair| pair == b"\n\n")?;
    let event = String::from_utf8_lossy(&buffer[..pos]).into_owned();
    buffer.drain(..pos + 2);
    Some(event)
}

fn parse_sse_event(event_str: &str) -> Result<Option<SseOutcome>> {
    let data: String = event_str
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();

    if data.is_empty() {
        return Ok(None);
    }

    let parsed: SseEvent = serde_json::from_str(&data)
        .map_err(|e| CoreError::MalformedResponse(format!("Failed to parse SSE event: {e}")))?;

    match parsed {
        SseEvent::ContentBlockDelta {
            delta: DeltaData::TextDelta { text },
        } if !text.is_empty() => Ok(Some(SseOutcome::Text(text))),
        SseEvent::MessageStop => Ok(Some(SseOutcome::Stop)),
        SseEvent::Error { error } => Err(CoreError::backend(
            BackendKind::Api,
            None,
            format!("{}: {}", error.error_type, error.message),
        )),
        _ => Ok(None),
    }
}

#[async_trait]
impl CompletionBackend for ApiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.models.content);
        let max_tokens = request
            .max_tokens
            .unwrap_or(MAX_COMPLETE_TOKENS)
            .min(MAX_COMPLETE_TOKENS);
        let body = Self::build_request_body(request, model, max_tokens, false);

        tracing::info!(model, max_tokens, "Calling Anthropic messages API");
        let response = self.post(&body, false).await?;
        let parsed: MessageResponse = response.json().await.map_err(|e| {
            CoreError::MalformedResponse(format!("Invalid messages response: {e}"))
        })?;

        parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| CoreError::MalformedResponse("Response has no text block".to_string()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        let model = request.model.as_deref().unwrap_or(&self.config.models.chat);
        let max_tokens = request.max_tokens.unwrap_or(self.config.max_tokens);
        let body = Self::build_request_body(request, model, max_tokens, true);

        tracing::info!(model, max_tokens, "Streaming from Anthropic messages API");
        let response = self.post(&body, true).await?;

        let (tx, rx) = mpsc::channel(100);
        let stream = response.bytes_stream();
        let idle_timeout = self.config.timeout;
        tokio::spawn(async move {
            if let Err(e) = Self::process_stream(stream, idle_timeout, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::completion::types::Turn;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, credential: Credential) -> ApiBackend {
        ApiBackend::new(
            credential,
            ApiBackendConfig {
                base_url: server.uri(),
                models: ModelDefaults::default(),
                max_tokens: 16000,
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn test_extract_sse_event() {
        let mut buffer =
            b"event: message_start\ndata: {\"type\":\"message_start\"}\n\nremaining".to_vec();
        assert_eq!(
            extract_sse_event(&mut buffer).as_deref(),
            Some("event: message_start\ndata: {\"type\":\"message_start\"}")
        );
        assert_eq!(buffer, b"remaining");
        assert_eq!(extract_sse_event(&mut buffer), None);
    }

    async fn fragments(
        chunks: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin,
        idle_timeout: Duration,
    ) -> Vec<Result<String>> {
        let (tx, mut rx) = mpsc::channel(16);
        if let Err(e) = ApiBackend::process_stream(chunks, idle_timeout, &tx).await {
            let _ = tx.send(Err(e)).await;
        }
        drop(tx);
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    fn chunked(parts: Vec<Vec<u8>>) -> impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin {
        futures::stream::iter(parts.into_iter().map(|part| Ok(bytes::Bytes::from(part))))
    }

    #[tokio::test]
    async fn test_multibyte_text_split_across_chunks() {
        let event = "event: content_block_delta\r\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \u{1F30B}\"}}\r\n\r\n";
        // Split inside the four-byte volcano emoji.
        let split = event.find('\u{1F30B}').unwrap_or_else(|| panic!("emoji present")) + 2;
        let (head, tail) = event.as_bytes().split_at(split);

        let out = fragments(chunked(vec![head.to_vec(), tail.to_vec()]), Duration::from_secs(5)).await;
        let texts: Vec<String> = out.into_iter().filter_map(|item| item.ok()).collect();
        assert_eq!(texts, vec!["Hi \u{1F30B}".to_string()]);
    }

    #[tokio::test]
    async fn test_stalled_stream_hits_idle_timeout() {
        let delta = b"data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n".to_vec();
        let stalled = chunked(vec![delta]).chain(futures::stream::pending());

        let out = fragments(stalled, Duration::from_millis(50)).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().ok().map(String::as_str), Some("Hello"));
        assert!(matches!(
            out[1],
            Err(CoreError::Backend {
                kind: BackendKind::Api,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_text_delta() {
        let event = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}";
        assert_eq!(
            parse_sse_event(event).ok().flatten(),
            Some(SseOutcome::Text("Hello".to_string()))
        );
    }

    #[test]
    fn test_parse_ignores_bookkeeping_events() {
        for event in [
            "event: ping\ndata: {\"type\":\"ping\"}",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\"}}",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\"}}",
        ] {
            assert_eq!(parse_sse_event(event).ok().flatten(), None, "{event}");
        }
    }

    #[test]
    fn test_parse_error_event() {
        let event = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}";
        assert!(matches!(
            parse_sse_event(event),
            Err(CoreError::Backend {
                kind: BackendKind::Api,
                ..
            })
        ));
    }

    #[test]
    fn test_request_body_drops_system_turns() {
        let request = CompletionRequest::new(vec![
            Turn {
                role: Role::System,
                content: "ignored".to_string(),
            },
            Turn::user("Hello"),
        ])
        .with_system("Be brief.");
        let body = ApiBackend::build_request_body(&request, "m", 100, true);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_complete_returns_first_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "# Volcanoes\n\nHot rocks."}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = backend(&server, Credential::ApiKey("sk-test".to_string()))
            .complete(&CompletionRequest::user("Write a lesson").with_max_tokens(50_000))
            .await
            .unwrap_or_else(|e| panic!("complete failed: {e}"));
        assert_eq!(text, "# Volcanoes\n\nHot rocks.");

        let requests = server.received_requests().await.unwrap_or_default();
        let body: Value = requests
            .first()
            .and_then(|r| serde_json::from_slice(&r.body).ok())
            .unwrap_or_default();
        assert_eq!(body["max_tokens"], MAX_COMPLETE_TOKENS);
    }

    #[tokio::test]
    async fn test_error_status_becomes_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "type": "error",
                "error": {"type": "rate_limit_error", "message": "Slow down"}
            })))
            .mount(&server)
            .await;

        let err = backend(&server, Credential::OAuthToken("tok".to_string()))
            .complete(&CompletionRequest::user("x"))
            .await
            .err();
        match err {
            Some(CoreError::Backend {
                kind: BackendKind::Api,
                status: Some(429),
                diagnostic,
            }) => assert_eq!(diagnostic, "rate_limit_error: Slow down"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_forwards_text_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"m\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: ping\ndata: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let stream = backend(&server, Credential::ApiKey("sk-test".to_string()))
            .stream(&CompletionRequest::user("hello"))
            .await
            .unwrap_or_else(|e| panic!("stream failed: {e}"));
        let fragments: Vec<String> = stream
            .map(|item| item.unwrap_or_else(|e| panic!("fragment error: {e}")))
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hi".to_string(), " there".to_string()]);
    }
}
