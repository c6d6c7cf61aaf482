//! Scripted backends and fixtures shared by the integration tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use mindcraft_core::completion::{CompletionBackend, CompletionRequest, TextStream};
use mindcraft_core::config::ModelDefaults;
use mindcraft_core::db::Store;
use mindcraft_core::error::{BackendKind, CoreError, Result};
use mindcraft_core::generate::Generator;
use mindcraft_core::models::{Citation, KidProfile, MediaType, NewKid, NewSubject, Subject};
use mindcraft_core::research::{DiscoveredMedia, ResearchBackend, ResearchResult};
use serde_json::json;
use tempfile::TempDir;

pub fn backend_error(message: &str) -> CoreError {
    CoreError::backend(BackendKind::Api, Some(500), message)
}

/// Completion backend that replays queued replies and records requests.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    streams: Mutex<VecDeque<Vec<Result<String>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, reply: Result<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn stream_reply(&self, fragments: Vec<Result<String>>) {
        self.streams.lock().unwrap().push_back(fragments);
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(backend_error("no scripted reply")))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        self.requests.lock().unwrap().push(request.clone());
        let fragments = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| backend_error("no scripted stream"))?;
        Ok(Box::pin(stream::iter(fragments)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Research backend with a fixed answer, or a failure when `failing`.
#[derive(Default)]
pub struct FakeResearch {
    failing: bool,
    calls: AtomicUsize,
}

impl FakeResearch {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchBackend for FakeResearch {
    async fn research_topic(
        &self,
        topic: &str,
        _grade_level: u32,
        _subject: &str,
    ) -> Result<ResearchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CoreError::backend(
                BackendKind::Research,
                Some(503),
                "service unavailable",
            ));
        }
        Ok(ResearchResult {
            summary: format!("All about {topic}."),
            key_facts: vec!["Lava is molten rock".to_string()],
            citations: vec![Citation {
                url: "https://example.org/volcanoes".to_string(),
                title: "Source 1".to_string(),
            }],
            raw_response: json!({
                "content": "## Summary\nAll about volcanoes.",
                "model": "sonar",
                "citations": ["https://example.org/volcanoes"],
            }),
        })
    }

    async fn discover_multimedia(
        &self,
        _topic: &str,
        _grade_level: u32,
        _subject: &str,
    ) -> Result<Vec<DiscoveredMedia>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(CoreError::backend(BackendKind::Research, Some(503), "down"));
        }
        Ok(vec![
            DiscoveredMedia {
                url: "https://www.youtube.com/watch?v=abc123".to_string(),
                title: "Volcano video".to_string(),
                description: "Eruptions up close".to_string(),
                media_type: MediaType::Youtube,
                thumbnail_url: "https://img.youtube.com/vi/abc123/hqdefault.jpg".to_string(),
            },
            DiscoveredMedia {
                url: "https://example.org/volcano-article".to_string(),
                title: "Volcano article".to_string(),
                description: String::new(),
                media_type: MediaType::Article,
                thumbnail_url: String::new(),
            },
        ])
    }
}

pub fn temp_store() -> (Store, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = Store::open(&dir.path().join("mindcraft.db"), 4).expect("open store");
    (store, dir)
}

pub fn generator(backend: Arc<ScriptedCompletion>) -> Generator {
    Generator::new(backend, ModelDefaults::default())
}

pub async fn kid(store: &Store, daily_chat_limit: Option<u32>) -> KidProfile {
    store
        .create_kid(
            NewKid {
                display_name: "Ada".to_string(),
                grade_level: 4,
                age: Some(9),
                daily_chat_limit,
            },
            50,
        )
        .await
        .expect("create kid")
}

pub async fn subject(store: &Store, name: &str) -> Subject {
    store
        .create_subject(NewSubject::named(name))
        .await
        .expect("create subject")
}
