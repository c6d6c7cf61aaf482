//! Streams a tutor reply while persisting the conversation.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use super::context::{ChatContext, system_prompt};
use super::safety::{check_rate_limit, validate_message};
use crate::completion::{CompletionBackend, CompletionRequest, Turn};
use crate::config::AppConfig;
use crate::db::Store;
use crate::error::{CoreError, Result, truncate_chars};
use crate::models::Role;

/// Characters of the first user message used as a chat title.
const TITLE_CHARS: usize = 50;
/// A chat keeps its default title only up to the first exchange.
const RETITLE_MAX_MESSAGES: u32 = 2;

const EMPTY_REPLY: &str = "Hmm, I'm having trouble thinking right now. Try asking again!";
const IDLE_TIMEOUT_REPLY: &str = "The tutor took too long to answer. Please try again.";

/// One SSE payload: `{"type": "chunk" | "done" | "error", "content": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum RelayEvent {
    /// A fragment, forwarded as soon as it arrives.
    Chunk(String),
    /// The full reply, after it was stored.
    Done(String),
    /// Sanitized failure. Nothing was stored for the reply.
    Error(String),
}

#[derive(Clone)]
pub struct ChatRelay {
    store: Store,
    backend: Arc<dyn CompletionBackend>,
    chat_model: String,
    idle_timeout: Duration,
}

impl ChatRelay {
    pub fn new(
        store: Store,
        backend: Arc<dyn CompletionBackend>,
        chat_model: impl Into<String>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            chat_model: chat_model.into(),
            idle_timeout,
        }
    }

    pub fn from_app_config(
        store: Store,
        backend: Arc<dyn CompletionBackend>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            store,
            backend,
            config.completion.models.chat.clone(),
            Duration::from_secs(config.chat.stream_idle_timeout_secs),
        )
    }

    /// Store the kid's message and stream the reply.
    ///
    /// Lookup, rate limit and validation failures are returned before any
    /// streaming starts. Once the stream is handed back, failures arrive as a
    /// single [`RelayEvent::Error`] and no assistant message is written.
    pub async fn send(
        &self,
        session_id: i64,
        message: &str,
        context: Option<ChatContext>,
    ) -> Result<impl Stream<Item = RelayEvent> + Send + 'static + use<>> {
        let session = self
            .store
            .get_chat_session(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Chat session {session_id}")))?;
        let kid = self
            .store
            .get_kid(session.kid_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Kid profile {}", session.kid_id)))?;

        check_rate_limit(&self.store, &kid).await?;
        let message = validate_message(message)?;

        self.store
            .append_message(session_id, Role::User, message.clone())
            .await?;

        let history = self
            .store
            .list_messages(session_id)
            .await?
            .into_iter()
            .filter(|stored| stored.role != Role::System)
            .map(|stored| Turn {
                role: stored.role,
                content: stored.content,
            })
            .collect();
        let system = system_prompt(&self.store, &session, &kid, context.as_ref()).await?;
        let request = CompletionRequest::new(history)
            .with_system(system)
            .with_model(self.chat_model.clone());

        info!(
            session_id,
            kid_id = kid.id,
            backend = self.backend.name(),
            "relaying chat message"
        );

        let store = self.store.clone();
        let backend = Arc::clone(&self.backend);
        let idle_timeout = self.idle_timeout;
        let title = truncate_chars(&message, TITLE_CHARS);

        Ok(async_stream::stream! {
            let mut fragments = match backend.stream(&request).await {
                Ok(fragments) => fragments,
                Err(err) => {
                    yield failed(session_id, &err);
                    return;
                }
            };

            let mut reply = String::new();
            loop {
                match tokio::time::timeout(idle_timeout, fragments.next()).await {
                    Ok(Some(Ok(fragment))) => {
                        reply.push_str(&fragment);
                        yield RelayEvent::Chunk(fragment);
                    }
                    Ok(Some(Err(err))) => {
                        yield failed(session_id, &err);
                        return;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        error!(
                            session_id,
                            idle_secs = idle_timeout.as_secs(),
                            "chat stream went idle"
                        );
                        yield RelayEvent::Error(IDLE_TIMEOUT_REPLY.to_string());
                        return;
                    }
                }
            }
            drop(fragments);

            if reply.trim().is_empty() {
                warn!(session_id, "chat backend returned an empty reply");
                yield RelayEvent::Error(EMPTY_REPLY.to_string());
                return;
            }

            if let Err(err) = store
                .append_message(session_id, Role::Assistant, reply.clone())
                .await
            {
                yield failed(session_id, &CoreError::from(err));
                return;
            }
            match store
                .retitle_new_chat(session_id, title, RETITLE_MAX_MESSAGES)
                .await
            {
                Ok(true) => info!(session_id, "chat titled from first message"),
                Ok(false) => {}
                Err(err) => warn!(session_id, error = %err, "could not retitle chat"),
            }
            yield RelayEvent::Done(reply);
        })
    }
}

fn failed(session_id: i64, err: &CoreError) -> RelayEvent {
    error!(session_id, error = ?err, "chat relay failed");
    RelayEvent::Error(err.public_message())
}
