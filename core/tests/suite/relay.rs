use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use mindcraft_core::chat::{ChatRelay, RelayEvent};
use mindcraft_core::completion::{CompletionBackend, CompletionRequest, TextStream};
use mindcraft_core::db::Store;
use mindcraft_core::error::{CoreError, Result};
use mindcraft_core::models::{ChatSession, ContextType, NewChatSession, Role};
use pretty_assertions::assert_eq;

use super::support::{ScriptedCompletion, backend_error, kid, temp_store};

async fn new_chat(store: &Store, daily_chat_limit: Option<u32>) -> ChatSession {
    let ada = kid(store, daily_chat_limit).await;
    store
        .create_chat_session(NewChatSession {
            kid_id: ada.id,
            title: None,
            context_type: ContextType::General,
            context_id: None,
        })
        .await
        .expect("chat session")
}

fn relay(store: &Store, backend: Arc<dyn CompletionBackend>) -> ChatRelay {
    ChatRelay::new(
        store.clone(),
        backend,
        "claude-test",
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn streamed_reply_is_stored_once() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let session = new_chat(&store, None).await;
    let backend = ScriptedCompletion::new();
    backend.stream_reply(vec![Ok("Hi".to_string()), Ok(" there".to_string())]);

    let events = relay(&store, backend.clone())
        .send(session.id, "  Why is the sky blue?  ", None)
        .await?
        .collect::<Vec<_>>()
        .await;
    assert_eq!(
        events,
        vec![
            RelayEvent::Chunk("Hi".to_string()),
            RelayEvent::Chunk(" there".to_string()),
            RelayEvent::Done("Hi there".to_string()),
        ]
    );

    let messages = store.list_messages(session.id).await?;
    let stored = messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        stored,
        vec![
            (Role::User, "Why is the sky blue?"),
            (Role::Assistant, "Hi there"),
        ]
    );
    let session = store.get_chat_session(session.id).await?.expect("session");
    assert_eq!(session.title, "Why is the sky blue?");

    let request = &backend.requests()[0];
    assert_eq!(request.model.as_deref(), Some("claude-test"));
    assert!(request.system.is_some());
    assert_eq!(request.messages.len(), 1);
    Ok(())
}

#[tokio::test]
async fn mid_stream_error_stores_no_reply() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let session = new_chat(&store, None).await;
    let backend = ScriptedCompletion::new();
    backend.stream_reply(vec![Ok("Hi".to_string()), Err(backend_error("connection reset"))]);

    let events = relay(&store, backend)
        .send(session.id, "Tell me a story", None)
        .await?
        .collect::<Vec<_>>()
        .await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], RelayEvent::Chunk("Hi".to_string()));
    assert!(matches!(events[1], RelayEvent::Error(_)), "{events:?}");

    let roles = store
        .list_messages(session.id)
        .await?
        .into_iter()
        .map(|m| m.role)
        .collect::<Vec<_>>();
    assert_eq!(roles, vec![Role::User]);
    Ok(())
}

#[tokio::test]
async fn later_turns_keep_history_and_title() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let session = new_chat(&store, None).await;
    let backend = ScriptedCompletion::new();
    backend.stream_reply(vec![Ok("Rayleigh scattering.".to_string())]);
    backend.stream_reply(vec![Ok("Sunsets are red too.".to_string())]);
    let relay = relay(&store, backend.clone());

    relay
        .send(session.id, "Why is the sky blue?", None)
        .await?
        .collect::<Vec<_>>()
        .await;
    relay
        .send(session.id, "And sunsets?", None)
        .await?
        .collect::<Vec<_>>()
        .await;

    assert_eq!(backend.requests()[1].messages.len(), 3);
    let session = store.get_chat_session(session.id).await?.expect("session");
    assert_eq!(session.title, "Why is the sky blue?");
    assert_eq!(store.list_messages(session.id).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn checks_fail_before_streaming() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let session = new_chat(&store, Some(1)).await;
    let backend = ScriptedCompletion::new();
    backend.stream_reply(vec![Ok("Hello!".to_string())]);
    let relay = relay(&store, backend.clone());

    let err = relay.send(session.id, "   ", None).await.err();
    assert!(matches!(err, Some(CoreError::InvalidInput(_))));
    assert!(store.list_messages(session.id).await?.is_empty());

    relay
        .send(session.id, "Hi", None)
        .await?
        .collect::<Vec<_>>()
        .await;
    match relay.send(session.id, "Hi again", None).await.err() {
        Some(CoreError::RateLimited(message)) => assert_eq!(
            message,
            "You've reached your daily chat limit of 1 messages. Come back tomorrow! 🌅"
        ),
        other => panic!("expected rate limit, got {other:?}"),
    }

    let err = relay.send(session.id + 1000, "Hi", None).await.err();
    assert!(matches!(err, Some(CoreError::NotFound(_))));
    assert_eq!(backend.requests().len(), 1);
    Ok(())
}

/// Sends one fragment and then never finishes.
struct StalledBackend;

#[async_trait]
impl CompletionBackend for StalledBackend {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Err(backend_error("not used"))
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<TextStream> {
        Ok(Box::pin(
            stream::iter(vec![Ok("Thinking".to_string())]).chain(stream::pending()),
        ))
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

#[tokio::test]
async fn idle_stream_times_out() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let session = new_chat(&store, None).await;

    let events = relay(&store, Arc::new(StalledBackend))
        .send(session.id, "Are you there?", None)
        .await?
        .collect::<Vec<_>>()
        .await;
    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], RelayEvent::Error(_)), "{events:?}");
    assert_eq!(store.list_messages(session.id).await?.len(), 1);
    Ok(())
}
