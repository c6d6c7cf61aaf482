use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
pub use crate::models::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One completion call: conversation, optional system prompt and overrides.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Turn>,
    pub system: Option<String>,
    /// Falls back to the backend's default for the call shape.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Turn>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// A single user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(vec![Turn::user(content)])
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = (!system.is_empty()).then_some(system);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Lazy, finite, forward-only sequence of text fragments.
///
/// Dropping the stream cancels the underlying process or HTTP response.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Flatten a conversation into a single prompt for tools that take plain text.
///
/// A lone message is passed through untouched; otherwise each user and
/// assistant turn becomes a `Role: text` paragraph. System turns are dropped.
pub fn flatten_prompt(messages: &[Turn]) -> String {
    if let [only] = messages {
        return only.content.clone();
    }

    messages
        .iter()
        .filter_map(|turn| match turn.role {
            Role::User => Some(format!("User: {}", turn.content)),
            Role::Assistant => Some(format!("Assistant: {}", turn.content)),
            Role::System => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
