//! Completion backend adapter.
//!
//! Two interchangeable ways of turning a prompt into generated text: the
//! `claude` command-line tool ([`CliBackend`]) and the hosted messages API
//! ([`ApiBackend`]). Callers hold an `Arc<dyn CompletionBackend>` built by
//! [`build_backend`].

mod api;
mod cli;
pub mod credentials;
pub mod stream;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use api::{ApiBackend, ApiBackendConfig};
pub use cli::{CliBackend, CliBackendConfig};
pub use credentials::{Credential, resolve_credential};
pub use types::{CompletionRequest, Role, TextStream, Turn, flatten_prompt};

use crate::config::{AppConfig, CompletionBackendKind};
use crate::error::Result;

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Full text of one completion. Without a model override the content
    /// model is used.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Incremental fragments of one completion. Without a model override the
    /// chat model is used. Dropping the stream cancels the call.
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream>;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

/// Build the backend selected by `completion.backend`.
pub fn build_backend(config: &AppConfig) -> Result<Arc<dyn CompletionBackend>> {
    let backend: Arc<dyn CompletionBackend> = match config.completion.backend {
        CompletionBackendKind::Cli => {
            Arc::new(CliBackend::new(CliBackendConfig::from_app_config(config)))
        }
        CompletionBackendKind::Api => Arc::new(ApiBackend::from_app_config(config)?),
    };
    tracing::info!(backend = backend.name(), "Completion backend ready");
    Ok(backend)
}
