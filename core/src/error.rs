use std::fmt;

use thiserror::Error;

use crate::db::DbError;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Longest diagnostic kept from a failing backend.
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

const CLI_DETAIL_LIMIT: usize = 200;
const PUBLIC_MESSAGE_LIMIT: usize = 300;
const GENERIC_EXTERNAL_ERROR: &str =
    "An external API error occurred. Check the server logs for details.";

/// Which external dependency produced a [`CoreError::Backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cli,
    Api,
    Research,
    Vision,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Cli => "Claude CLI",
            BackendKind::Api => "Anthropic API",
            BackendKind::Research => "Perplexity API",
            BackendKind::Vision => "Vision API",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or unusable provider credentials.
    #[error("{0}")]
    Credential(String),

    /// Subprocess exit, timeout, or API failure.
    #[error("{kind} error: {diagnostic}")]
    Backend {
        kind: BackendKind,
        status: Option<u16>,
        diagnostic: String,
    },

    /// Expected JSON or markdown shape not found in a completion.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Action invoked while the entity is not in a valid precursor state.
    #[error("{0}")]
    PipelineState(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    RateLimited(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl CoreError {
    /// Build a backend error, truncating the diagnostic.
    pub fn backend(kind: BackendKind, status: Option<u16>, diagnostic: impl AsRef<str>) -> Self {
        CoreError::Backend {
            kind,
            status,
            diagnostic: truncate_chars(diagnostic.as_ref().trim(), MAX_DIAGNOSTIC_CHARS),
        }
    }

    /// Short, caller-safe rendering of this error.
    ///
    /// Vendor internals, HTML error bodies and overly long messages are
    /// replaced with generic text; the full error belongs in the server log.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Backend {
                kind: BackendKind::Cli,
                diagnostic,
                ..
            } => {
                let lower = diagnostic.to_lowercase();
                if lower.contains("auth") || lower.contains("token") {
                    "Claude CLI authentication failed. Check your Claude Code login.".to_string()
                } else if diagnostic.chars().count() > CLI_DETAIL_LIMIT {
                    "Claude CLI error. Check the server logs for details.".to_string()
                } else {
                    format!("Claude CLI error: {diagnostic}")
                }
            }
            CoreError::Backend {
                kind: BackendKind::Research,
                status: Some(401 | 403),
                ..
            } => "Perplexity API key is invalid or missing. Check PERPLEXITY_API_KEY in .env."
                .to_string(),
            CoreError::Backend {
                kind: BackendKind::Research,
                diagnostic,
                ..
            } => generic(format!("Perplexity API error: {diagnostic}")),
            other => generic(other.to_string()),
        }
    }
}

fn generic(message: String) -> String {
    if message.to_lowercase().contains("<html") || message.chars().count() > PUBLIC_MESSAGE_LIMIT {
        GENERIC_EXTERNAL_ERROR.to_string()
    } else {
        message
    }
}

/// First `max` characters of `text`, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
