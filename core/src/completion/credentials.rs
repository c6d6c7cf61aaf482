use std::fmt;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::config::Credentials;
use crate::error::{CoreError, Result};

/// Beta header required for OAuth authentication against the messages API.
const ANTHROPIC_BETA: &str = "oauth-2025-04-20";

/// A resolved credential for the hosted messages API.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    OAuthToken(String),
}

/// Empty values and template leftovers such as `your-api-key-here`.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with("your-")
}

/// Pick the API key unless it is missing or a placeholder, else the OAuth token.
pub fn resolve_credential(credentials: &Credentials) -> Result<Credential> {
    if let Some(key) = credentials
        .anthropic_api_key
        .as_deref()
        .filter(|key| !is_placeholder(key))
    {
        return Ok(Credential::ApiKey(key.trim().to_string()));
    }

    if let Some(token) = credentials
        .claude_oauth_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Ok(Credential::OAuthToken(token.to_string()));
    }

    Err(CoreError::Credential(
        "No Anthropic credentials found. Set ANTHROPIC_API_KEY or CLAUDE_CODE_OAUTH_TOKEN."
            .to_string(),
    ))
}

impl Credential {
    /// Add the authentication headers for this credential.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        let invalid = |_| CoreError::Credential("Credential contains invalid characters".to_string());
        match self {
            Credential::ApiKey(key) => {
                headers.insert("x-api-key", HeaderValue::from_str(key).map_err(invalid)?);
            }
            Credential::OAuthToken(token) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(invalid)?,
                );
                headers.insert("anthropic-beta", HeaderValue::from_static(ANTHROPIC_BETA));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::OAuthToken(_) => f.write_str("OAuthToken(<redacted>)"),
        }
    }
}
