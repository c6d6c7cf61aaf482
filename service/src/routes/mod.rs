pub(crate) mod chat;
pub(crate) mod content;
pub(crate) mod curriculum;
pub(crate) mod math;
pub(crate) mod research;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde::Deserialize;

use crate::ApiError;

/// Kids to assign on publish; an empty list publishes without assigning.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PublishRequest {
    #[serde(default)]
    pub kid_ids: Vec<i64>,
}

/// Trimmed `value`, or `InvalidInput(message)` when blank.
pub(crate) fn required(value: &str, message: &str) -> crate::ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::ApiError::bad_request(message));
    }
    Ok(trimmed.to_string())
}

/// Numeric `{id}` path segment; a malformed id is a JSON 400 like any other
/// bad input.
pub(crate) struct EntityId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for EntityId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state).await?;
        Ok(Self(id))
    }
}
