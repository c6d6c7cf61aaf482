//! Checks applied to a kid's message before anything reaches a model.

use chrono::{DateTime, NaiveTime, Utc};

use crate::db::Store;
use crate::error::{CoreError, Result};
use crate::models::KidProfile;

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Trimmed message, or the reason it cannot be sent.
pub fn validate_message(message: &str) -> Result<String> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("Please type a message!".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(CoreError::InvalidInput(
            "That message is too long! Try keeping it shorter.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Messages `kid` may still send today, or `RateLimited` when none remain.
pub async fn check_rate_limit(store: &Store, kid: &KidProfile) -> Result<u32> {
    let sent = store
        .count_user_messages_since(kid.id, start_of_day(Utc::now()))
        .await?;
    if sent >= kid.daily_chat_limit {
        tracing::info!(kid_id = kid.id, sent, "daily chat limit reached");
        return Err(CoreError::RateLimited(format!(
            "You've reached your daily chat limit of {} messages. Come back tomorrow! 🌅",
            kid.daily_chat_limit
        )));
    }
    Ok(kid.daily_chat_limit - sent)
}
