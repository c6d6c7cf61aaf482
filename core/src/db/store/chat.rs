//! Chat sessions and their append-only message log.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Store, enum_column, now, timestamp, timestamp_column};
use crate::db::Result;
use crate::models::{ChatMessage, ChatSession, ContextType, DEFAULT_CHAT_TITLE, NewChatSession, Role};

const SESSION_COLUMNS: &str =
    "id, kid_id, title, context_type, context_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        kid_id: row.get(1)?,
        title: row.get(2)?,
        context_type: enum_column(row, 3, ContextType::parse)?,
        context_id: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: enum_column(row, 2, Role::parse)?,
        content: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn session_by_id(conn: &Connection, id: i64) -> Result<Option<ChatSession>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?1"),
            [id],
            session_from_row,
        )
        .optional()?)
}

pub(crate) fn insert_chat_session(conn: &Connection, session: &NewChatSession) -> Result<i64> {
    let at = now();
    let title = session
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_CHAT_TITLE);
    conn.execute(
        "INSERT INTO chat_sessions (kid_id, title, context_type, context_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            session.kid_id,
            title,
            session.context_type.as_str(),
            session.context_id,
            at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Store {
    pub async fn create_chat_session(&self, session: NewChatSession) -> Result<ChatSession> {
        self.call(move |conn| {
            let id = insert_chat_session(conn, &session)?;
            session_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
        })
        .await
    }

    pub async fn get_chat_session(&self, id: i64) -> Result<Option<ChatSession>> {
        self.call(move |conn| session_by_id(conn, id)).await
    }

    /// Append one message and touch the session.
    pub async fn append_message(
        &self,
        session_id: i64,
        role: Role,
        content: String,
    ) -> Result<ChatMessage> {
        self.call(move |conn| {
            let at = now();
            conn.execute(
                "INSERT INTO chat_messages (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role.as_str(), content, at],
            )?;
            let id = conn.last_insert_rowid();
            conn.execute(
                "UPDATE chat_sessions SET updated_at = ?2 WHERE id = ?1",
                params![session_id, at],
            )?;
            Ok(conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = ?1"),
                [id],
                message_from_row,
            )?)
        })
        .await
    }

    /// Messages oldest first.
    pub async fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = ?1 ORDER BY id"
            ))?;
            let messages = stmt
                .query_map([session_id], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    /// User messages sent by `kid_id` across all their sessions since `since`.
    pub async fn count_user_messages_since(
        &self,
        kid_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        self.call(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chat_messages m
                 JOIN chat_sessions s ON s.id = m.session_id
                 WHERE s.kid_id = ?1 AND m.role = ?2 AND m.created_at >= ?3",
                params![kid_id, Role::User.as_str(), timestamp(since)],
                |row| row.get(0),
            )?)
        })
        .await
    }

    /// Replace the default title while the conversation is at most
    /// `max_messages` long. Returns whether the title changed.
    pub async fn retitle_new_chat(
        &self,
        session_id: i64,
        title: String,
        max_messages: u32,
    ) -> Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_sessions SET title = ?2, updated_at = ?5
                 WHERE id = ?1 AND title = ?3
                   AND (SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1) <= ?4",
                params![session_id, title, DEFAULT_CHAT_TITLE, max_messages, now()],
            )?;
            Ok(changed == 1)
        })
        .await
    }
}
