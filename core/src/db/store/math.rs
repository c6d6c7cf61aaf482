//! Math practice sessions and their problem attempts.

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::chat::insert_chat_session;
use super::{Store, now, timestamp_column};
use crate::db::Result;
use crate::db::transactions::execute_in_transaction;
use crate::models::{
    ContextType, MathPracticeSession, MathProblemAttempt, NewChatSession, NewMathAttempt,
    NewMathSession,
};

const SESSION_COLUMNS: &str = "id, kid_id, topic, chat_session_id, created_at";
const ATTEMPT_COLUMNS: &str = "id, session_id, problem_text, difficulty, hint, is_correct, \
     correct_answer, feedback, sort_order, created_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<MathPracticeSession> {
    Ok(MathPracticeSession {
        id: row.get(0)?,
        kid_id: row.get(1)?,
        topic: row.get(2)?,
        chat_session_id: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<MathProblemAttempt> {
    Ok(MathProblemAttempt {
        id: row.get(0)?,
        session_id: row.get(1)?,
        problem_text: row.get(2)?,
        difficulty: row.get(3)?,
        hint: row.get(4)?,
        is_correct: row.get(5)?,
        correct_answer: row.get(6)?,
        feedback: row.get(7)?,
        order: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

fn session_by_id(conn: &Connection, id: i64) -> Result<Option<MathPracticeSession>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM math_sessions WHERE id = ?1"),
            [id],
            session_from_row,
        )
        .optional()?)
}

impl Store {
    /// New practice session plus the math-context tutor chat pointing at it.
    pub async fn create_math_session(&self, session: NewMathSession) -> Result<MathPracticeSession> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let chat_id = insert_chat_session(
                    tx,
                    &NewChatSession {
                        kid_id: session.kid_id,
                        title: Some(format!("Math: {}", session.topic)),
                        context_type: ContextType::Math,
                        context_id: None,
                    },
                )?;
                tx.execute(
                    "INSERT INTO math_sessions (kid_id, topic, chat_session_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![session.kid_id, session.topic, chat_id, now()],
                )?;
                let id = tx.last_insert_rowid();
                tx.execute(
                    "UPDATE chat_sessions SET context_id = ?2 WHERE id = ?1",
                    params![chat_id, id],
                )?;
                session_by_id(tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
            })
        })
        .await
    }

    pub async fn get_math_session(&self, id: i64) -> Result<Option<MathPracticeSession>> {
        self.call(move |conn| session_by_id(conn, id)).await
    }

    /// Record an attempt after the session's last one.
    pub async fn add_math_attempt(
        &self,
        session_id: i64,
        attempt: NewMathAttempt,
    ) -> Result<MathProblemAttempt> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let last_order: u32 = tx.query_row(
                    "SELECT COALESCE(MAX(sort_order), 0) FROM math_attempts WHERE session_id = ?1",
                    [session_id],
                    |row| row.get(0),
                )?;
                let difficulty = if attempt.difficulty.is_empty() {
                    "medium"
                } else {
                    attempt.difficulty.as_str()
                };
                tx.execute(
                    "INSERT INTO math_attempts
                         (session_id, problem_text, difficulty, hint, is_correct, correct_answer,
                          feedback, sort_order, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        session_id,
                        attempt.problem_text,
                        difficulty,
                        attempt.hint,
                        attempt.is_correct,
                        attempt.correct_answer,
                        attempt.feedback,
                        last_order + 1,
                        now(),
                    ],
                )?;
                let id = tx.last_insert_rowid();
                Ok(tx.query_row(
                    &format!("SELECT {ATTEMPT_COLUMNS} FROM math_attempts WHERE id = ?1"),
                    [id],
                    attempt_from_row,
                )?)
            })
        })
        .await
    }

    /// Most recent attempt by (order, creation).
    pub async fn latest_math_attempt(&self, session_id: i64) -> Result<Option<MathProblemAttempt>> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {ATTEMPT_COLUMNS} FROM math_attempts WHERE session_id = ?1
                         ORDER BY sort_order DESC, id DESC LIMIT 1"
                    ),
                    [session_id],
                    attempt_from_row,
                )
                .optional()?)
        })
        .await
    }
}
