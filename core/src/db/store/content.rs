//! Kids, subjects, topics and lessons.

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::{Store, enum_column, now, timestamp_column};
use crate::db::Result;
use crate::db::transactions::execute_in_transaction;
use crate::models::{
    Difficulty, KidProfile, Lesson, LessonStatus, NewKid, NewLesson, NewSubject, NewTopic,
    Subject, Topic,
};

const KID_COLUMNS: &str = "id, display_name, grade_level, age, daily_chat_limit, created_at";
const SUBJECT_COLUMNS: &str = "id, name, description, icon, color";
const TOPIC_COLUMNS: &str =
    "id, subject_id, name, description, grade_level_min, grade_level_max";
const LESSON_COLUMNS: &str = "id, topic_id, title, description, content, grade_level, \
     difficulty, estimated_minutes, ai_generated, status, created_at, updated_at";

fn kid_from_row(row: &Row<'_>) -> rusqlite::Result<KidProfile> {
    Ok(KidProfile {
        id: row.get(0)?,
        display_name: row.get(1)?,
        grade_level: row.get(2)?,
        age: row.get(3)?,
        daily_chat_limit: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
        color: row.get(4)?,
    })
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        grade_level_min: row.get(4)?,
        grade_level_max: row.get(5)?,
    })
}

fn lesson_from_row(row: &Row<'_>) -> rusqlite::Result<Lesson> {
    Ok(Lesson {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        content: row.get(4)?,
        grade_level: row.get(5)?,
        difficulty: enum_column(row, 6, Difficulty::parse)?,
        estimated_minutes: row.get(7)?,
        ai_generated: row.get(8)?,
        status: enum_column(row, 9, LessonStatus::parse)?,
        created_at: timestamp_column(row, 10)?,
        updated_at: timestamp_column(row, 11)?,
    })
}

pub(crate) fn subject_by_id(conn: &Connection, id: i64) -> Result<Option<Subject>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
            [id],
            subject_from_row,
        )
        .optional()?)
}

pub(crate) fn lesson_by_id(conn: &Connection, id: i64) -> Result<Option<Lesson>> {
    Ok(conn
        .query_row(
            &format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1"),
            [id],
            lesson_from_row,
        )
        .optional()?)
}

/// Insert an AI-generated draft lesson and return its id.
pub(crate) fn insert_lesson(conn: &Connection, lesson: &NewLesson) -> Result<i64> {
    let at = now();
    conn.execute(
        "INSERT INTO lessons (topic_id, title, description, content, grade_level, difficulty,
                              estimated_minutes, ai_generated, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?9)",
        params![
            lesson.topic_id,
            lesson.title,
            lesson.description,
            lesson.content,
            lesson.grade_level,
            lesson.difficulty.as_str(),
            lesson.estimated_minutes,
            LessonStatus::Draft.as_str(),
            at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Mark a lesson published and, when `kid_ids` is non-empty, make those kids
/// its exact assignee set.
pub(crate) fn publish_lesson(conn: &Connection, lesson_id: i64, kid_ids: &[i64]) -> Result<()> {
    conn.execute(
        "UPDATE lessons SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![lesson_id, LessonStatus::Published.as_str(), now()],
    )?;
    if !kid_ids.is_empty() {
        conn.execute(
            "DELETE FROM lesson_assignments WHERE lesson_id = ?1",
            [lesson_id],
        )?;
        for kid_id in kid_ids {
            conn.execute(
                "INSERT OR IGNORE INTO lesson_assignments (lesson_id, kid_id) VALUES (?1, ?2)",
                params![lesson_id, kid_id],
            )?;
        }
    }
    Ok(())
}

impl Store {
    pub async fn create_kid(&self, kid: NewKid, default_daily_limit: u32) -> Result<KidProfile> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO kids (display_name, grade_level, age, daily_chat_limit, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    kid.display_name,
                    kid.grade_level,
                    kid.age,
                    kid.daily_chat_limit.unwrap_or(default_daily_limit),
                    now(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("SELECT {KID_COLUMNS} FROM kids WHERE id = ?1"),
                [id],
                kid_from_row,
            )?)
        })
        .await
    }

    pub async fn get_kid(&self, id: i64) -> Result<Option<KidProfile>> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {KID_COLUMNS} FROM kids WHERE id = ?1"),
                    [id],
                    kid_from_row,
                )
                .optional()?)
        })
        .await
    }

    pub async fn create_subject(&self, subject: NewSubject) -> Result<Subject> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO subjects (name, description, icon, color, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subject.name,
                    subject.description,
                    subject.icon,
                    subject.color,
                    now()
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = ?1"),
                [id],
                subject_from_row,
            )?)
        })
        .await
    }

    pub async fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        self.call(move |conn| subject_by_id(conn, id)).await
    }

    /// Subject with `subject.name`, inserted with the given defaults when absent.
    pub async fn get_or_create_subject(&self, subject: NewSubject) -> Result<Subject> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                tx.execute(
                    "INSERT OR IGNORE INTO subjects (name, description, icon, color, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        subject.name,
                        subject.description,
                        subject.icon,
                        subject.color,
                        now()
                    ],
                )?;
                Ok(tx.query_row(
                    &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE name = ?1"),
                    [&subject.name],
                    subject_from_row,
                )?)
            })
        })
        .await
    }

    pub async fn get_topic(&self, id: i64) -> Result<Option<Topic>> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?1"),
                    [id],
                    topic_from_row,
                )
                .optional()?)
        })
        .await
    }

    /// Topic named `topic.name` under its subject, created when absent.
    pub async fn get_or_create_topic(&self, topic: NewTopic) -> Result<Topic> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                tx.execute(
                    "INSERT OR IGNORE INTO topics
                         (subject_id, name, description, grade_level_min, grade_level_max, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        topic.subject_id,
                        topic.name,
                        topic.description,
                        topic.grade_level_min,
                        topic.grade_level_max,
                        now(),
                    ],
                )?;
                Ok(tx.query_row(
                    &format!(
                        "SELECT {TOPIC_COLUMNS} FROM topics WHERE subject_id = ?1 AND name = ?2"
                    ),
                    params![topic.subject_id, topic.name],
                    topic_from_row,
                )?)
            })
        })
        .await
    }

    pub async fn create_lesson(&self, lesson: NewLesson) -> Result<Lesson> {
        self.call(move |conn| {
            let id = insert_lesson(conn, &lesson)?;
            lesson_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
        })
        .await
    }

    pub async fn get_lesson(&self, id: i64) -> Result<Option<Lesson>> {
        self.call(move |conn| lesson_by_id(conn, id)).await
    }

    pub async fn lesson_assignees(&self, lesson_id: i64) -> Result<Vec<i64>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT kid_id FROM lesson_assignments WHERE lesson_id = ?1 ORDER BY kid_id",
            )?;
            let ids = stmt
                .query_map([lesson_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
        .await
    }
}
