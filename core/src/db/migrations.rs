//! Schema versioning and migrations
//!
//! Forward-only. The applied version lives in `PRAGMA user_version`; each
//! migration runs in its own transaction together with the version bump.

use rusqlite::{Connection, TransactionBehavior};

use super::transactions::execute_in_transaction;
use super::{DbError, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

const MIGRATIONS: &[(i32, &str)] = &[(1, V1_SCHEMA)];

/// Apply all pending migrations.
pub fn migrate_to_latest(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
            tx.execute_batch(sql)
                .map_err(|e| DbError::Migration(format!("v{version}: {e}")))?;
            tx.pragma_update(None, "user_version", version)?;
            Ok(())
        })?;
        tracing::info!(version, "Applied schema migration");
    }
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

const V1_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kids (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name TEXT NOT NULL,
    grade_level INTEGER NOT NULL,
    age INTEGER,
    daily_chat_limit INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    icon TEXT NOT NULL,
    color TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    grade_level_min INTEGER NOT NULL DEFAULT 1,
    grade_level_max INTEGER NOT NULL DEFAULT 12,
    created_at TEXT NOT NULL,
    UNIQUE (subject_id, name)
);

CREATE TABLE IF NOT EXISTS lessons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    grade_level INTEGER NOT NULL,
    difficulty TEXT NOT NULL,
    estimated_minutes INTEGER NOT NULL,
    ai_generated INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lesson_assignments (
    lesson_id INTEGER NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
    kid_id INTEGER NOT NULL REFERENCES kids(id) ON DELETE CASCADE,
    PRIMARY KEY (lesson_id, kid_id)
);

CREATE TABLE IF NOT EXISTS research_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    topic_id INTEGER REFERENCES topics(id) ON DELETE SET NULL,
    topic_query TEXT NOT NULL,
    grade_level INTEGER NOT NULL,
    difficulty TEXT NOT NULL,
    status TEXT NOT NULL,
    lesson_id INTEGER REFERENCES lessons(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS research_findings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL UNIQUE REFERENCES research_sessions(id) ON DELETE CASCADE,
    summary TEXT NOT NULL,
    key_facts TEXT NOT NULL,
    citations TEXT NOT NULL,
    raw_response TEXT NOT NULL,
    parent_notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS media_resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES research_sessions(id) ON DELETE CASCADE,
    lesson_id INTEGER REFERENCES lessons(id) ON DELETE SET NULL,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    media_type TEXT NOT NULL,
    source TEXT NOT NULL,
    thumbnail_url TEXT NOT NULL DEFAULT '',
    sort_order INTEGER NOT NULL DEFAULT 0,
    is_included INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_media_session ON media_resources(session_id, sort_order);

CREATE TABLE IF NOT EXISTS curriculum_plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    concept TEXT NOT NULL,
    grade_level INTEGER NOT NULL,
    difficulty TEXT NOT NULL,
    duration_weeks INTEGER NOT NULL,
    lessons_per_week INTEGER NOT NULL,
    status TEXT NOT NULL,
    outline TEXT,
    subject_id INTEGER REFERENCES subjects(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS curriculum_lessons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plan_id INTEGER NOT NULL REFERENCES curriculum_plans(id) ON DELETE CASCADE,
    lesson_id INTEGER NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
    week_number INTEGER NOT NULL,
    sort_order INTEGER NOT NULL,
    learning_objectives TEXT NOT NULL DEFAULT '',
    UNIQUE (plan_id, week_number, sort_order)
);

CREATE TABLE IF NOT EXISTS curriculum_assignments (
    plan_id INTEGER NOT NULL REFERENCES curriculum_plans(id) ON DELETE CASCADE,
    kid_id INTEGER NOT NULL REFERENCES kids(id) ON DELETE CASCADE,
    PRIMARY KEY (plan_id, kid_id)
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kid_id INTEGER NOT NULL REFERENCES kids(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    context_type TEXT NOT NULL,
    context_id INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, id);
CREATE INDEX IF NOT EXISTS idx_chat_messages_created ON chat_messages(role, created_at);

CREATE TABLE IF NOT EXISTS math_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kid_id INTEGER NOT NULL REFERENCES kids(id) ON DELETE CASCADE,
    topic TEXT NOT NULL,
    chat_session_id INTEGER REFERENCES chat_sessions(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS math_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES math_sessions(id) ON DELETE CASCADE,
    problem_text TEXT NOT NULL,
    difficulty TEXT NOT NULL DEFAULT 'medium',
    hint TEXT NOT NULL DEFAULT '',
    is_correct INTEGER,
    correct_answer TEXT NOT NULL DEFAULT '',
    feedback TEXT NOT NULL DEFAULT '',
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;
