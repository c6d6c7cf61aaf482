//! Curriculum plans and their generated lesson entries.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use super::content::{insert_lesson, publish_lesson};
use super::{Store, enum_column, now, timestamp_column, to_json};
use crate::db::Result;
use crate::db::transactions::execute_in_transaction;
use crate::models::{
    CurriculumLesson, CurriculumOutline, CurriculumPlan, CurriculumPlanDetail, CurriculumStatus,
    Difficulty, NewCurriculumPlan, NewLesson, OutlinePatch,
};

const PLAN_COLUMNS: &str = "id, title, description, concept, grade_level, difficulty, \
     duration_weeks, lessons_per_week, status, outline, subject_id, created_at, updated_at";

const ENTRY_SELECT: &str = "SELECT cl.id, cl.plan_id, cl.lesson_id, l.title, cl.week_number, \
     cl.sort_order, cl.learning_objectives \
     FROM curriculum_lessons cl JOIN lessons l ON l.id = cl.lesson_id";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<CurriculumPlan> {
    let outline = match row.get::<_, Option<String>>(9)? {
        Some(raw) => Some(
            serde_json::from_str::<CurriculumOutline>(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e))
            })?,
        ),
        None => None,
    };
    Ok(CurriculumPlan {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        concept: row.get(3)?,
        grade_level: row.get(4)?,
        difficulty: enum_column(row, 5, Difficulty::parse)?,
        duration_weeks: row.get(6)?,
        lessons_per_week: row.get(7)?,
        status: enum_column(row, 8, CurriculumStatus::parse)?,
        outline,
        subject_id: row.get(10)?,
        created_at: timestamp_column(row, 11)?,
        updated_at: timestamp_column(row, 12)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CurriculumLesson> {
    Ok(CurriculumLesson {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        lesson_id: row.get(2)?,
        lesson_title: row.get(3)?,
        week_number: row.get(4)?,
        order: row.get(5)?,
        learning_objectives: row.get(6)?,
    })
}

fn plan_by_id(conn: &Connection, id: i64) -> Result<Option<CurriculumPlan>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PLAN_COLUMNS} FROM curriculum_plans WHERE id = ?1"),
            [id],
            plan_from_row,
        )
        .optional()?)
}

fn entries_for(conn: &Connection, plan_id: i64) -> Result<Vec<CurriculumLesson>> {
    let mut stmt = conn.prepare(&format!(
        "{ENTRY_SELECT} WHERE cl.plan_id = ?1 ORDER BY cl.week_number, cl.sort_order"
    ))?;
    let entries = stmt
        .query_map([plan_id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn entry_at(
    conn: &Connection,
    plan_id: i64,
    week_number: u32,
    order: u32,
) -> Result<Option<CurriculumLesson>> {
    Ok(conn
        .query_row(
            &format!(
                "{ENTRY_SELECT} WHERE cl.plan_id = ?1 AND cl.week_number = ?2 AND cl.sort_order = ?3"
            ),
            params![plan_id, week_number, order],
            entry_from_row,
        )
        .optional()?)
}

fn insert_entry(
    conn: &Connection,
    plan_id: i64,
    lesson: &NewLesson,
    week_number: u32,
    order: u32,
    learning_objectives: &str,
) -> Result<CurriculumLesson> {
    let lesson_id = insert_lesson(conn, lesson)?;
    conn.execute(
        "INSERT INTO curriculum_lessons
             (plan_id, lesson_id, week_number, sort_order, learning_objectives)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![plan_id, lesson_id, week_number, order, learning_objectives],
    )?;
    entry_at(conn, plan_id, week_number, order)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
}

impl Store {
    /// New plan in `planning`. An empty title becomes the concept.
    pub async fn create_curriculum_plan(&self, plan: NewCurriculumPlan) -> Result<CurriculumPlan> {
        self.call(move |conn| {
            let title = if plan.title.trim().is_empty() {
                plan.concept.clone()
            } else {
                plan.title.clone()
            };
            let at = now();
            conn.execute(
                "INSERT INTO curriculum_plans
                     (title, description, concept, grade_level, difficulty, duration_weeks,
                      lessons_per_week, status, subject_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    title,
                    plan.description,
                    plan.concept,
                    plan.grade_level,
                    plan.difficulty.as_str(),
                    plan.duration_weeks,
                    plan.lessons_per_week,
                    CurriculumStatus::Planning.as_str(),
                    plan.subject_id,
                    at,
                ],
            )?;
            let id = conn.last_insert_rowid();
            plan_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
        })
        .await
    }

    pub async fn get_curriculum_plan(&self, id: i64) -> Result<Option<CurriculumPlan>> {
        self.call(move |conn| plan_by_id(conn, id)).await
    }

    pub async fn curriculum_plan_detail(&self, id: i64) -> Result<Option<CurriculumPlanDetail>> {
        self.call(move |conn| {
            let Some(plan) = plan_by_id(conn, id)? else {
                return Ok(None);
            };
            Ok(Some(CurriculumPlanDetail {
                entries: entries_for(conn, id)?,
                plan,
            }))
        })
        .await
    }

    /// Move `id` from `expected` to `next`; false when the status was not `expected`.
    pub async fn compare_and_set_curriculum_status(
        &self,
        id: i64,
        expected: CurriculumStatus,
        next: CurriculumStatus,
    ) -> Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE curriculum_plans SET status = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = ?2",
                params![id, expected.as_str(), next.as_str(), now()],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    pub async fn set_curriculum_status(&self, id: i64, status: CurriculumStatus) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE curriculum_plans SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now()],
            )?;
            Ok(())
        })
        .await
    }

    /// Store a generated outline with the title, description and subject it implies.
    pub async fn save_outline(
        &self,
        id: i64,
        outline: CurriculumOutline,
        title: String,
        description: String,
        subject_id: Option<i64>,
    ) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE curriculum_plans
                 SET outline = ?2, title = ?3, description = ?4,
                     subject_id = COALESCE(?5, subject_id), updated_at = ?6
                 WHERE id = ?1",
                params![id, to_json(&outline)?, title, description, subject_id, now()],
            )?;
            Ok(())
        })
        .await
    }

    /// Apply hand edits; false when the plan does not exist.
    pub async fn update_outline(&self, id: i64, patch: OutlinePatch) -> Result<bool> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let Some(mut plan) = plan_by_id(tx, id)? else {
                    return Ok(false);
                };
                if let Some(outline) = patch.outline {
                    plan.outline = Some(outline);
                }
                if let Some(title) = patch.title {
                    plan.title = title;
                }
                if let Some(description) = patch.description {
                    plan.description = description;
                }
                let outline = plan.outline.as_ref().map(to_json).transpose()?;
                tx.execute(
                    "UPDATE curriculum_plans
                     SET outline = ?2, title = ?3, description = ?4, updated_at = ?5
                     WHERE id = ?1",
                    params![id, outline, plan.title, plan.description, now()],
                )?;
                Ok(true)
            })
        })
        .await
    }

    pub async fn set_plan_subject(&self, id: i64, subject_id: i64) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE curriculum_plans SET subject_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, subject_id, now()],
            )?;
            Ok(())
        })
        .await
    }

    /// Entries ordered by (week, order).
    pub async fn list_curriculum_lessons(&self, plan_id: i64) -> Result<Vec<CurriculumLesson>> {
        self.call(move |conn| entries_for(conn, plan_id)).await
    }

    pub async fn find_curriculum_lesson(
        &self,
        plan_id: i64,
        week_number: u32,
        order: u32,
    ) -> Result<Option<CurriculumLesson>> {
        self.call(move |conn| entry_at(conn, plan_id, week_number, order))
            .await
    }

    /// Create a draft lesson and its entry at (week, order) together.
    pub async fn create_curriculum_entry(
        &self,
        plan_id: i64,
        lesson: NewLesson,
        week_number: u32,
        order: u32,
        learning_objectives: String,
    ) -> Result<CurriculumLesson> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                insert_entry(tx, plan_id, &lesson, week_number, order, &learning_objectives)
            })
        })
        .await
    }

    /// Delete whatever occupies (week, order), lesson included, and store the
    /// replacement in the same transaction.
    pub async fn replace_curriculum_entry(
        &self,
        plan_id: i64,
        lesson: NewLesson,
        week_number: u32,
        order: u32,
        learning_objectives: String,
    ) -> Result<CurriculumLesson> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                if let Some(existing) = entry_at(tx, plan_id, week_number, order)? {
                    // Deleting the lesson cascades to the entry.
                    tx.execute("DELETE FROM lessons WHERE id = ?1", [existing.lesson_id])?;
                }
                insert_entry(tx, plan_id, &lesson, week_number, order, &learning_objectives)
            })
        })
        .await
    }

    /// Publish every entry's lesson and assign kids to the lessons and the plan.
    pub async fn publish_curriculum(&self, plan_id: i64, kid_ids: Vec<i64>) -> Result<()> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                for entry in entries_for(tx, plan_id)? {
                    publish_lesson(tx, entry.lesson_id, &kid_ids)?;
                }
                if !kid_ids.is_empty() {
                    tx.execute(
                        "DELETE FROM curriculum_assignments WHERE plan_id = ?1",
                        [plan_id],
                    )?;
                    for kid_id in &kid_ids {
                        tx.execute(
                            "INSERT OR IGNORE INTO curriculum_assignments (plan_id, kid_id)
                             VALUES (?1, ?2)",
                            params![plan_id, kid_id],
                        )?;
                    }
                }
                Ok(())
            })
        })
        .await
    }

    pub async fn plan_assignees(&self, plan_id: i64) -> Result<Vec<i64>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT kid_id FROM curriculum_assignments WHERE plan_id = ?1 ORDER BY kid_id",
            )?;
            let ids = stmt
                .query_map([plan_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
        .await
    }
}
