//! Research sessions, findings and media resources.

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde_json::Value;

use super::content::{insert_lesson, lesson_by_id, publish_lesson};
use super::{Store, enum_column, json_column, now, timestamp_column, to_json};
use crate::db::Result;
use crate::db::transactions::execute_in_transaction;
use crate::models::{
    Citation, Difficulty, Finding, FindingPatch, Lesson, MediaPatch, MediaResource, MediaSource,
    MediaType, NewLesson, NewMedia, NewResearchSession, ResearchSession, ResearchSessionDetail,
    ResearchStatus,
};

const SESSION_COLUMNS: &str = "id, subject_id, topic_id, topic_query, grade_level, difficulty, \
     status, lesson_id, created_at, updated_at";
const FINDING_COLUMNS: &str = "id, session_id, summary, key_facts, citations, raw_response, \
     parent_notes, created_at, updated_at";
const MEDIA_COLUMNS: &str = "id, session_id, lesson_id, url, title, description, media_type, \
     source, thumbnail_url, sort_order, is_included, created_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ResearchSession> {
    Ok(ResearchSession {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        topic_id: row.get(2)?,
        topic_query: row.get(3)?,
        grade_level: row.get(4)?,
        difficulty: enum_column(row, 5, Difficulty::parse)?,
        status: enum_column(row, 6, ResearchStatus::parse)?,
        lesson_id: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn finding_from_row(row: &Row<'_>) -> rusqlite::Result<Finding> {
    Ok(Finding {
        id: row.get(0)?,
        session_id: row.get(1)?,
        summary: row.get(2)?,
        key_facts: json_column(row, 3)?,
        citations: json_column(row, 4)?,
        raw_response: json_column(row, 5)?,
        parent_notes: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<MediaResource> {
    Ok(MediaResource {
        id: row.get(0)?,
        session_id: row.get(1)?,
        lesson_id: row.get(2)?,
        url: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        media_type: enum_column(row, 6, MediaType::parse)?,
        source: enum_column(row, 7, MediaSource::parse)?,
        thumbnail_url: row.get(8)?,
        order: row.get(9)?,
        is_included: row.get(10)?,
        created_at: timestamp_column(row, 11)?,
    })
}

fn session_by_id(conn: &Connection, id: i64) -> Result<Option<ResearchSession>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM research_sessions WHERE id = ?1"),
            [id],
            session_from_row,
        )
        .optional()?)
}

fn finding_for(conn: &Connection, session_id: i64) -> Result<Option<Finding>> {
    Ok(conn
        .query_row(
            &format!("SELECT {FINDING_COLUMNS} FROM research_findings WHERE session_id = ?1"),
            [session_id],
            finding_from_row,
        )
        .optional()?)
}

fn media_by_id(conn: &Connection, id: i64) -> Result<Option<MediaResource>> {
    Ok(conn
        .query_row(
            &format!("SELECT {MEDIA_COLUMNS} FROM media_resources WHERE id = ?1"),
            [id],
            media_from_row,
        )
        .optional()?)
}

fn media_for(conn: &Connection, session_id: i64) -> Result<Vec<MediaResource>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDIA_COLUMNS} FROM media_resources WHERE session_id = ?1 ORDER BY sort_order, id"
    ))?;
    let media = stmt
        .query_map([session_id], media_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(media)
}

/// Attach included media of the session that no lesson claims yet.
fn link_unlinked_media(conn: &Connection, session_id: i64, lesson_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE media_resources SET lesson_id = ?2
         WHERE session_id = ?1 AND is_included = 1 AND lesson_id IS NULL",
        params![session_id, lesson_id],
    )?)
}

impl Store {
    pub async fn create_research_session(
        &self,
        session: NewResearchSession,
    ) -> Result<ResearchSession> {
        self.call(move |conn| {
            let at = now();
            conn.execute(
                "INSERT INTO research_sessions
                     (subject_id, topic_id, topic_query, grade_level, difficulty, status,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    session.subject_id,
                    session.topic_id,
                    session.topic_query,
                    session.grade_level,
                    session.difficulty.as_str(),
                    ResearchStatus::TopicInput.as_str(),
                    at,
                ],
            )?;
            let id = conn.last_insert_rowid();
            session_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
        })
        .await
    }

    pub async fn get_research_session(&self, id: i64) -> Result<Option<ResearchSession>> {
        self.call(move |conn| session_by_id(conn, id)).await
    }

    /// Session with its finding and media, ordered by `order`.
    pub async fn research_session_detail(&self, id: i64) -> Result<Option<ResearchSessionDetail>> {
        self.call(move |conn| {
            let Some(session) = session_by_id(conn, id)? else {
                return Ok(None);
            };
            Ok(Some(ResearchSessionDetail {
                finding: finding_for(conn, id)?,
                media: media_for(conn, id)?,
                session,
            }))
        })
        .await
    }

    /// Move `id` from `expected` to `next`; false when the status was not `expected`.
    pub async fn compare_and_set_research_status(
        &self,
        id: i64,
        expected: ResearchStatus,
        next: ResearchStatus,
    ) -> Result<bool> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE research_sessions SET status = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = ?2",
                params![id, expected.as_str(), next.as_str(), now()],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    pub async fn set_research_status(&self, id: i64, status: ResearchStatus) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "UPDATE research_sessions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now()],
            )?;
            Ok(())
        })
        .await
    }

    /// Create or replace the research output of a session. Parent notes survive.
    pub async fn upsert_finding(
        &self,
        session_id: i64,
        summary: String,
        key_facts: Vec<String>,
        citations: Vec<Citation>,
        raw_response: Value,
    ) -> Result<Finding> {
        self.call(move |conn| {
            let at = now();
            conn.execute(
                "INSERT INTO research_findings
                     (session_id, summary, key_facts, citations, raw_response, parent_notes,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, ?6)
                 ON CONFLICT(session_id) DO UPDATE SET
                     summary = excluded.summary,
                     key_facts = excluded.key_facts,
                     citations = excluded.citations,
                     raw_response = excluded.raw_response,
                     updated_at = excluded.updated_at",
                params![
                    session_id,
                    summary,
                    to_json(&key_facts)?,
                    to_json(&citations)?,
                    to_json(&raw_response)?,
                    at,
                ],
            )?;
            finding_for(conn, session_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
        })
        .await
    }

    pub async fn get_finding(&self, session_id: i64) -> Result<Option<Finding>> {
        self.call(move |conn| finding_for(conn, session_id)).await
    }

    /// Apply a hand edit; `None` when the session has no finding yet.
    pub async fn update_finding(
        &self,
        session_id: i64,
        patch: FindingPatch,
    ) -> Result<Option<Finding>> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let Some(mut finding) = finding_for(tx, session_id)? else {
                    return Ok(None);
                };
                if let Some(summary) = patch.summary {
                    finding.summary = summary;
                }
                if let Some(key_facts) = patch.key_facts {
                    finding.key_facts = key_facts;
                }
                if let Some(parent_notes) = patch.parent_notes {
                    finding.parent_notes = parent_notes;
                }
                tx.execute(
                    "UPDATE research_findings
                     SET summary = ?2, key_facts = ?3, parent_notes = ?4, updated_at = ?5
                     WHERE session_id = ?1",
                    params![
                        session_id,
                        finding.summary,
                        to_json(&finding.key_facts)?,
                        finding.parent_notes,
                        now(),
                    ],
                )?;
                finding_for(tx, session_id)
            })
        })
        .await
    }

    /// Create the session's lesson, link every included media resource to it
    /// and record the lesson and topic on the session.
    pub async fn attach_generated_lesson(
        &self,
        session_id: i64,
        topic_id: i64,
        lesson: NewLesson,
    ) -> Result<Lesson> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let lesson_id = insert_lesson(tx, &lesson)?;
                tx.execute(
                    "UPDATE media_resources SET lesson_id = ?2
                     WHERE session_id = ?1 AND is_included = 1",
                    params![session_id, lesson_id],
                )?;
                tx.execute(
                    "UPDATE research_sessions SET topic_id = ?2, lesson_id = ?3, updated_at = ?4
                     WHERE id = ?1",
                    params![session_id, topic_id, lesson_id, now()],
                )?;
                lesson_by_id(tx, lesson_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows.into())
            })
        })
        .await
    }

    pub async fn list_media(&self, session_id: i64) -> Result<Vec<MediaResource>> {
        self.call(move |conn| media_for(conn, session_id)).await
    }

    pub async fn get_media(&self, id: i64) -> Result<Option<MediaResource>> {
        self.call(move |conn| media_by_id(conn, id)).await
    }

    /// Insert media for a session in one transaction, returning the new ids.
    pub async fn insert_media(
        &self,
        session_id: i64,
        items: Vec<NewMedia>,
        source: MediaSource,
        lesson_id: Option<i64>,
    ) -> Result<Vec<i64>> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let mut ids = Vec::with_capacity(items.len());
                for item in &items {
                    tx.execute(
                        "INSERT INTO media_resources
                             (session_id, lesson_id, url, title, description, media_type, source,
                              thumbnail_url, sort_order, is_included, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        params![
                            session_id,
                            lesson_id,
                            item.url,
                            item.title,
                            item.description,
                            item.media_type.as_str(),
                            source.as_str(),
                            item.thumbnail_url,
                            item.order,
                            item.is_included,
                            now(),
                        ],
                    )?;
                    ids.push(tx.last_insert_rowid());
                }
                Ok(ids)
            })
        })
        .await
    }

    pub async fn link_unlinked_media(&self, session_id: i64, lesson_id: i64) -> Result<usize> {
        self.call(move |conn| link_unlinked_media(conn, session_id, lesson_id))
            .await
    }

    pub async fn update_media(&self, id: i64, patch: MediaPatch) -> Result<Option<MediaResource>> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                let Some(mut media) = media_by_id(tx, id)? else {
                    return Ok(None);
                };
                if let Some(url) = patch.url {
                    media.url = url;
                }
                if let Some(title) = patch.title {
                    media.title = title;
                }
                if let Some(description) = patch.description {
                    media.description = description;
                }
                if let Some(media_type) = patch.media_type {
                    media.media_type = media_type;
                }
                if let Some(thumbnail_url) = patch.thumbnail_url {
                    media.thumbnail_url = thumbnail_url;
                }
                if let Some(order) = patch.order {
                    media.order = order;
                }
                if let Some(is_included) = patch.is_included {
                    media.is_included = is_included;
                }
                tx.execute(
                    "UPDATE media_resources
                     SET url = ?2, title = ?3, description = ?4, media_type = ?5,
                         thumbnail_url = ?6, sort_order = ?7, is_included = ?8
                     WHERE id = ?1",
                    params![
                        id,
                        media.url,
                        media.title,
                        media.description,
                        media.media_type.as_str(),
                        media.thumbnail_url,
                        media.order,
                        media.is_included,
                    ],
                )?;
                Ok(Some(media))
            })
        })
        .await
    }

    /// False when no such media resource exists.
    pub async fn delete_media(&self, id: i64) -> Result<bool> {
        self.call(move |conn| Ok(conn.execute("DELETE FROM media_resources WHERE id = ?1", [id])? == 1))
            .await
    }

    /// Publish the session's lesson, link remaining included media and
    /// assign kids, atomically.
    pub async fn publish_research_lesson(
        &self,
        session_id: i64,
        lesson_id: i64,
        kid_ids: Vec<i64>,
    ) -> Result<()> {
        self.call(move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                publish_lesson(tx, lesson_id, &kid_ids)?;
                link_unlinked_media(tx, session_id, lesson_id)?;
                Ok(())
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use crate::db::store::test_support::temp_store;
    use crate::models::{
        Citation, FindingPatch, MediaPatch, MediaSource, MediaType, NewMedia, NewResearchSession,
        NewSubject, ResearchStatus,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn session(store: &crate::db::Store) -> i64 {
        let subject = store
            .create_subject(NewSubject::named("Science"))
            .await
            .expect("subject");
        store
            .create_research_session(NewResearchSession {
                subject_id: subject.id,
                topic_id: None,
                topic_query: "Volcanoes".to_string(),
                grade_level: 5,
                difficulty: crate::models::Difficulty::Medium,
            })
            .await
            .expect("session")
            .id
    }

    fn media(url: &str, is_included: bool) -> NewMedia {
        NewMedia {
            url: url.to_string(),
            title: url.to_string(),
            description: String::new(),
            media_type: MediaType::Article,
            thumbnail_url: String::new(),
            order: 0,
            is_included,
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_status() {
        let (store, _dir) = temp_store();
        let id = session(&store).await;

        assert!(
            store
                .compare_and_set_research_status(
                    id,
                    ResearchStatus::TopicInput,
                    ResearchStatus::Researching
                )
                .await
                .expect("cas")
        );
        assert!(
            !store
                .compare_and_set_research_status(
                    id,
                    ResearchStatus::TopicInput,
                    ResearchStatus::Researching
                )
                .await
                .expect("cas")
        );
    }

    #[tokio::test]
    async fn test_upsert_finding_keeps_parent_notes() {
        let (store, _dir) = temp_store();
        let id = session(&store).await;

        store
            .upsert_finding(id, "first".to_string(), vec![], vec![], json!({}))
            .await
            .expect("insert");
        store
            .update_finding(
                id,
                FindingPatch {
                    parent_notes: Some("Focus on Hawaii".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("patch");
        let finding = store
            .upsert_finding(
                id,
                "second".to_string(),
                vec!["Lava is hot".to_string()],
                vec![Citation {
                    url: "https://a.example".to_string(),
                    title: "Source 1".to_string(),
                }],
                json!({"model": "sonar"}),
            )
            .await
            .expect("replace");

        assert_eq!(finding.summary, "second");
        assert_eq!(finding.key_facts, vec!["Lava is hot".to_string()]);
        assert_eq!(finding.parent_notes, "Focus on Hawaii");
        assert_eq!(finding.raw_response["model"], "sonar");
    }

    #[tokio::test]
    async fn test_update_missing_finding_is_none() {
        let (store, _dir) = temp_store();
        let id = session(&store).await;
        let updated = store
            .update_finding(id, FindingPatch::default())
            .await
            .expect("update");
        assert_eq!(updated, None);
    }

    #[tokio::test]
    async fn test_media_ordering_patch_and_delete() {
        let (store, _dir) = temp_store();
        let id = session(&store).await;

        let mut second = media("https://b.example", true);
        second.order = 1;
        let ids = store
            .insert_media(
                id,
                vec![second, media("https://a.example", false)],
                MediaSource::Auto,
                None,
            )
            .await
            .expect("insert");

        let listed = store.list_media(id).await.expect("list");
        assert_eq!(listed[0].url, "https://a.example");
        assert_eq!(listed[1].source, MediaSource::Auto);

        let patched = store
            .update_media(
                ids[1],
                MediaPatch {
                    is_included: Some(true),
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("patch")
            .expect("media exists");
        assert!(patched.is_included);
        assert_eq!(patched.title, "Renamed");

        assert!(store.delete_media(ids[0]).await.expect("delete"));
        assert!(!store.delete_media(ids[0]).await.expect("delete again"));
        assert_eq!(store.list_media(id).await.expect("list").len(), 1);
    }
}
