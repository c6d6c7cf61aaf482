use std::sync::Arc;

use tracing::{error, info};

use super::state::{self, Attempt, Outcome, Transition};
use crate::db::Store;
use crate::error::{CoreError, Result};
use crate::generate::{Generator, MediaRef, ResearchLessonInput};
use crate::models::{
    Finding, FindingPatch, MediaPatch, MediaResource, MediaSource, NewLesson, NewMedia,
    NewResearchSession, NewTopic, ResearchSession, ResearchSessionDetail, ResearchStatus, Subject,
};
use crate::research::ResearchBackend;

/// Drives a research session from topic to published lesson.
#[derive(Clone)]
pub struct ResearchPipeline {
    store: Store,
    research: Arc<dyn ResearchBackend>,
    generator: Generator,
}

impl ResearchPipeline {
    pub fn new(store: Store, research: Arc<dyn ResearchBackend>, generator: Generator) -> Self {
        Self {
            store,
            research,
            generator,
        }
    }

    pub async fn create(&self, session: NewResearchSession) -> Result<ResearchSessionDetail> {
        if session.topic_query.trim().is_empty() {
            return Err(CoreError::InvalidInput("Topic is required".to_string()));
        }
        if !(1..=12).contains(&session.grade_level) {
            return Err(CoreError::InvalidInput(
                "grade_level must be between 1 and 12".to_string(),
            ));
        }
        self.subject(session.subject_id).await?;
        if let Some(topic_id) = session.topic_id {
            self.store
                .get_topic(topic_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("Topic {topic_id}")))?;
        }
        let created = self.store.create_research_session(session).await?;
        info!(session_id = created.id, topic = %created.topic_query, "research session created");
        self.detail(created.id).await
    }

    pub async fn detail(&self, id: i64) -> Result<ResearchSessionDetail> {
        self.store
            .research_session_detail(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Research the topic and store the finding. Parent notes survive a re-run.
    pub async fn research(&self, id: i64) -> Result<ResearchSessionDetail> {
        let session = self.session(id).await?;
        let attempt = self.begin(&session, &state::research::RESEARCH).await?;
        let result = self.run_research(&session).await;
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn run_research(&self, session: &ResearchSession) -> Result<Finding> {
        let subject = self.subject(session.subject_id).await?;
        let result = self
            .research
            .research_topic(&session.topic_query, session.grade_level, &subject.name)
            .await?;
        Ok(self
            .store
            .upsert_finding(
                session.id,
                result.summary,
                result.key_facts,
                result.citations,
                result.raw_response,
            )
            .await?)
    }

    pub async fn update_finding(
        &self,
        id: i64,
        patch: FindingPatch,
    ) -> Result<ResearchSessionDetail> {
        self.session(id).await?;
        self.store
            .update_finding(id, patch)
            .await?
            .ok_or_else(|| no_finding("edit"))?;
        self.detail(id).await
    }

    /// Write a lesson from the finding and the included media.
    pub async fn generate_lesson(&self, id: i64) -> Result<ResearchSessionDetail> {
        let session = self.session(id).await?;
        let finding = self
            .store
            .get_finding(id)
            .await?
            .ok_or_else(|| no_finding("generate a lesson from"))?;
        let attempt = self
            .begin(&session, &state::research::GENERATE_LESSON)
            .await?;
        let result = self.run_generate_lesson(&session, finding).await;
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn run_generate_lesson(&self, session: &ResearchSession, finding: Finding) -> Result<()> {
        let media = self
            .store
            .list_media(session.id)
            .await?
            .into_iter()
            .filter(|media| media.is_included)
            .map(|media| MediaRef {
                title: media.title,
                media_type: media.media_type,
                url: media.url,
            })
            .collect();
        let input = ResearchLessonInput {
            topic: session.topic_query.clone(),
            grade_level: session.grade_level,
            difficulty: session.difficulty.as_str().to_string(),
            summary: finding.summary,
            key_facts: finding.key_facts,
            citations: finding.citations,
            media,
            parent_notes: finding.parent_notes,
        };
        let generated = self.generator.generate_lesson_from_research(&input).await?;

        let topic_id = match session.topic_id {
            Some(topic_id) => topic_id,
            None => {
                self.store
                    .get_or_create_topic(NewTopic {
                        subject_id: session.subject_id,
                        name: session.topic_query.clone(),
                        description: format!("Auto-created topic for: {}", session.topic_query),
                        grade_level_min: session.grade_level.saturating_sub(1).clamp(1, 12),
                        grade_level_max: session.grade_level.saturating_add(1).clamp(1, 12),
                    })
                    .await?
                    .id
            }
        };
        let lesson = self
            .store
            .attach_generated_lesson(
                session.id,
                topic_id,
                NewLesson {
                    topic_id,
                    title: generated.title,
                    description: generated.description,
                    content: generated.content,
                    grade_level: session.grade_level,
                    difficulty: session.difficulty,
                    estimated_minutes: generated.estimated_minutes,
                },
            )
            .await?;
        info!(session_id = session.id, lesson_id = lesson.id, "research lesson generated");
        Ok(())
    }

    /// Find videos and articles for the topic.
    pub async fn discover_media(&self, id: i64) -> Result<ResearchSessionDetail> {
        let session = self.session(id).await?;
        let attempt = self
            .begin(&session, &state::research::DISCOVER_MEDIA)
            .await?;
        let result = self.run_discover_media(&session).await;
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn run_discover_media(&self, session: &ResearchSession) -> Result<()> {
        let subject = self.subject(session.subject_id).await?;
        let discovered = self
            .research
            .discover_multimedia(&session.topic_query, session.grade_level, &subject.name)
            .await?;
        let items = discovered
            .into_iter()
            .zip(0u32..)
            .map(|(media, order)| NewMedia {
                url: media.url,
                title: media.title,
                description: media.description,
                media_type: media.media_type,
                thumbnail_url: media.thumbnail_url,
                order,
                is_included: true,
            })
            .collect::<Vec<_>>();
        let count = items.len();
        self.store
            .insert_media(session.id, items, MediaSource::Auto, None)
            .await?;
        if let Some(lesson_id) = session.lesson_id {
            self.store.link_unlinked_media(session.id, lesson_id).await?;
        }
        info!(session_id = session.id, count, "media discovered");
        Ok(())
    }

    /// Attach a hand-picked resource. Does not move the session.
    pub async fn add_media(&self, id: i64, media: NewMedia) -> Result<ResearchSessionDetail> {
        if media.url.trim().is_empty() {
            return Err(CoreError::InvalidInput("Media url is required".to_string()));
        }
        if media.title.trim().is_empty() {
            return Err(CoreError::InvalidInput("Media title is required".to_string()));
        }
        let session = self.session(id).await?;
        self.store
            .insert_media(id, vec![media], MediaSource::Manual, session.lesson_id)
            .await?;
        self.detail(id).await
    }

    pub async fn update_media(&self, media_id: i64, patch: MediaPatch) -> Result<MediaResource> {
        self.store
            .update_media(media_id, patch)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Media resource {media_id}")))
    }

    pub async fn delete_media(&self, media_id: i64) -> Result<()> {
        if self.store.delete_media(media_id).await? {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!("Media resource {media_id}")))
        }
    }

    /// Publish the lesson and assign it. A non-empty `kid_ids` replaces the
    /// current assignees.
    pub async fn publish(&self, id: i64, kid_ids: Vec<i64>) -> Result<ResearchSessionDetail> {
        let session = self.session(id).await?;
        let lesson_id = session
            .lesson_id
            .ok_or_else(|| CoreError::PipelineState("No lesson generated yet".to_string()))?;
        let attempt = self.begin(&session, &state::research::PUBLISH).await?;
        let result = self
            .store
            .publish_research_lesson(id, lesson_id, kid_ids)
            .await
            .map_err(CoreError::from);
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn session(&self, id: i64) -> Result<ResearchSession> {
        self.store
            .get_research_session(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn subject(&self, id: i64) -> Result<Subject> {
        self.store
            .get_subject(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Subject {id}")))
    }

    async fn begin(
        &self,
        session: &ResearchSession,
        transition: &'static Transition<ResearchStatus>,
    ) -> Result<Attempt<ResearchStatus>> {
        let attempt = Attempt::begin(transition, session.status)?;
        let claimed = self
            .store
            .compare_and_set_research_status(session.id, attempt.prior(), attempt.marker())
            .await?;
        if !claimed {
            return Err(CoreError::PipelineState(format!(
                "Cannot {}: research session {} changed status, reload and try again",
                attempt.action(),
                session.id
            )));
        }
        Ok(attempt)
    }

    async fn finish<T>(
        &self,
        id: i64,
        attempt: Attempt<ResearchStatus>,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                self.store
                    .set_research_status(id, attempt.settle(Outcome::Succeeded))
                    .await?;
                Ok(value)
            }
            Err(err) => {
                error!(session_id = id, action = attempt.action(), error = ?err, "research action failed");
                let prior = attempt.settle(Outcome::Failed);
                if let Err(restore) = self.store.set_research_status(id, prior).await {
                    error!(session_id = id, status = %prior, error = %restore, "failed to restore status");
                }
                Err(err)
            }
        }
    }
}

fn not_found(id: i64) -> CoreError {
    CoreError::NotFound(format!("Research session {id}"))
}

fn no_finding(action: &str) -> CoreError {
    CoreError::PipelineState(format!("No research findings to {action} yet. Run research first."))
}
