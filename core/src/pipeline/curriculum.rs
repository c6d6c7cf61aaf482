use tracing::{error, info};

use super::state::{self, Attempt, Outcome, Transition};
use crate::db::Store;
use crate::error::{CoreError, Result};
use crate::generate::{CurriculumLessonInput, GeneratedLesson, Generator};
use crate::models::{
    CurriculumOutline, CurriculumPlan, CurriculumPlanDetail, CurriculumStatus,
    DEFAULT_SUBJECT_COLOR, DEFAULT_SUBJECT_ICON, NewCurriculumPlan, NewLesson, NewSubject,
    NewTopic, OutlineLesson, OutlinePatch, OutlineWeek, Subject, Topic,
};

const NO_OUTLINE: &str = "No outline available. Generate an outline first.";

/// Drives a curriculum plan from concept to a published run of lessons.
#[derive(Clone)]
pub struct CurriculumPipeline {
    store: Store,
    generator: Generator,
}

/// Where one outline lesson sits in the plan.
struct Slot<'a> {
    outline: &'a CurriculumOutline,
    week_index: usize,
    week: &'a OutlineWeek,
    lesson_index: usize,
    lesson: &'a OutlineLesson,
}

impl Slot<'_> {
    fn order(&self) -> u32 {
        u32::try_from(self.lesson_index).unwrap_or(u32::MAX)
    }

    fn title(&self) -> String {
        if self.lesson.title.trim().is_empty() {
            format!(
                "Week {} Lesson {}",
                self.week.week_number,
                self.lesson_index + 1
            )
        } else {
            self.lesson.title.clone()
        }
    }

    /// Next lesson in the week, else the first of the following week.
    fn upcoming_title(&self) -> Option<String> {
        self.week
            .lessons
            .get(self.lesson_index + 1)
            .or_else(|| {
                self.outline
                    .weeks
                    .get(self.week_index + 1)
                    .and_then(|week| week.lessons.first())
            })
            .map(|lesson| lesson.title.clone())
            .filter(|title| !title.is_empty())
    }

    fn input(&self, plan: &CurriculumPlan, previous_lessons: String) -> CurriculumLessonInput {
        CurriculumLessonInput {
            concept: plan.concept.clone(),
            grade_level: plan.grade_level,
            difficulty: plan.difficulty.as_str().to_string(),
            week_number: self.week.week_number,
            lesson_number: self.order() + 1,
            lesson_title: self.title(),
            learning_objectives: self.lesson.learning_objectives.clone(),
            lesson_description: self.lesson.description.clone(),
            previous_lessons,
            upcoming_title: self.upcoming_title(),
        }
    }
}

/// One line of the running "previous lessons" narrative.
fn narrative_line(week_number: u32, order: u32, title: &str, objectives: &str) -> String {
    format!(
        "Week {week_number}, Lesson {}: {title} — {objectives}",
        order + 1
    )
}

impl CurriculumPipeline {
    pub fn new(store: Store, generator: Generator) -> Self {
        Self { store, generator }
    }

    pub async fn create(&self, plan: NewCurriculumPlan) -> Result<CurriculumPlanDetail> {
        plan.validate()?;
        if let Some(subject_id) = plan.subject_id {
            self.store
                .get_subject(subject_id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("Subject {subject_id}")))?;
        }
        let created = self.store.create_curriculum_plan(plan).await?;
        info!(plan_id = created.id, concept = %created.concept, "curriculum plan created");
        self.detail(created.id).await
    }

    pub async fn detail(&self, id: i64) -> Result<CurriculumPlanDetail> {
        self.store
            .curriculum_plan_detail(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Ask the generator for a week-by-week outline and pick a subject for it.
    pub async fn generate_outline(&self, id: i64) -> Result<CurriculumPlanDetail> {
        let plan = self.plan(id).await?;
        let attempt = self
            .begin(&plan, &state::curriculum::GENERATE_OUTLINE)
            .await?;
        let result = self.run_generate_outline(&plan).await;
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn run_generate_outline(&self, plan: &CurriculumPlan) -> Result<()> {
        let outline = self
            .generator
            .generate_curriculum_outline(
                &plan.concept,
                plan.grade_level,
                plan.duration_weeks,
                plan.lessons_per_week,
                plan.difficulty.as_str(),
            )
            .await?;
        let title = if outline.title.trim().is_empty() {
            plan.concept.clone()
        } else {
            outline.title.clone()
        };
        let description = outline.description.clone();
        let subject_id = match plan.subject_id {
            Some(_) => None,
            None => Some(self.outline_subject(plan, &outline).await?.id),
        };
        let weeks = outline.weeks.len();
        self.store
            .save_outline(plan.id, outline, title, description, subject_id)
            .await?;
        info!(plan_id = plan.id, weeks, "curriculum outline generated");
        Ok(())
    }

    /// Hand edits to the outline, title or description. No status change.
    pub async fn update_outline(&self, id: i64, patch: OutlinePatch) -> Result<CurriculumPlanDetail> {
        if !self.store.update_outline(id, patch).await? {
            return Err(not_found(id));
        }
        self.detail(id).await
    }

    /// Generate every outline lesson that has no entry yet, in order.
    ///
    /// Entries persist as soon as they are written, so a failed run keeps
    /// what it produced and a re-run only fills the gaps.
    pub async fn generate_lessons(&self, id: i64) -> Result<CurriculumPlanDetail> {
        let plan = self.plan(id).await?;
        let outline = usable_outline(&plan)?;
        let attempt = self
            .begin(&plan, &state::curriculum::GENERATE_LESSONS)
            .await?;
        let result = self.fill_lessons(&plan, &outline).await;
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn fill_lessons(&self, plan: &CurriculumPlan, outline: &CurriculumOutline) -> Result<()> {
        let topic = self.ensure_topic(plan, outline).await?;
        let mut previous: Vec<String> = Vec::new();
        let mut created = 0usize;

        for (week_index, week) in outline.weeks.iter().enumerate() {
            for (lesson_index, lesson) in week.lessons.iter().enumerate() {
                let slot = Slot {
                    outline,
                    week_index,
                    week,
                    lesson_index,
                    lesson,
                };
                if let Some(existing) = self
                    .store
                    .find_curriculum_lesson(plan.id, week.week_number, slot.order())
                    .await?
                {
                    previous.push(narrative_line(
                        week.week_number,
                        slot.order(),
                        &existing.lesson_title,
                        &existing.learning_objectives,
                    ));
                    continue;
                }

                let input = slot.input(plan, previous.join("\n"));
                let generated = self.generator.generate_curriculum_lesson(&input).await?;
                self.store
                    .create_curriculum_entry(
                        plan.id,
                        new_lesson(plan, &topic, &generated),
                        week.week_number,
                        slot.order(),
                        lesson.learning_objectives.join("\n"),
                    )
                    .await?;
                previous.push(narrative_line(
                    week.week_number,
                    slot.order(),
                    &generated.title,
                    &lesson.learning_objectives.join(", "),
                ));
                created += 1;
            }
        }
        info!(plan_id = plan.id, created, "curriculum lessons generated");
        Ok(())
    }

    /// Regenerate the lesson at (`week_number`, `lesson_index`), replacing
    /// any existing entry. The plan status is left alone.
    pub async fn generate_single_lesson(
        &self,
        id: i64,
        week_number: u32,
        lesson_index: u32,
    ) -> Result<CurriculumPlanDetail> {
        let plan = self.plan(id).await?;
        let outline = usable_outline(&plan)?;
        let week_index = outline
            .weeks
            .iter()
            .position(|week| week.week_number == week_number)
            .ok_or_else(|| CoreError::NotFound(format!("Week {week_number}")))?;
        let week = &outline.weeks[week_index];
        let lesson = usize::try_from(lesson_index)
            .ok()
            .and_then(|index| week.lessons.get(index))
            .ok_or_else(|| CoreError::NotFound(format!("Lesson index {lesson_index}")))?;
        let slot = Slot {
            outline: &outline,
            week_index,
            week,
            lesson_index: lesson_index as usize,
            lesson,
        };

        let result = self.regenerate(&plan, &slot).await;
        if let Err(err) = &result {
            error!(
                plan_id = id,
                week_number,
                lesson_index,
                error = ?err,
                "single lesson generation failed"
            );
        }
        result?;
        self.detail(id).await
    }

    async fn regenerate(&self, plan: &CurriculumPlan, slot: &Slot<'_>) -> Result<()> {
        let topic = self.ensure_topic(plan, slot.outline).await?;
        let previous = self
            .store
            .list_curriculum_lessons(plan.id)
            .await?
            .into_iter()
            .filter(|entry| {
                (entry.week_number, entry.order) < (slot.week.week_number, slot.order())
            })
            .map(|entry| {
                narrative_line(
                    entry.week_number,
                    entry.order,
                    &entry.lesson_title,
                    &entry.learning_objectives,
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let generated = self
            .generator
            .generate_curriculum_lesson(&slot.input(plan, previous))
            .await?;
        self.store
            .replace_curriculum_entry(
                plan.id,
                new_lesson(plan, &topic, &generated),
                slot.week.week_number,
                slot.order(),
                slot.lesson.learning_objectives.join("\n"),
            )
            .await?;
        Ok(())
    }

    /// Publish every entry's lesson. A non-empty `kid_ids` replaces the
    /// assignees of the plan and of each lesson.
    pub async fn publish(&self, id: i64, kid_ids: Vec<i64>) -> Result<CurriculumPlanDetail> {
        let plan = self.plan(id).await?;
        if self.store.list_curriculum_lessons(id).await?.is_empty() {
            return Err(CoreError::PipelineState(
                "No lessons generated yet".to_string(),
            ));
        }
        let attempt = self.begin(&plan, &state::curriculum::PUBLISH).await?;
        let result = self
            .store
            .publish_curriculum(id, kid_ids)
            .await
            .map_err(CoreError::from);
        self.finish(id, attempt, result).await?;
        self.detail(id).await
    }

    async fn plan(&self, id: i64) -> Result<CurriculumPlan> {
        self.store
            .get_curriculum_plan(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Subject named by the outline, falling back to the concept.
    async fn outline_subject(
        &self,
        plan: &CurriculumPlan,
        outline: &CurriculumOutline,
    ) -> Result<Subject> {
        Ok(self
            .store
            .get_or_create_subject(NewSubject {
                name: non_empty(&outline.subject_name, &plan.concept),
                description: format!("Auto-created for curriculum: {}", plan.concept),
                icon: non_empty(&outline.subject_icon, DEFAULT_SUBJECT_ICON),
                color: non_empty(&outline.subject_color, DEFAULT_SUBJECT_COLOR),
            })
            .await?)
    }

    /// Topic under the plan's subject that holds its lessons.
    async fn ensure_topic(&self, plan: &CurriculumPlan, outline: &CurriculumOutline) -> Result<Topic> {
        let subject_id = match plan.subject_id {
            Some(subject_id) => subject_id,
            None => {
                let subject = self.outline_subject(plan, outline).await?;
                self.store.set_plan_subject(plan.id, subject.id).await?;
                subject.id
            }
        };
        Ok(self
            .store
            .get_or_create_topic(NewTopic {
                subject_id,
                name: plan.concept.clone(),
                description: plan.description.clone(),
                grade_level_min: plan.grade_level.saturating_sub(1).clamp(1, 12),
                grade_level_max: plan.grade_level.saturating_add(1).clamp(1, 12),
            })
            .await?)
    }

    async fn begin(
        &self,
        plan: &CurriculumPlan,
        transition: &'static Transition<CurriculumStatus>,
    ) -> Result<Attempt<CurriculumStatus>> {
        let attempt = Attempt::begin(transition, plan.status)?;
        let claimed = self
            .store
            .compare_and_set_curriculum_status(plan.id, attempt.prior(), attempt.marker())
            .await?;
        if !claimed {
            return Err(CoreError::PipelineState(format!(
                "Cannot {}: curriculum plan {} changed status, reload and try again",
                attempt.action(),
                plan.id
            )));
        }
        Ok(attempt)
    }

    async fn finish<T>(
        &self,
        id: i64,
        attempt: Attempt<CurriculumStatus>,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                self.store
                    .set_curriculum_status(id, attempt.settle(Outcome::Succeeded))
                    .await?;
                Ok(value)
            }
            Err(err) => {
                error!(plan_id = id, action = attempt.action(), error = ?err, "curriculum action failed");
                let prior = attempt.settle(Outcome::Failed);
                if let Err(restore) = self.store.set_curriculum_status(id, prior).await {
                    error!(plan_id = id, status = %prior, error = %restore, "failed to restore status");
                }
                Err(err)
            }
        }
    }
}

fn usable_outline(plan: &CurriculumPlan) -> Result<CurriculumOutline> {
    plan.outline
        .clone()
        .filter(|outline| !outline.weeks.is_empty())
        .ok_or_else(|| CoreError::PipelineState(NO_OUTLINE.to_string()))
}

fn new_lesson(plan: &CurriculumPlan, topic: &Topic, generated: &GeneratedLesson) -> NewLesson {
    NewLesson {
        topic_id: topic.id,
        title: generated.title.clone(),
        description: generated.description.clone(),
        content: generated.content.clone(),
        grade_level: plan.grade_level,
        difficulty: plan.difficulty,
        estimated_minutes: generated.estimated_minutes,
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn not_found(id: i64) -> CoreError {
    CoreError::NotFound(format!("Curriculum plan {id}"))
}
