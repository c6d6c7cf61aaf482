use mindcraft_core::db::Store;
use mindcraft_core::error::CoreError;
use mindcraft_core::models::{
    CurriculumStatus, Difficulty, LessonStatus, NewCurriculumPlan, NewLesson, NewTopic,
};
use mindcraft_core::pipeline::CurriculumPipeline;
use pretty_assertions::assert_eq;

use super::support::{ScriptedCompletion, backend_error, generator, kid, temp_store};

const OUTLINE: &str = r#"```json
{
  "title": "Money Basics",
  "description": "Coins, change and saving.",
  "subject_name": "Financial Literacy",
  "subject_icon": "💰",
  "weeks": [
    {
      "week_number": 1,
      "title": "Coins",
      "lessons": [
        {"title": "Counting coins", "learning_objectives": ["Name coins", "Add coins"]},
        {"title": "Making change", "learning_objectives": ["Subtract prices"]}
      ]
    }
  ]
}
```"#;

fn money_plan() -> NewCurriculumPlan {
    serde_json::from_value(serde_json::json!({
        "concept": "Money",
        "grade_level": 3,
        "duration_weeks": 1,
        "lessons_per_week": 2,
    }))
    .expect("plan json")
}

async fn planned(
    store: &Store,
    completion: &ScriptedCompletion,
    pipeline: &CurriculumPipeline,
) -> anyhow::Result<i64> {
    let id = pipeline.create(money_plan()).await?.plan.id;
    completion.reply(Ok(OUTLINE.to_string()));
    let detail = pipeline.generate_outline(id).await?;
    assert_eq!(detail.plan.status, CurriculumStatus::OutlineReady);
    assert!(store.get_curriculum_plan(id).await?.is_some());
    Ok(id)
}

#[tokio::test]
async fn outline_sets_title_and_creates_subject() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));
    let id = planned(&store, &completion, &pipeline).await?;

    let plan = pipeline.detail(id).await?.plan;
    assert_eq!(plan.title, "Money Basics");
    assert_eq!(plan.description, "Coins, change and saving.");
    let subject = store
        .get_subject(plan.subject_id.expect("subject assigned"))
        .await?
        .expect("subject exists");
    assert_eq!(subject.name, "Financial Literacy");
    assert_eq!(subject.icon, "💰");
    assert_eq!(subject.color, "#6366f1");
    assert_eq!(subject.description, "Auto-created for curriculum: Money");
    Ok(())
}

#[tokio::test]
async fn failed_outline_restores_planning() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));
    let id = pipeline.create(money_plan()).await?.plan.id;

    completion.reply(Ok("not json at all".to_string()));
    let err = pipeline.generate_outline(id).await.expect_err("bad outline");
    assert!(matches!(err, CoreError::MalformedResponse(_)));
    let plan = pipeline.detail(id).await?.plan;
    assert_eq!(plan.status, CurriculumStatus::Planning);
    assert_eq!(plan.outline, None);
    Ok(())
}

#[tokio::test]
async fn lesson_fill_skips_existing_entries() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));
    let id = planned(&store, &completion, &pipeline).await?;

    let plan = store.get_curriculum_plan(id).await?.expect("plan");
    let topic = store
        .get_or_create_topic(NewTopic {
            subject_id: plan.subject_id.expect("subject"),
            name: "Money".to_string(),
            description: String::new(),
            grade_level_min: 2,
            grade_level_max: 4,
        })
        .await?;
    let existing = store
        .create_curriculum_entry(
            id,
            NewLesson {
                topic_id: topic.id,
                title: "Hand-written coins".to_string(),
                description: String::new(),
                content: "# Hand-written coins".to_string(),
                grade_level: 3,
                difficulty: Difficulty::Medium,
                estimated_minutes: 20,
            },
            1,
            0,
            "Name coins\nAdd coins".to_string(),
        )
        .await?;

    completion.reply(Ok("# Making Change\n\nGive back the difference.".to_string()));
    let detail = pipeline.generate_lessons(id).await?;
    assert_eq!(detail.plan.status, CurriculumStatus::Complete);

    let slots = detail
        .entries
        .iter()
        .map(|e| (e.week_number, e.order, e.lesson_title.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        slots,
        vec![(1, 0, "Hand-written coins"), (1, 1, "Making Change")]
    );
    assert_eq!(detail.entries[0], existing);
    assert_eq!(detail.entries[1].learning_objectives, "Subtract prices");

    let requests = completion.requests();
    assert_eq!(requests.len(), 2, "one outline call and one lesson call");
    let prompt = &requests[1].messages[0].content;
    assert!(
        prompt.contains("Week 1, Lesson 1: Hand-written coins — Name coins"),
        "{prompt}"
    );
    assert!(prompt.contains("Week 1, Lesson 2"), "{prompt}");
    Ok(())
}

#[tokio::test]
async fn failed_fill_keeps_created_entries_and_restores_status() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));
    let id = planned(&store, &completion, &pipeline).await?;

    completion.reply(Ok("# Counting Coins\n\nPennies first.".to_string()));
    completion.reply(Err(backend_error("overloaded")));
    pipeline.generate_lessons(id).await.expect_err("second lesson fails");

    let detail = pipeline.detail(id).await?;
    assert_eq!(detail.plan.status, CurriculumStatus::OutlineReady);
    assert_eq!(detail.entries.len(), 1);
    assert_eq!(detail.entries[0].order, 0);

    completion.reply(Ok("# Making Change\n\nCount up.".to_string()));
    let detail = pipeline.generate_lessons(id).await?;
    assert_eq!(detail.plan.status, CurriculumStatus::Complete);
    assert_eq!(detail.entries.len(), 2);
    assert_eq!(completion.requests().len(), 4);
    Ok(())
}

#[tokio::test]
async fn single_lesson_regeneration_replaces_entry() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));
    let id = planned(&store, &completion, &pipeline).await?;
    completion.reply(Ok("# Counting Coins\n\nPennies.".to_string()));
    completion.reply(Ok("# Making Change\n\nCount up.".to_string()));
    let before = pipeline.generate_lessons(id).await?;
    let old = before.entries[1].clone();

    completion.reply(Ok("# Change Made Easy\n\nTry again.".to_string()));
    let after = pipeline.generate_single_lesson(id, 1, 1).await?;
    assert_eq!(after.plan.status, CurriculumStatus::Complete);
    assert_eq!(after.entries.len(), 2);
    assert_eq!(after.entries[0], before.entries[0]);
    assert_eq!(after.entries[1].lesson_title, "Change Made Easy");
    assert_eq!(store.get_lesson(old.lesson_id).await?, None);

    let prompt = &completion.requests()[3].messages[0].content;
    assert!(prompt.contains("Week 1, Lesson 1: Counting Coins"), "{prompt}");

    let err = pipeline
        .generate_single_lesson(id, 9, 0)
        .await
        .expect_err("no such week");
    assert_eq!(err.to_string(), "Week 9 not found");
    let err = pipeline
        .generate_single_lesson(id, 1, 5)
        .await
        .expect_err("no such lesson");
    assert_eq!(err.to_string(), "Lesson index 5 not found");
    Ok(())
}

#[tokio::test]
async fn publish_requires_lessons_and_assigns_kids() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));
    let ada = kid(&store, None).await;

    let bare = pipeline.create(money_plan()).await?.plan.id;
    let err = pipeline.generate_lessons(bare).await.expect_err("no outline");
    assert_eq!(
        err.to_string(),
        "No outline available. Generate an outline first."
    );
    let err = pipeline.publish(bare, vec![ada.id]).await.expect_err("nothing to publish");
    assert_eq!(err.to_string(), "No lessons generated yet");

    let id = planned(&store, &completion, &pipeline).await?;
    completion.reply(Ok("# Counting Coins\n\nPennies.".to_string()));
    completion.reply(Ok("# Making Change\n\nCount up.".to_string()));
    pipeline.generate_lessons(id).await?;

    let detail = pipeline.publish(id, vec![ada.id]).await?;
    assert_eq!(detail.plan.status, CurriculumStatus::Published);
    for entry in &detail.entries {
        let lesson = store.get_lesson(entry.lesson_id).await?.expect("lesson");
        assert_eq!(lesson.status, LessonStatus::Published);
        assert_eq!(store.lesson_assignees(entry.lesson_id).await?, vec![ada.id]);
    }
    assert_eq!(store.plan_assignees(id).await?, vec![ada.id]);
    Ok(())
}

#[tokio::test]
async fn out_of_range_grade_is_rejected_before_any_stage() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let completion = ScriptedCompletion::new();
    let pipeline = CurriculumPipeline::new(store.clone(), generator(completion.clone()));

    for grade in [0, 13, u32::MAX] {
        let mut plan = money_plan();
        plan.grade_level = grade;
        let err = pipeline.create(plan).await.expect_err("grade out of range");
        assert_eq!(err.to_string(), "grade_level must be between 1 and 12");
    }
    assert!(completion.requests().is_empty());
    Ok(())
}
