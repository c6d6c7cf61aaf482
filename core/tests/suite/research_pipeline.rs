use mindcraft_core::error::CoreError;
use mindcraft_core::models::{
    FindingPatch, LessonStatus, MediaSource, NewMedia, NewResearchSession, ResearchStatus,
};
use mindcraft_core::pipeline::ResearchPipeline;
use pretty_assertions::assert_eq;

use super::support::{
    FakeResearch, ScriptedCompletion, backend_error, generator, kid, subject, temp_store,
};

fn volcanoes(subject_id: i64) -> NewResearchSession {
    serde_json::from_value(serde_json::json!({
        "subject_id": subject_id,
        "topic_query": "Volcanoes",
        "grade_level": 4,
    }))
    .expect("session json")
}

fn manual_media() -> NewMedia {
    serde_json::from_value(serde_json::json!({
        "url": "https://example.org/lava-lab",
        "title": "Lava lab",
        "media_type": "interactive",
    }))
    .expect("media json")
}

#[tokio::test]
async fn research_to_publish_walks_every_stage() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let science = subject(&store, "Science").await;
    let ada = kid(&store, None).await;
    let completion = ScriptedCompletion::new();
    let research = FakeResearch::working();
    let pipeline = ResearchPipeline::new(store.clone(), research.clone(), generator(completion.clone()));

    let created = pipeline.create(volcanoes(science.id)).await?;
    assert_eq!(created.session.status, ResearchStatus::TopicInput);
    let id = created.session.id;

    let researched = pipeline.research(id).await?;
    assert_eq!(researched.session.status, ResearchStatus::ResearchComplete);
    let finding = researched.finding.expect("finding stored");
    assert_eq!(finding.summary, "All about Volcanoes.");

    pipeline
        .update_finding(
            id,
            FindingPatch {
                parent_notes: Some("She loves Hawaii".to_string()),
                ..Default::default()
            },
        )
        .await?;
    // A manual resource added before the lesson exists is linked on generation.
    pipeline.add_media(id, manual_media()).await?;

    completion.reply(Ok("# Volcanoes Up Close\n\nMagma rises from deep below.".to_string()));
    let generated = pipeline.generate_lesson(id).await?;
    assert_eq!(generated.session.status, ResearchStatus::Generated);
    let lesson_id = generated.session.lesson_id.expect("lesson linked");
    assert!(generated.session.topic_id.is_some());
    assert!(generated.media.iter().all(|m| m.lesson_id == Some(lesson_id)));

    let prompt = &completion.requests()[0].messages[0].content;
    assert!(prompt.contains("She loves Hawaii"), "{prompt}");
    assert!(prompt.contains("Lava lab"), "{prompt}");

    let enriched = pipeline.discover_media(id).await?;
    assert_eq!(enriched.session.status, ResearchStatus::Ready);
    let auto = enriched
        .media
        .iter()
        .filter(|m| m.source == MediaSource::Auto)
        .collect::<Vec<_>>();
    assert_eq!(auto.len(), 2);
    assert_eq!(auto.iter().map(|m| m.order).collect::<Vec<_>>(), vec![0, 1]);
    assert!(auto.iter().all(|m| m.lesson_id == Some(lesson_id)));

    let published = pipeline.publish(id, vec![ada.id]).await?;
    assert_eq!(published.session.status, ResearchStatus::Published);
    let lesson = store.get_lesson(lesson_id).await?.expect("lesson exists");
    assert_eq!(lesson.title, "Volcanoes Up Close");
    assert_eq!(lesson.status, LessonStatus::Published);
    assert!(lesson.ai_generated);
    assert_eq!(store.lesson_assignees(lesson_id).await?, vec![ada.id]);
    assert_eq!(research.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_research_restores_prior_status() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let science = subject(&store, "Science").await;
    let pipeline = ResearchPipeline::new(
        store.clone(),
        FakeResearch::failing(),
        generator(ScriptedCompletion::new()),
    );
    let id = pipeline.create(volcanoes(science.id)).await?.session.id;

    let err = pipeline.research(id).await.expect_err("research fails");
    assert!(matches!(err, CoreError::Backend { status: Some(503), .. }));

    let detail = pipeline.detail(id).await?;
    assert_eq!(detail.session.status, ResearchStatus::TopicInput);
    assert_eq!(detail.finding, None);
    Ok(())
}

#[tokio::test]
async fn failed_generation_returns_to_the_status_it_started_from() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let science = subject(&store, "Science").await;
    let completion = ScriptedCompletion::new();
    let pipeline =
        ResearchPipeline::new(store.clone(), FakeResearch::working(), generator(completion.clone()));
    let id = pipeline.create(volcanoes(science.id)).await?.session.id;
    pipeline.research(id).await?;

    completion.reply(Err(backend_error("overloaded")));
    pipeline.generate_lesson(id).await.expect_err("generation fails");
    let detail = pipeline.detail(id).await?;
    assert_eq!(detail.session.status, ResearchStatus::ResearchComplete);
    assert_eq!(detail.session.lesson_id, None);

    // Re-triggering from a later stage rolls back to that stage on failure.
    completion.reply(Ok("# Lava\n\nHot.".to_string()));
    pipeline.generate_lesson(id).await?;
    pipeline.discover_media(id).await?;
    completion.reply(Err(backend_error("overloaded")));
    pipeline.generate_lesson(id).await.expect_err("generation fails");
    assert_eq!(pipeline.detail(id).await?.session.status, ResearchStatus::Ready);
    Ok(())
}

#[tokio::test]
async fn disallowed_actions_never_reach_a_backend() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let science = subject(&store, "Science").await;
    let research = FakeResearch::working();
    let pipeline = ResearchPipeline::new(
        store.clone(),
        research.clone(),
        generator(ScriptedCompletion::new()),
    );
    let id = pipeline.create(volcanoes(science.id)).await?.session.id;

    let err = pipeline.discover_media(id).await.expect_err("not yet allowed");
    assert_eq!(
        err.to_string(),
        "Cannot discover media while status is 'topic_input' (allowed from: generated, ready)"
    );
    assert_eq!(research.calls(), 0);

    let err = pipeline.publish(id, Vec::new()).await.expect_err("no lesson");
    assert_eq!(err.to_string(), "No lesson generated yet");

    let err = pipeline
        .update_finding(id, FindingPatch::default())
        .await
        .expect_err("no finding");
    assert!(matches!(err, CoreError::PipelineState(_)));
    assert_eq!(pipeline.detail(id).await?.session.status, ResearchStatus::TopicInput);
    Ok(())
}

#[tokio::test]
async fn media_edits_report_missing_resources() -> anyhow::Result<()> {
    let (store, _dir) = temp_store();
    let science = subject(&store, "Science").await;
    let pipeline = ResearchPipeline::new(
        store.clone(),
        FakeResearch::working(),
        generator(ScriptedCompletion::new()),
    );
    let id = pipeline.create(volcanoes(science.id)).await?.session.id;
    let detail = pipeline.add_media(id, manual_media()).await?;
    let media = &detail.media[0];
    assert_eq!(media.source, MediaSource::Manual);
    assert_eq!(media.lesson_id, None);

    pipeline.delete_media(media.id).await?;
    let err = pipeline.delete_media(media.id).await.expect_err("already gone");
    assert_eq!(err.to_string(), format!("Media resource {} not found", media.id));

    let err = pipeline
        .create(volcanoes(science.id + 100))
        .await
        .expect_err("unknown subject");
    assert!(matches!(err, CoreError::NotFound(_)));
    Ok(())
}
