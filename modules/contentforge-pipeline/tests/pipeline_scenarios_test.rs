//! End-to-end pipeline scenarios against in-memory services.
//!
//! Every upstream is mocked (`contentforge_pipeline::testing`) and tokio time
//! is paused, so render polling advances instantly.
//!
//! Run with: cargo test -p contentforge-pipeline --test pipeline_scenarios_test

use std::sync::Arc;
use std::time::Duration;

use contentforge_common::{
    ApprovalStatus, ArtifactKind, OutputKind, PipelineError, Service,
};
use contentforge_pipeline::manifest::{
    video_filename, BLOG_IMAGE_FILENAME, BLOG_POST_FILENAME, POSTS_TABLE_FILENAME,
};
use contentforge_pipeline::orchestrator::{MediaUnit, UnitResult};
use contentforge_pipeline::run_log::EventKind;
use contentforge_pipeline::testing::{
    article, sample_config, MockImages, MockPublish, MockRender, MockSearch, MockServices,
    MockText,
};
use contentforge_pipeline::text_generator::{roles, GENERAL_KNOWLEDGE};
use contentforge_pipeline::{ApprovalDecision, Orchestrator, RunState};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn orchestrator(mocks: &MockServices) -> Orchestrator {
    Orchestrator::new(mocks.services())
}

fn happy_with(f: impl FnOnce(&mut MockServices)) -> MockServices {
    let mut mocks = MockServices::happy();
    f(&mut mocks);
    mocks
}

// ---------------------------------------------------------------------------
// Draft stage
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn zero_references_still_produces_draft_and_full_run() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);

    let mut run = orch.start(sample_config()).await.unwrap();
    assert_eq!(run.state(), RunState::AwaitingApproval);

    let snapshot = run.snapshot();
    assert!(snapshot.references.is_empty());
    assert!(snapshot.draft.is_some());
    let prompt = mocks.text.last_prompt(roles::BLOG_WRITER).unwrap();
    assert!(prompt.contains(GENERAL_KNOWLEDGE), "{prompt}");

    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();
    assert_eq!(snapshot.state, RunState::Done);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.published_urls().len(), 3);

    let export = run.export();
    assert!(export.artifact(BLOG_POST_FILENAME).is_some());
    assert!(export.artifact(BLOG_IMAGE_FILENAME).is_some());
    assert!(export.artifact(POSTS_TABLE_FILENAME).is_some());
    assert_eq!(export.by_kind(ArtifactKind::Video).count(), 3);
}

#[tokio::test(start_paused = true)]
async fn relevant_references_reach_the_prompt() {
    let mocks = happy_with(|m| {
        m.search = Arc::new(MockSearch::new().on_query(
            "mindfulness bundle, stress relief",
            vec![
                article("Markets slide", "Rates up again", "https://news.example/markets"),
                article("Meditation breaks at work", "", "https://news.example/meditation"),
            ],
        ));
    });
    let run = orchestrator(&mocks).start(sample_config()).await.unwrap();

    let urls: Vec<_> = run.snapshot().references.into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["https://news.example/meditation"]);

    let prompt = mocks.text.last_prompt(roles::BLOG_WRITER).unwrap();
    assert!(prompt.contains("https://news.example/meditation"));
    assert!(!prompt.contains("https://news.example/markets"));
    assert!(!prompt.contains(GENERAL_KNOWLEDGE));
}

#[tokio::test(start_paused = true)]
async fn search_outage_degrades_to_general_knowledge() {
    let mocks = happy_with(|m| m.search = Arc::new(MockSearch::unavailable()));
    let run = orchestrator(&mocks).start(sample_config()).await.unwrap();

    assert_eq!(run.state(), RunState::AwaitingApproval);
    let degraded = run.run_log().events().into_iter().any(|e| {
        matches!(e.kind, EventKind::ReferenceSearch { degraded: true, references: 0, .. })
    });
    assert!(degraded);
}

#[tokio::test(start_paused = true)]
async fn low_confidence_aborts_and_hides_draft() {
    let mocks = happy_with(|m| {
        m.text = Arc::new(MockText::happy().on_role(roles::FACT_CHECKER, "Confidence: 40 - several claims are wrong"));
    });
    let run = orchestrator(&mocks).start(sample_config()).await.unwrap();

    let snapshot = run.snapshot();
    assert_eq!(snapshot.state, RunState::Aborted);
    assert!(snapshot.draft.is_none());
    assert_eq!(
        snapshot.error,
        Some(PipelineError::ThresholdNotMet {
            confidence: 40,
            explanation: "several claims are wrong".into(),
        })
    );
    assert!(run.export().artifacts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unparseable_fact_check_aborts_with_fallback_score() {
    let mocks = happy_with(|m| {
        m.text = Arc::new(MockText::happy().on_role(roles::FACT_CHECKER, "Looks fine overall."));
    });
    let run = orchestrator(&mocks).start(sample_config()).await.unwrap();

    let snapshot = run.snapshot();
    assert_eq!(snapshot.state, RunState::Aborted);
    assert_eq!(
        snapshot.error,
        Some(PipelineError::ThresholdNotMet {
            confidence: 50,
            explanation: "unparseable".into(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn draft_generation_outage_aborts_run() {
    let mocks = happy_with(|m| m.text = Arc::new(MockText::unavailable()));
    let run = orchestrator(&mocks).start(sample_config()).await.unwrap();

    let snapshot = run.snapshot();
    assert_eq!(snapshot.state, RunState::Aborted);
    assert!(matches!(
        snapshot.error,
        Some(PipelineError::UpstreamUnavailable { service: Service::TextGeneration, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn invalid_config_fails_before_any_call() {
    let mocks = MockServices::happy();
    let mut config = sample_config();
    config.credentials.venice_api_key.clear();

    let err = orchestrator(&mocks).start(config).await.err().unwrap();
    assert!(matches!(err, PipelineError::Validation(ref msg) if msg.contains("venice_api_key")));
    assert!(mocks.search.queries().is_empty());
    assert_eq!(mocks.text.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Approval loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn empty_feedback_is_rejected_and_run_unchanged() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let before = run.snapshot().draft;
    let calls = mocks.text.call_count();

    let err = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Revise("   ".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(run.state(), RunState::AwaitingApproval);
    assert_eq!(run.snapshot().draft, before);
    assert_eq!(mocks.text.call_count(), calls);
}

#[tokio::test(start_paused = true)]
async fn revision_returns_to_approval_without_refact_checking() {
    let mocks = happy_with(|m| {
        m.text = Arc::new(MockText::happy().on_prompt(
            roles::BLOG_WRITER,
            "Revise this blog post",
            "# 5 Warmer Ways to Find Calm",
        ));
    });
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();

    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Revise("make it warmer".into()))
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::AwaitingApproval);
    let draft = snapshot.draft.unwrap();
    assert_eq!(draft.body, "# 5 Warmer Ways to Find Calm");
    assert_eq!(draft.revision_count, 1);
    assert_eq!(draft.feedback_history, vec!["make it warmer"]);
    assert_eq!(mocks.text.calls_for(roles::FACT_CHECKER).len(), 1);

    let prompt = mocks.text.last_prompt(roles::BLOG_WRITER).unwrap();
    assert!(prompt.contains("make it warmer"));
    assert!(prompt.contains("# 5 Ways to Find Calm"));
}

#[tokio::test(start_paused = true)]
async fn rejection_discards_draft_and_returns_to_idle() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();

    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Reject)
        .await
        .unwrap();
    assert_eq!(snapshot.state, RunState::Idle);
    assert!(snapshot.draft.is_none());

    let err = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition(_)));
    assert!(run.export().artifacts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn approved_draft_is_frozen_in_manifest() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let body = run.snapshot().draft.unwrap().body;

    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();
    assert_eq!(snapshot.draft.unwrap().status, ApprovalStatus::Approved);

    let export = run.export();
    let text = export.artifact(BLOG_POST_FILENAME).unwrap();
    assert_eq!(text.kind, ArtifactKind::Text);
    assert_eq!(text.payload, body.as_bytes());

    let err = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Revise("too late".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition(_)));
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_paused_run_aborts_it() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    assert_eq!(run.state(), RunState::AwaitingApproval);

    let snapshot = orch.cancel_pending(&mut run).unwrap();
    assert_eq!(snapshot.state, RunState::Aborted);
    assert_eq!(snapshot.error, Some(PipelineError::Cancelled));
    assert!(run.cancel_token().is_cancelled());
    assert!(run.export().artifacts.is_empty());
    assert!(run
        .run_log()
        .events()
        .iter()
        .any(|e| matches!(e.kind, EventKind::RunAborted { .. })));

    let err = orch.cancel_pending(&mut run).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition(_)));
    let err = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidTransition(_)));
    assert!(mocks.images.generated().is_empty());
}

// ---------------------------------------------------------------------------
// Media stage
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_render_submission_drops_only_that_unit() {
    let mocks = happy_with(|m| {
        m.render = Arc::new(MockRender::new().fail_submit_for_title("Calm Moment 2"));
    });
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Done);
    let failures: Vec<_> = snapshot.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, MediaUnit::ShortForm(2));
    assert!(matches!(
        failures[0].1,
        PipelineError::UpstreamUnavailable { service: Service::RenderJob, .. }
    ));

    let export = run.export();
    let indices: Vec<u32> = export.posts.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![1, 3]);
    assert!(export.artifact(&video_filename(1)).is_some());
    assert!(export.artifact(&video_filename(2)).is_none());
    assert!(export.artifact(&video_filename(3)).is_some());
    assert_eq!(mocks.publish.published().len(), 2);

    let table = export.artifact(POSTS_TABLE_FILENAME).unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&table.payload).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_copy_fails_only_its_unit() {
    let mocks = happy_with(|m| {
        m.text = Arc::new(MockText::happy().on_prompt(
            roles::SOCIAL_MEDIA_MANAGER,
            "aspect 2.",
            "Title: Half a Post\nHashtags: #a",
        ));
    });
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Done);
    let failures: Vec<_> = snapshot.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, MediaUnit::ShortForm(2));
    assert!(matches!(failures[0].1, PipelineError::MalformedGenerationResponse { .. }));

    let indices: Vec<u32> = run.export().posts.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![1, 3]);
    assert_eq!(mocks.render.submitted().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn copy_outage_for_one_unit_leaves_siblings_publishing() {
    let mocks = happy_with(|m| {
        m.text = Arc::new(MockText::happy().fail_prompt(roles::SOCIAL_MEDIA_MANAGER, "aspect 1."));
    });
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Done);
    let failed: Vec<_> = snapshot.failures().map(|(unit, _)| unit).collect();
    assert_eq!(failed, vec![MediaUnit::ShortForm(1)]);
    assert_eq!(snapshot.published_urls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn blog_image_failure_does_not_block_short_form() {
    let mocks = happy_with(|m| m.images = Arc::new(MockImages::new().fail_for("serene")));
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Done);
    let failures: Vec<_> = snapshot.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, MediaUnit::BlogImage);
    assert!(matches!(
        failures[0].1,
        PipelineError::UpstreamUnavailable { service: Service::ImageGeneration, .. }
    ));

    let export = run.export();
    assert!(export.artifact(BLOG_IMAGE_FILENAME).is_none());
    assert!(export.artifact(BLOG_POST_FILENAME).is_some());
    assert_eq!(export.posts.len(), 3);
    assert_eq!(mocks.publish.published().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn publish_failure_is_reported_not_fatal() {
    let mocks = happy_with(|m| {
        m.publish = Arc::new(MockPublish::new().fail_for_title("Calm Moment 3"));
    });
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Done);
    let failed: Vec<_> = snapshot.failures().map(|(unit, _)| unit).collect();
    assert_eq!(failed, vec![MediaUnit::ShortForm(3)]);
    assert!(run.export().artifact(&video_filename(3)).is_none());
    assert_eq!(run.export().posts.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn render_timeouts_end_units_within_deadline() {
    let mocks = happy_with(|m| m.render = Arc::new(MockRender::new().never_finishes()));
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();

    let started = tokio::time::Instant::now();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    // Four units with worker_limit 3: short-form 3 waits for a free slot.
    assert!(started.elapsed() <= Duration::from_secs(2 * 600));
    assert_eq!(snapshot.state, RunState::Done);
    let timed_out = snapshot
        .failures()
        .filter(|(_, e)| matches!(e, PipelineError::JobTimedOut { .. }))
        .count();
    assert_eq!(timed_out, 3);

    let export = run.export();
    assert!(export.posts.is_empty());
    assert!(export.artifact(POSTS_TABLE_FILENAME).is_none());
    assert!(export.artifact(BLOG_IMAGE_FILENAME).is_some());
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_polling_aborts_run() {
    let mocks = happy_with(|m| m.render = Arc::new(MockRender::new().never_finishes()));
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();

    let token = run.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(45)).await;
        token.cancel();
    });

    let started = tokio::time::Instant::now();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(snapshot.state, RunState::Aborted);
    assert_eq!(snapshot.error, Some(PipelineError::Cancelled));
    assert!(run.export().posts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn video_artifact_round_trips_through_export() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    orch.submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    let export = run.export();
    let published = mocks.publish.published();
    for post in &export.posts {
        let video = export.artifact(&post.video_artifact).unwrap();
        assert_eq!(video.kind, ArtifactKind::Video);
        let (_, uploaded_len) = published
            .iter()
            .find(|(req, _)| req.title == post.title)
            .unwrap();
        assert_eq!(video.size_bytes(), *uploaded_len);
        assert!(video.payload.starts_with(b"video:job_"));
    }
    assert_eq!(export.posts.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn posts_carry_board_link_and_hashtags() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    orch.submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    let export = run.export();
    let post = &export.posts[0];
    assert_eq!(post.index, 1);
    assert_eq!(post.title, "Calm Moment 1");
    assert_eq!(post.board, "Mindfulness Tips");
    assert_eq!(post.link, "https://payhip.com/b/tnVQN");
    assert_eq!(post.hashtags.len(), 5);
    assert!(post.image_asset_id.starts_with("asset_"));
    assert_eq!(post.seo_keywords, vec!["mindfulness bundle", "stress relief"]);

    let (request, _) = mocks
        .publish
        .published()
        .into_iter()
        .find(|(req, _)| req.title == "Calm Moment 1")
        .unwrap();
    assert_eq!(request.board_id, "board_1");
    assert!(request.description.ends_with("#breathe"));

    let mods = mocks.render.submitted();
    assert!(mods.iter().all(|m| m.len() == 3));
}

#[tokio::test(start_paused = true)]
async fn blog_only_run_never_touches_render_or_publish() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut config = sample_config();
    config.outputs.kinds = vec![OutputKind::Blog];

    let mut run = orch.start(config).await.unwrap();
    let snapshot = orch
        .submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();

    assert_eq!(snapshot.state, RunState::Done);
    assert_eq!(
        snapshot.units.iter().map(|o| o.unit).collect::<Vec<_>>(),
        vec![MediaUnit::BlogImage]
    );
    assert!(matches!(snapshot.units[0].result, UnitResult::Stored { .. }));
    assert!(mocks.render.submitted().is_empty());
    assert!(mocks.publish.published().is_empty());

    let (_, width, height) = mocks.images.generated()[0].clone();
    assert_eq!((width, height), (800, 600));
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_observable() {
    let mocks = MockServices::happy();
    let orch = orchestrator(&mocks);
    let mut run = orch.start(sample_config()).await.unwrap();
    let rx = run.subscribe();
    assert_eq!(*rx.borrow(), RunState::AwaitingApproval);

    orch.submit_approval_decision(&mut run, ApprovalDecision::Approve)
        .await
        .unwrap();
    assert_eq!(*rx.borrow(), RunState::Done);

    let visited: Vec<String> = run
        .run_log()
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        visited,
        vec![
            "fetching_references",
            "generating_draft",
            "awaiting_approval",
            "approved",
            "generating_media",
            "publishing",
            "done",
        ]
    );
}
