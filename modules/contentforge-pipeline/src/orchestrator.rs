//! Pipeline orchestrator: owns the run state machine and decides, for every
//! failure, whether the run continues or aborts.
//!
//! ```text
//! Idle → FetchingReferences → GeneratingDraft → AwaitingApproval
//!   AwaitingApproval → Revising → AwaitingApproval
//!   AwaitingApproval → Rejected → Idle
//!   AwaitingApproval → Approved → GeneratingMedia → Publishing → Done
//! any non-terminal → Aborted
//! ```
//!
//! Draft-stage failures end the run. Media-stage failures only end the
//! branch or short-form unit they happened in.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use contentforge_common::{
    Artifact, ArtifactKind, Draft, FactCheckResult, OutputKind, PipelineConfig, PipelineError,
    Reference, ShortFormPost,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::fact_checker::FactChecker;
use crate::manifest::{self, Manifest, ManifestExport};
use crate::media::MediaPipeline;
use crate::references::ReferenceFetcher;
use crate::run_log::{EventKind, RunLog};
use crate::text_generator::{roles, short_form_image_prompt, PromptSpec, TextGenerator};
use crate::traits::{PublishRequest, PublishService, Services};

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    FetchingReferences,
    GeneratingDraft,
    AwaitingApproval,
    Revising,
    Approved,
    Rejected,
    GeneratingMedia,
    Publishing,
    Done,
    Aborted,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::FetchingReferences => "fetching_references",
            RunState::GeneratingDraft => "generating_draft",
            RunState::AwaitingApproval => "awaiting_approval",
            RunState::Revising => "revising",
            RunState::Approved => "approved",
            RunState::Rejected => "rejected",
            RunState::GeneratingMedia => "generating_media",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        if next == Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, FetchingReferences)
                | (FetchingReferences, GeneratingDraft)
                | (GeneratingDraft, AwaitingApproval)
                | (AwaitingApproval, Revising | Approved | Rejected)
                | (Revising, AwaitingApproval)
                | (Rejected, Idle)
                | (Approved, GeneratingMedia)
                | (GeneratingMedia, Publishing | Done)
                | (Publishing, Done)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Caller-facing types
// ---------------------------------------------------------------------------

/// A reviewer's verdict on the pending draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Reject,
    Revise(String),
}

impl ApprovalDecision {
    fn label(&self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approve",
            ApprovalDecision::Reject => "reject",
            ApprovalDecision::Revise(_) => "revise",
        }
    }
}

/// One concurrent branch of the media stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaUnit {
    BlogImage,
    ShortForm(u32),
}

impl fmt::Display for MediaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaUnit::BlogImage => f.write_str("blog_image"),
            MediaUnit::ShortForm(i) => write!(f, "short_form_{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitResult {
    /// Blog image stored in the manifest.
    Stored { filename: String },
    /// Short-form unit published and recorded.
    Published { url: String },
    Failed(PipelineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: MediaUnit,
    pub result: UnitResult,
}

impl UnitOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.result, UnitResult::Failed(_))
    }
}

/// Point-in-time view of a run for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub run_id: String,
    pub state: RunState,
    /// Pending or approved draft. Never a draft that failed fact checking.
    pub draft: Option<Draft>,
    pub fact_check: Option<FactCheckResult>,
    pub references: Vec<Reference>,
    pub units: Vec<UnitOutcome>,
    /// Run-level failure that moved the run to `Aborted`.
    pub error: Option<PipelineError>,
}

impl RunSnapshot {
    pub fn failures(&self) -> impl Iterator<Item = (MediaUnit, &PipelineError)> {
        self.units.iter().filter_map(|o| match &o.result {
            UnitResult::Failed(e) => Some((o.unit, e)),
            _ => None,
        })
    }

    pub fn published_urls(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter_map(|o| match &o.result {
                UnitResult::Published { url } => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PipelineRun
// ---------------------------------------------------------------------------

/// All state for one run. Nothing here outlives the run.
pub struct PipelineRun {
    pub id: String,
    config: Arc<PipelineConfig>,
    draft: Option<Draft>,
    references: Vec<Reference>,
    prompt_spec: Option<PromptSpec>,
    fact_check: Option<FactCheckResult>,
    units: Vec<UnitOutcome>,
    error: Option<PipelineError>,
    manifest: Arc<Manifest>,
    run_log: Arc<RunLog>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<RunState>>,
}

impl PipelineRun {
    fn new(config: PipelineConfig, cancel: CancellationToken) -> Self {
        let id = Uuid::new_v4().to_string();
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            run_log: Arc::new(RunLog::new(id.clone())),
            id,
            config: Arc::new(config),
            draft: None,
            references: Vec::new(),
            prompt_spec: None,
            fact_check: None,
            units: Vec::new(),
            error: None,
            manifest: Arc::new(Manifest::new()),
            cancel,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Cancel the run. Observed at the next stage boundary or poll tick.
    /// Remote render jobs already submitted keep running.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.id.clone(),
            state: self.state(),
            draft: self.draft.clone(),
            fact_check: self.fact_check.clone(),
            references: self.references.clone(),
            units: self.units.clone(),
            error: self.error.clone(),
        }
    }

    pub fn export(&self) -> ManifestExport {
        self.manifest.export()
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    fn transition(&self, next: RunState) -> Result<(), PipelineError> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition(format!(
                "{current} -> {next}"
            )));
        }
        self.state.send_replace(next);
        self.run_log.log(EventKind::StateChanged {
            from: current.to_string(),
            to: next.to_string(),
        });
        info!(run_id = %self.id, from = %current, to = %next, "Run state changed");
        Ok(())
    }

    fn abort(&mut self, error: PipelineError) {
        warn!(run_id = %self.id, error = %error, "Run aborted");
        self.run_log.log(EventKind::RunAborted {
            reason: error.to_string(),
        });
        if !self.state().is_terminal() {
            let _ = self.transition(RunState::Aborted);
        }
        self.error = Some(error);
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// Race `fut` against cancellation.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = fut => result,
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    services: Services,
}

impl Orchestrator {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    fn text_generator(&self, config: &PipelineConfig) -> TextGenerator {
        TextGenerator::new(self.services.text.clone(), config.models.text.clone())
    }

    /// Validate `config`, then fetch references, generate and fact-check a
    /// draft. Returns the run paused at `AwaitingApproval`, or `Aborted` with
    /// the reason in its snapshot. Only an invalid config is an `Err`.
    pub async fn start(&self, config: PipelineConfig) -> Result<PipelineRun, PipelineError> {
        self.start_with_cancel(config, CancellationToken::new()).await
    }

    pub async fn start_with_cancel(
        &self,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        config.validate()?;
        config.log_redacted();

        let mut run = PipelineRun::new(config, cancel);
        run.run_log.log(EventKind::RunStarted {
            keywords: run.config.content.keywords.clone(),
            outputs: run
                .config
                .outputs
                .kinds
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
            post_count: run.config.outputs.post_count,
        });

        if let Err(e) = self.draft_stage(&mut run).await {
            run.abort(e);
        }
        Ok(run)
    }

    async fn draft_stage(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        run.transition(RunState::FetchingReferences)?;
        run.checkpoint()?;

        let keywords = run.config.content.keywords.clone();
        let fetcher = ReferenceFetcher::new(
            self.services.search.clone(),
            &run.config.content.relevance_terms,
        );
        let (references, degraded) = match cancellable(&run.cancel, fetcher.fetch(&keywords)).await {
            Ok(references) => (references, false),
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Reference search failed, continuing with general knowledge");
                (Vec::new(), true)
            }
        };
        run.run_log.log(EventKind::ReferenceSearch {
            keywords,
            references: references.len() as u32,
            degraded,
        });
        run.references = references;

        run.transition(RunState::GeneratingDraft)?;
        run.checkpoint()?;

        let generator = self.text_generator(&run.config);
        let spec = PromptSpec::from_config(&run.config, &run.references);
        let body = cancellable(&run.cancel, generator.generate(&spec, roles::BLOG_WRITER)).await?;
        run.run_log.log(EventKind::DraftGenerated {
            chars: body.len(),
            references: run.references.len() as u32,
        });
        run.prompt_spec = Some(spec);

        run.checkpoint()?;
        let checker = FactChecker::new(generator);
        let result = cancellable(&run.cancel, checker.verify(&body, &run.references)).await?;
        run.run_log.log(EventKind::FactCheck {
            confidence: result.confidence,
            passed: result.passed,
            explanation: result.explanation.clone(),
        });
        run.fact_check = Some(result.clone());

        if !result.passed {
            // The draft is dropped here and never reaches the caller.
            return Err(PipelineError::ThresholdNotMet {
                confidence: result.confidence,
                explanation: result.explanation,
            });
        }

        run.draft = Some(Draft::new(body));
        run.transition(RunState::AwaitingApproval)
    }

    /// Apply a reviewer decision to a run paused at `AwaitingApproval`.
    ///
    /// Misuse (wrong state, empty feedback) is an `Err` and leaves the run
    /// untouched. Everything else is reported through the returned snapshot.
    pub async fn submit_approval_decision(
        &self,
        run: &mut PipelineRun,
        decision: ApprovalDecision,
    ) -> Result<RunSnapshot, PipelineError> {
        if run.state() != RunState::AwaitingApproval {
            return Err(PipelineError::InvalidTransition(format!(
                "no draft awaiting approval (run is {})",
                run.state()
            )));
        }
        if let ApprovalDecision::Revise(feedback) = &decision {
            if feedback.trim().is_empty() {
                return Err(PipelineError::Validation(
                    "revision feedback must not be empty".to_string(),
                ));
            }
        }

        run.run_log.log(EventKind::ApprovalDecision {
            decision: decision.label().to_string(),
            revision_count: run.draft.as_ref().map_or(0, |d| d.revision_count),
        });

        let outcome = match decision {
            ApprovalDecision::Approve => self.approve(run).await,
            ApprovalDecision::Reject => reject(run),
            ApprovalDecision::Revise(feedback) => self.revise(run, &feedback).await,
        };
        if let Err(e) = outcome {
            run.abort(e);
        }
        Ok(run.snapshot())
    }

    /// Cancel a run paused at `AwaitingApproval` and abort it with
    /// `Cancelled`. No decision is applied and no media work starts.
    pub fn cancel_pending(&self, run: &mut PipelineRun) -> Result<RunSnapshot, PipelineError> {
        if run.state() != RunState::AwaitingApproval {
            return Err(PipelineError::InvalidTransition(format!(
                "no draft awaiting approval (run is {})",
                run.state()
            )));
        }
        run.cancel();
        run.abort(PipelineError::Cancelled);
        Ok(run.snapshot())
    }

    async fn revise(&self, run: &mut PipelineRun, feedback: &str) -> Result<(), PipelineError> {
        run.checkpoint()?;
        run.transition(RunState::Revising)?;

        let previous = run
            .draft
            .as_ref()
            .map(|d| d.body.clone())
            .ok_or_else(|| PipelineError::InvalidTransition("no pending draft".to_string()))?;
        let spec = match &run.prompt_spec {
            Some(spec) => spec.clone(),
            None => PromptSpec::from_config(&run.config, &run.references),
        };

        let generator = self.text_generator(&run.config);
        let body = cancellable(&run.cancel, generator.revise(&previous, feedback, &spec)).await?;

        let draft = run
            .draft
            .as_mut()
            .ok_or_else(|| PipelineError::InvalidTransition("no pending draft".to_string()))?;
        draft.apply_revision(body, feedback)?;
        run.run_log.log(EventKind::DraftRevised {
            chars: draft.body.len(),
            revision_count: draft.revision_count,
        });
        run.transition(RunState::AwaitingApproval)
    }

    async fn approve(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        run.checkpoint()?;
        let body = {
            let draft = run
                .draft
                .as_mut()
                .ok_or_else(|| PipelineError::InvalidTransition("no pending draft".to_string()))?;
            draft.approve()?;
            draft.body.clone()
        };
        run.transition(RunState::Approved)?;

        let text = Artifact::text(manifest::BLOG_POST_FILENAME, &body);
        log_artifact(&run.run_log, &text);
        run.manifest.add_artifact(text)?;

        run.transition(RunState::GeneratingMedia)?;
        self.media_stage(run, body).await
    }

    async fn media_stage(&self, run: &mut PipelineRun, draft: String) -> Result<(), PipelineError> {
        let config = run.config.clone();
        let mut units = Vec::new();
        if config.wants(OutputKind::Blog) {
            units.push(MediaUnit::BlogImage);
        }
        if config.wants(OutputKind::ShortForm) {
            units.extend((1..=config.outputs.post_count).map(MediaUnit::ShortForm));
        }

        let ctx = Arc::new(MediaContext {
            text: self.text_generator(&config),
            media: MediaPipeline::new(
                self.services.images.clone(),
                self.services.render.clone(),
                &config,
                run.cancel.clone(),
                run.run_log.clone(),
            ),
            publish: self.services.publish.clone(),
            manifest: run.manifest.clone(),
            run_log: run.run_log.clone(),
            state: run.state.clone(),
            cancel: run.cancel.clone(),
            config,
            draft,
        });

        info!(run_id = %run.id, units = units.len(), "Media stage started");
        let limit = ctx.config.outputs.worker_limit.max(1);
        let mut outcomes: Vec<UnitOutcome> = stream::iter(units)
            .map(|unit| {
                let ctx = Arc::clone(&ctx);
                async move { ctx.run_unit(unit).await }
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.unit);
        run.units = outcomes;

        if let Some(error) = run.units.iter().find_map(|o| match &o.result {
            UnitResult::Failed(e) if !e.is_unit_scoped() => Some(e.clone()),
            _ => None,
        }) {
            return Err(error);
        }
        run.checkpoint()?;

        match run.manifest.posts_table() {
            Ok(Some(table)) => {
                log_artifact(&run.run_log, &table);
                run.manifest.add_artifact(table)?;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to build posts table"),
        }

        let failed = run.units.iter().filter(|o| o.is_failure()).count() as u32;
        let published = run.manifest.post_count() as u32;
        run.run_log.log(EventKind::RunFinished {
            posts_published: published,
            units_failed: failed,
        });
        info!(run_id = %run.id, published, failed, "Media stage complete");
        run.transition(RunState::Done)
    }
}

fn reject(run: &mut PipelineRun) -> Result<(), PipelineError> {
    if let Some(draft) = run.draft.as_mut() {
        draft.reject()?;
    }
    run.transition(RunState::Rejected)?;
    run.draft = None;
    run.transition(RunState::Idle)
}

fn log_artifact(run_log: &RunLog, artifact: &Artifact) {
    run_log.log(EventKind::ArtifactStored {
        filename: artifact.filename.clone(),
        kind: format!("{:?}", artifact.kind).to_lowercase(),
        bytes: artifact.size_bytes(),
    });
}

// ---------------------------------------------------------------------------
// Media units
// ---------------------------------------------------------------------------

/// Everything a media unit needs, shared read-only across concurrent units.
struct MediaContext {
    config: Arc<PipelineConfig>,
    draft: String,
    text: TextGenerator,
    media: MediaPipeline,
    publish: Arc<dyn PublishService>,
    manifest: Arc<Manifest>,
    run_log: Arc<RunLog>,
    state: Arc<watch::Sender<RunState>>,
    cancel: CancellationToken,
}

impl MediaContext {
    async fn run_unit(&self, unit: MediaUnit) -> UnitOutcome {
        let label = unit.to_string();
        self.phase(&label, "started");

        let result = match unit {
            MediaUnit::BlogImage => self.blog_image().await,
            MediaUnit::ShortForm(index) => self.short_form(index, &label).await,
        };

        let result = match result {
            Ok(result) => {
                self.phase(&label, "finished");
                result
            }
            Err(e) => {
                warn!(unit = %label, error = %e, "Media unit failed");
                self.run_log.log(EventKind::UnitFailed {
                    unit: label,
                    error: e.to_string(),
                });
                UnitResult::Failed(e)
            }
        };
        UnitOutcome { unit, result }
    }

    fn phase(&self, unit: &str, phase: &str) {
        self.run_log.log(EventKind::UnitPhase {
            unit: unit.to_string(),
            phase: phase.to_string(),
        });
    }

    async fn blog_image(&self) -> Result<UnitResult, PipelineError> {
        let content = &self.config.content;
        let prompt = cancellable(
            &self.cancel,
            self.text.image_description(&content.keywords, &content.image_style),
        )
        .await?;
        let image = self.media.image_branch(&prompt, self.config.images.blog).await?;

        let artifact = Artifact::new(ArtifactKind::Image, manifest::BLOG_IMAGE_FILENAME, image);
        log_artifact(&self.run_log, &artifact);
        self.manifest.add_artifact(artifact)?;
        Ok(UnitResult::Stored {
            filename: manifest::BLOG_IMAGE_FILENAME.to_string(),
        })
    }

    async fn short_form(&self, index: u32, label: &str) -> Result<UnitResult, PipelineError> {
        let content = &self.config.content;

        self.phase(label, "copy");
        let copy = cancellable(
            &self.cancel,
            self.text.short_form_copy(index, &content.keywords, &self.draft),
        )
        .await?;

        self.phase(label, "image");
        let prompt = short_form_image_prompt(&copy.title, &content.keywords, &content.image_style);
        let image = self
            .media
            .image_branch(&prompt, self.config.images.short_form)
            .await?;

        self.phase(label, "render");
        let rendered = self
            .media
            .video_branch(image, &copy.title, &copy.description)
            .await?;

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.phase(label, "publish");
        self.mark_publishing();
        let request = PublishRequest {
            title: copy.title.clone(),
            description: copy.publish_description(),
            board_id: self.config.publish.board_id.clone(),
            link: self.config.destination_link().to_string(),
        };
        let url = self.publish.publish(rendered.video.clone(), &request).await?;
        self.run_log.log(EventKind::Published {
            unit: index,
            url: url.clone(),
        });
        info!(unit = %label, url = %url, "Short-form unit published");

        let video = Artifact::new(ArtifactKind::Video, manifest::video_filename(index), rendered.video);
        log_artifact(&self.run_log, &video);
        let post = ShortFormPost {
            index,
            title: copy.title,
            description: copy.description,
            hashtags: copy.hashtags,
            image_asset_id: rendered.asset_id,
            video_artifact: video.filename.clone(),
            publish_url: url.clone(),
            board: self.config.publish.board_label().to_string(),
            link: request.link,
            seo_keywords: content.seo_keywords.clone(),
        };
        self.manifest.record_post(post, video)?;
        Ok(UnitResult::Published { url })
    }

    /// First unit to reach publishing moves the run along.
    fn mark_publishing(&self) {
        let moved = self.state.send_if_modified(|state| {
            if *state == RunState::GeneratingMedia {
                *state = RunState::Publishing;
                true
            } else {
                false
            }
        });
        if moved {
            self.run_log.log(EventKind::StateChanged {
                from: RunState::GeneratingMedia.to_string(),
                to: RunState::Publishing.to_string(),
            });
            info!("Run state changed to publishing");
        }
    }
}
