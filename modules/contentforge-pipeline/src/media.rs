//! Image generation, upscaling and the render-job video branch.
//!
//! Every step is single-shot. Any failure ends the branch it belongs to and
//! its partial payloads are dropped with it.

use std::sync::Arc;
use std::time::Duration;

use bannerbear_client::Modification;
use contentforge_common::{
    Dimensions, PipelineConfig, PipelineError, RenderJob, RenderStatus, Service,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::parsing::truncate_chars;
use crate::run_log::{EventKind, RunLog};
use crate::traits::{ImageService, RenderService};

/// Template layers a short-form render fills in.
pub const IMAGE_LAYER: &str = "image_layer";
pub const TITLE_LAYER: &str = "title_text";
pub const DESCRIPTION_LAYER: &str = "description_text";

/// Longest description the render template can lay out.
pub const RENDER_DESCRIPTION_CHARS: usize = 100;

/// What a finished video branch hands back to its unit.
#[derive(Debug, Clone)]
pub struct RenderedVideo {
    pub asset_id: String,
    pub job: RenderJob,
    pub video: Vec<u8>,
}

#[derive(Clone)]
pub struct MediaPipeline {
    images: Arc<dyn ImageService>,
    render: Arc<dyn RenderService>,
    image_model: String,
    upscale_factor: u32,
    template_id: String,
    poll_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
    run_log: Arc<RunLog>,
}

impl MediaPipeline {
    pub fn new(
        images: Arc<dyn ImageService>,
        render: Arc<dyn RenderService>,
        config: &PipelineConfig,
        cancel: CancellationToken,
        run_log: Arc<RunLog>,
    ) -> Self {
        Self {
            images,
            render,
            image_model: config.models.image.clone(),
            upscale_factor: config.images.upscale_factor,
            template_id: config.render.template_id.clone(),
            poll_interval: config.render.poll_interval(),
            timeout: config.render.timeout(),
            cancel,
            run_log,
        }
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Generate an image and upscale it.
    pub async fn image_branch(&self, prompt: &str, size: Dimensions) -> Result<Vec<u8>, PipelineError> {
        self.checkpoint()?;
        let image = self
            .images
            .generate(prompt, &self.image_model, size.width, size.height)
            .await?;
        let image = non_empty(image, Service::ImageGeneration, "generated image")?;

        self.checkpoint()?;
        let image = self.images.upscale(image, self.upscale_factor).await?;
        let image = non_empty(image, Service::ImageGeneration, "upscaled image")?;
        debug!(
            width = size.width,
            height = size.height,
            factor = self.upscale_factor,
            bytes = image.len(),
            "Image generated and upscaled"
        );
        Ok(image)
    }

    pub async fn upload(&self, image: Vec<u8>) -> Result<String, PipelineError> {
        self.checkpoint()?;
        let asset_id = self.render.create_image_asset(image).await?;
        if asset_id.trim().is_empty() {
            return Err(PipelineError::upstream(Service::RenderJob, "empty image asset id"));
        }
        Ok(asset_id)
    }

    pub async fn submit_render(
        &self,
        asset_id: &str,
        title: &str,
        description: &str,
    ) -> Result<RenderJob, PipelineError> {
        self.checkpoint()?;
        let modifications = render_modifications(asset_id, title, description);
        let job_id = self.render.submit_job(&self.template_id, &modifications).await?;
        if job_id.trim().is_empty() {
            return Err(PipelineError::upstream(Service::RenderJob, "empty render job id"));
        }
        info!(job_id = %job_id, asset_id, "Render submitted");
        Ok(RenderJob::submitted(job_id))
    }

    /// Poll `job` on the configured interval until it is terminal, the
    /// timeout elapses, or the run is cancelled. Returns the result URL.
    pub async fn wait_for_render(&self, job: &mut RenderJob) -> Result<String, PipelineError> {
        let started = Instant::now();
        let job_id = job.id.clone();

        loop {
            self.checkpoint()?;
            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(self.timed_out(job, started));
            }

            let poll = tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                polled = tokio::time::timeout(remaining, self.render.poll_job(&job_id)) => match polled {
                    Ok(poll) => poll?,
                    Err(_) => return Err(self.timed_out(job, started)),
                },
            };
            job.polls += 1;
            self.run_log.log(EventKind::RenderPoll {
                job_id: job_id.clone(),
                attempt: job.polls,
                status: format!("{:?}", poll.status).to_lowercase(),
            });

            match poll.status {
                RenderStatus::Completed => {
                    job.status = RenderStatus::Completed;
                    let url = poll.result_url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
                        PipelineError::upstream(Service::RenderJob, "completed render has no result URL")
                    })?;
                    job.result_url = Some(url.clone());
                    info!(job_id = %job.id, polls = job.polls, "Render completed");
                    return Ok(url);
                }
                RenderStatus::Failed => {
                    job.status = RenderStatus::Failed;
                    return Err(PipelineError::JobFailed { job_id: job.id.clone() });
                }
                _ => {
                    job.status = RenderStatus::Rendering;
                    debug!(job_id = %job.id, polls = job.polls, "Render still in progress");
                }
            }

            let remaining = self.timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(self.timed_out(job, started));
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval.min(remaining)) => {}
            }
        }
    }

    fn timed_out(&self, job: &mut RenderJob, started: Instant) -> PipelineError {
        job.status = RenderStatus::TimedOut;
        PipelineError::JobTimedOut {
            job_id: job.id.clone(),
            elapsed_secs: started.elapsed().as_secs(),
        }
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        self.checkpoint()?;
        let video = self.render.download(url).await?;
        non_empty(video, Service::RenderJob, "downloaded video")
    }

    /// Upload → submit → poll → download for one short-form unit.
    pub async fn video_branch(
        &self,
        image: Vec<u8>,
        title: &str,
        description: &str,
    ) -> Result<RenderedVideo, PipelineError> {
        let asset_id = self.upload(image).await?;
        let mut job = self.submit_render(&asset_id, title, description).await?;
        let url = self.wait_for_render(&mut job).await?;
        let video = self.download(&url).await?;
        Ok(RenderedVideo { asset_id, job, video })
    }
}

/// Layer overrides for a short-form render.
pub fn render_modifications(asset_id: &str, title: &str, description: &str) -> Vec<Modification> {
    vec![
        Modification::image(IMAGE_LAYER, asset_id),
        Modification::text(TITLE_LAYER, title),
        Modification::text(
            DESCRIPTION_LAYER,
            truncate_chars(description, RENDER_DESCRIPTION_CHARS),
        ),
    ]
}

fn non_empty(bytes: Vec<u8>, service: Service, what: &str) -> Result<Vec<u8>, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::upstream(service, format!("empty response: {what}")));
    }
    Ok(bytes)
}
