// Trait seams for every upstream the pipeline talks to.
//
// Each vendor client implements its trait here, translating vendor errors into
// `PipelineError::UpstreamUnavailable`. The in-memory mocks in `testing.rs`
// implement the same traits, so the whole pipeline runs without network.

use std::sync::Arc;

use async_trait::async_trait;
use bannerbear_client::{BannerbearClient, BannerbearError, Modification};
use contentforge_common::{PipelineConfig, PipelineError, RenderStatus, Service};
use newsapi_client::NewsApiClient;
use pinterest_client::{PinterestClient, VideoPin};
use venice_client::{ImageGenerateRequest, VeniceClient};

type Result<T> = std::result::Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// ArticleSearch
// ---------------------------------------------------------------------------

/// A raw search hit before relevance filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchArticle {
    pub title: String,
    pub description: String,
    pub url: String,
}

#[async_trait]
pub trait ArticleSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchArticle>>;
}

#[async_trait]
impl ArticleSearch for NewsApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchArticle>> {
        let articles = self
            .everything(query)
            .await
            .map_err(|e| PipelineError::upstream(Service::ArticleSearch, e))?;
        Ok(articles
            .into_iter()
            .map(|a| SearchArticle {
                title: a.title.unwrap_or_default(),
                description: a.description.unwrap_or_default(),
                url: a.url,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// TextCompletion
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, system_role: &str, user_prompt: &str, model: &str) -> Result<String>;
}

#[async_trait]
impl TextCompletion for VeniceClient {
    async fn complete(&self, system_role: &str, user_prompt: &str, model: &str) -> Result<String> {
        self.chat_completion(model, system_role, user_prompt)
            .await
            .map_err(|e| PipelineError::upstream(Service::TextGeneration, e))
    }
}

// ---------------------------------------------------------------------------
// ImageService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str, width: u32, height: u32) -> Result<Vec<u8>>;
    async fn upscale(&self, image: Vec<u8>, factor: u32) -> Result<Vec<u8>>;
}

#[async_trait]
impl ImageService for VeniceClient {
    async fn generate(&self, prompt: &str, model: &str, width: u32, height: u32) -> Result<Vec<u8>> {
        let request = ImageGenerateRequest::new(model, prompt, width, height);
        self.generate_image(&request)
            .await
            .map_err(|e| PipelineError::upstream(Service::ImageGeneration, e))
    }

    async fn upscale(&self, image: Vec<u8>, factor: u32) -> Result<Vec<u8>> {
        self.upscale_image(image, factor)
            .await
            .map_err(|e| PipelineError::upstream(Service::ImageGeneration, e))
    }
}

// ---------------------------------------------------------------------------
// RenderService
// ---------------------------------------------------------------------------

/// One observation of a remote render job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPoll {
    pub status: RenderStatus,
    pub result_url: Option<String>,
}

impl JobPoll {
    pub fn rendering() -> Self {
        Self {
            status: RenderStatus::Rendering,
            result_url: None,
        }
    }

    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            status: RenderStatus::Completed,
            result_url: Some(url.into()),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: RenderStatus::Failed,
            result_url: None,
        }
    }
}

#[async_trait]
pub trait RenderService: Send + Sync {
    async fn create_image_asset(&self, image: Vec<u8>) -> Result<String>;
    async fn submit_job(&self, template_id: &str, modifications: &[Modification]) -> Result<String>;
    async fn poll_job(&self, job_id: &str) -> Result<JobPoll>;
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl RenderService for BannerbearClient {
    async fn create_image_asset(&self, image: Vec<u8>) -> Result<String> {
        self.upload_image(image)
            .await
            .map_err(|e| PipelineError::upstream(Service::RenderJob, e))
    }

    async fn submit_job(&self, template_id: &str, modifications: &[Modification]) -> Result<String> {
        self.create_render(template_id, modifications)
            .await
            .map_err(|e| PipelineError::upstream(Service::RenderJob, e))
    }

    async fn poll_job(&self, job_id: &str) -> Result<JobPoll> {
        match self.get_render(job_id).await {
            Ok(data) => Ok(match data.status.as_str() {
                "completed" => JobPoll {
                    status: RenderStatus::Completed,
                    result_url: data.video_url,
                },
                "failed" => JobPoll::failed(),
                _ => JobPoll::rendering(),
            }),
            // A non-2xx status just means "ask again next tick".
            Err(BannerbearError::Api { status, .. }) => {
                tracing::debug!(job_id, status, "Render status unavailable, will poll again");
                Ok(JobPoll::rendering())
            }
            Err(e) => Err(PipelineError::upstream(Service::RenderJob, e)),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        BannerbearClient::download(self, url)
            .await
            .map_err(|e| PipelineError::upstream(Service::RenderJob, e))
    }
}

// ---------------------------------------------------------------------------
// PublishService
// ---------------------------------------------------------------------------

/// Everything a publish call needs besides the video bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub title: String,
    pub description: String,
    pub board_id: String,
    pub link: String,
}

#[async_trait]
pub trait PublishService: Send + Sync {
    /// Publish and return the public URL.
    async fn publish(&self, video: Vec<u8>, request: &PublishRequest) -> Result<String>;
}

#[async_trait]
impl PublishService for PinterestClient {
    async fn publish(&self, video: Vec<u8>, request: &PublishRequest) -> Result<String> {
        let pin = VideoPin {
            board_id: &request.board_id,
            title: &request.title,
            description: &request.description,
            link: &request.link,
        };
        self.create_video_pin(video, &pin)
            .await
            .map_err(|e| PipelineError::upstream(Service::Publish, e))
    }
}

// ---------------------------------------------------------------------------
// Services bundle
// ---------------------------------------------------------------------------

/// The full set of upstream collaborators for one orchestrator.
#[derive(Clone)]
pub struct Services {
    pub search: Arc<dyn ArticleSearch>,
    pub text: Arc<dyn TextCompletion>,
    pub images: Arc<dyn ImageService>,
    pub render: Arc<dyn RenderService>,
    pub publish: Arc<dyn PublishService>,
}

impl Services {
    /// Build real HTTP clients from the config's credentials.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let creds = &config.credentials;
        let venice = VeniceClient::new(&creds.venice_api_key);
        Self {
            search: Arc::new(NewsApiClient::new(creds.newsapi_key.clone())),
            text: Arc::new(venice.clone()),
            images: Arc::new(venice),
            render: Arc::new(BannerbearClient::new(creds.bannerbear_api_key.clone())),
            publish: Arc::new(PinterestClient::new(creds.pinterest_access_token.clone())),
        }
    }
}
