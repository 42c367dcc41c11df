// Test mocks for the content pipeline.
//
// One mock per trait boundary:
// - MockSearch (ArticleSearch): query → canned articles
// - MockText (TextCompletion): role / prompt substring → canned completion
// - MockImages (ImageService): deterministic bytes derived from the prompt
// - MockRender (RenderService): scripted render jobs with per-unit failures
// - MockPublish (PublishService): records pins, optional per-title failures
//
// Plus helpers for building articles, a valid config and a full Services set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bannerbear_client::Modification;
use contentforge_common::{PipelineConfig, PipelineError, Service};

use crate::media::{IMAGE_LAYER, TITLE_LAYER};
use crate::text_generator::roles;
use crate::traits::{
    ArticleSearch, ImageService, JobPoll, PublishRequest, PublishService, RenderService,
    SearchArticle, Services, TextCompletion,
};

type Result<T> = std::result::Result<T, PipelineError>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn article(title: &str, description: &str, url: &str) -> SearchArticle {
    SearchArticle {
        title: title.to_string(),
        description: description.to_string(),
        url: url.to_string(),
    }
}

pub const SAMPLE_CONFIG: &str = r#"
    [content]
    keywords = "mindfulness bundle, stress relief"
    intent = "informative"
    article_length = 500
    seo_keywords = ["mindfulness bundle", "stress relief"]
    call_to_action = "Get the Mindfulness Bundle Now!"
    affiliate_link = "https://payhip.com/b/tnVQN"

    [outputs]
    kinds = ["blog", "short_form"]
    post_count = 3

    [render]
    template_id = "tmpl_test"

    [publish]
    board_id = "board_1"
    board_name = "Mindfulness Tips"

    [credentials]
    newsapi_key = "test-news"
    venice_api_key = "test-venice"
    bannerbear_api_key = "test-bannerbear"
    pinterest_access_token = "test-pinterest"
"#;

/// A valid blog + 3 short-form config with default timings (10s / 600s).
pub fn sample_config() -> PipelineConfig {
    match PipelineConfig::from_toml(SAMPLE_CONFIG) {
        Ok(config) => config,
        Err(e) => panic!("sample config must parse: {e}"),
    }
}

/// Canned copy for short-form unit `index`.
pub fn short_form_response(index: u32) -> String {
    format!(
        "Title: Calm Moment {index}\n\
         Description: A short reset for busy days, idea number {index}.\n\
         Hashtags: #mindfulness #calm #stressrelief #selfcare #breathe"
    )
}

/// Every service mocked and answering happily.
pub struct MockServices {
    pub search: Arc<MockSearch>,
    pub text: Arc<MockText>,
    pub images: Arc<MockImages>,
    pub render: Arc<MockRender>,
    pub publish: Arc<MockPublish>,
}

impl MockServices {
    pub fn happy() -> Self {
        Self {
            search: Arc::new(MockSearch::new()),
            text: Arc::new(MockText::happy()),
            images: Arc::new(MockImages::new()),
            render: Arc::new(MockRender::new()),
            publish: Arc::new(MockPublish::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            search: self.search.clone(),
            text: self.text.clone(),
            images: self.images.clone(),
            render: self.render.clone(),
            publish: self.publish.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// Query → articles. Unregistered queries return no articles.
pub struct MockSearch {
    results: HashMap<String, Vec<SearchArticle>>,
    unavailable: bool,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            unavailable: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    pub fn on_query(mut self, query: &str, articles: Vec<SearchArticle>) -> Self {
        self.results.insert(query.to_string(), articles);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleSearch for MockSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchArticle>> {
        lock(&self.queries).push(query.to_string());
        if self.unavailable {
            return Err(PipelineError::upstream(Service::ArticleSearch, "connection refused"));
        }
        Ok(self.results.get(query).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockText
// ---------------------------------------------------------------------------

struct PromptRule {
    role: String,
    needle: String,
    response: String,
}

/// Canned completions. A prompt rule (role + substring) wins over a role
/// rule and the most recently added prompt rule wins among those; anything
/// unmatched is an upstream error.
pub struct MockText {
    by_role: HashMap<String, String>,
    by_prompt: Vec<PromptRule>,
    failing: Vec<(String, String)>,
    unavailable: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockText {
    pub fn new() -> Self {
        Self {
            by_role: HashMap::new(),
            by_prompt: Vec::new(),
            failing: Vec::new(),
            unavailable: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new()
        }
    }

    /// Answers for every role, including distinct copy for units 1 to 10.
    pub fn happy() -> Self {
        let mut text = Self::new()
            .on_role(
                roles::BLOG_WRITER,
                "# 5 Ways to Find Calm\n\n1. Breathe slowly.\n2. Take a walk.\n\
                 Get the Mindfulness Bundle Now!",
            )
            .on_role(roles::FACT_CHECKER, "Confidence: 85 - looks accurate")
            .on_role(roles::VISUAL_DESIGNER, "A serene lake at sunrise with soft mist");
        for i in 1..=10 {
            text = text.on_prompt(
                roles::SOCIAL_MEDIA_MANAGER,
                &format!("aspect {i}."),
                &short_form_response(i),
            );
        }
        text
    }

    pub fn on_role(mut self, role: &str, response: &str) -> Self {
        self.by_role.insert(role.to_string(), response.to_string());
        self
    }

    /// Replace any existing rule for the same role and substring.
    pub fn on_prompt(mut self, role: &str, needle: &str, response: &str) -> Self {
        self.by_prompt.retain(|r| !(r.role == role && r.needle == needle));
        self.by_prompt.push(PromptRule {
            role: role.to_string(),
            needle: needle.to_string(),
            response: response.to_string(),
        });
        self
    }

    /// Transport failure for prompts under `role` containing `needle`.
    pub fn fail_prompt(mut self, role: &str, needle: &str) -> Self {
        self.failing.push((role.to_string(), needle.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, role: &str) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|(r, _)| r == role)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn last_prompt(&self, role: &str) -> Option<String> {
        self.calls_for(role).pop()
    }
}

impl Default for MockText {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextCompletion for MockText {
    async fn complete(&self, system_role: &str, user_prompt: &str, _model: &str) -> Result<String> {
        lock(&self.calls).push((system_role.to_string(), user_prompt.to_string()));

        let fails = self.unavailable
            || self
                .failing
                .iter()
                .any(|(role, needle)| role == system_role && user_prompt.contains(needle.as_str()));
        if fails {
            return Err(PipelineError::upstream(Service::TextGeneration, "503 Service Unavailable"));
        }

        self.by_prompt
            .iter()
            .rev()
            .find(|r| r.role == system_role && user_prompt.contains(r.needle.as_str()))
            .map(|r| r.response.clone())
            .or_else(|| self.by_role.get(system_role).cloned())
            .ok_or_else(|| {
                PipelineError::upstream(
                    Service::TextGeneration,
                    format!("MockText: no response registered for role {system_role:?}"),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// MockImages
// ---------------------------------------------------------------------------

/// Generated bytes are `image:{prompt}`; upscaling appends `@x{factor}`.
pub struct MockImages {
    empty_for: Vec<String>,
    fail_for: Vec<String>,
    generated: Mutex<Vec<(String, u32, u32)>>,
}

impl MockImages {
    pub fn new() -> Self {
        Self {
            empty_for: Vec::new(),
            fail_for: Vec::new(),
            generated: Mutex::new(Vec::new()),
        }
    }

    /// Return zero bytes for prompts containing `needle`.
    pub fn empty_for(mut self, needle: &str) -> Self {
        self.empty_for.push(needle.to_string());
        self
    }

    /// Transport failure for prompts containing `needle`.
    pub fn fail_for(mut self, needle: &str) -> Self {
        self.fail_for.push(needle.to_string());
        self
    }

    pub fn upscaled(image: &[u8], factor: u32) -> Vec<u8> {
        let mut out = image.to_vec();
        out.extend_from_slice(format!("@x{factor}").as_bytes());
        out
    }

    /// (prompt, width, height) of every generate call.
    pub fn generated(&self) -> Vec<(String, u32, u32)> {
        lock(&self.generated).clone()
    }
}

impl Default for MockImages {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImages {
    async fn generate(&self, prompt: &str, _model: &str, width: u32, height: u32) -> Result<Vec<u8>> {
        lock(&self.generated).push((prompt.to_string(), width, height));
        if self.fail_for.iter().any(|n| prompt.contains(n.as_str())) {
            return Err(PipelineError::upstream(Service::ImageGeneration, "connection reset"));
        }
        if self.empty_for.iter().any(|n| prompt.contains(n.as_str())) {
            return Ok(Vec::new());
        }
        Ok(format!("image:{prompt}").into_bytes())
    }

    async fn upscale(&self, image: Vec<u8>, factor: u32) -> Result<Vec<u8>> {
        Ok(Self::upscaled(&image, factor))
    }
}

// ---------------------------------------------------------------------------
// MockRender
// ---------------------------------------------------------------------------

struct JobEntry {
    asset_id: String,
    polls: u32,
}

/// Asset ids are `asset_{image bytes}`, job ids `job_{n}`. Jobs report
/// `rendering` for the configured number of polls, then complete with
/// `https://render.example/{job_id}.mp4`.
pub struct MockRender {
    rendering_polls: u32,
    never_finishes: bool,
    fail_submit_titles: HashSet<String>,
    fail_job_assets: Vec<String>,
    next_job: AtomicU32,
    jobs: Mutex<HashMap<String, JobEntry>>,
    submitted: Mutex<Vec<Vec<Modification>>>,
}

impl MockRender {
    pub fn new() -> Self {
        Self {
            rendering_polls: 1,
            never_finishes: false,
            fail_submit_titles: HashSet::new(),
            fail_job_assets: Vec::new(),
            next_job: AtomicU32::new(1),
            jobs: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Polls answered with `rendering` before a job completes.
    pub fn rendering_polls(mut self, polls: u32) -> Self {
        self.rendering_polls = polls;
        self
    }

    pub fn never_finishes(mut self) -> Self {
        self.never_finishes = true;
        self
    }

    /// Reject job submission for renders whose title layer is `title`.
    pub fn fail_submit_for_title(mut self, title: &str) -> Self {
        self.fail_submit_titles.insert(title.to_string());
        self
    }

    /// Report `failed` for jobs whose image asset id contains `needle`.
    pub fn fail_job_for(mut self, needle: &str) -> Self {
        self.fail_job_assets.push(needle.to_string());
        self
    }

    pub fn video_bytes(job_id: &str) -> Vec<u8> {
        format!("video:{job_id}").into_bytes()
    }

    pub fn result_url(job_id: &str) -> String {
        format!("https://render.example/{job_id}.mp4")
    }

    /// Modifications of every accepted submission.
    pub fn submitted(&self) -> Vec<Vec<Modification>> {
        lock(&self.submitted).clone()
    }

    pub fn polls(&self, job_id: &str) -> u32 {
        lock(&self.jobs).get(job_id).map_or(0, |j| j.polls)
    }
}

impl Default for MockRender {
    fn default() -> Self {
        Self::new()
    }
}

fn layer<'a>(modifications: &'a [Modification], name: &str) -> Option<&'a Modification> {
    modifications.iter().find(|m| m.name == name)
}

#[async_trait]
impl RenderService for MockRender {
    async fn create_image_asset(&self, image: Vec<u8>) -> Result<String> {
        Ok(format!("asset_{}", String::from_utf8_lossy(&image)))
    }

    async fn submit_job(&self, _template_id: &str, modifications: &[Modification]) -> Result<String> {
        let title = layer(modifications, TITLE_LAYER).and_then(|m| m.text.clone());
        if title.is_some_and(|t| self.fail_submit_titles.contains(&t)) {
            return Err(PipelineError::upstream(
                Service::RenderJob,
                "Bannerbear API error (HTTP 500): render queue unavailable",
            ));
        }

        let asset_id = layer(modifications, IMAGE_LAYER)
            .and_then(|m| m.image_uid.clone())
            .unwrap_or_default();
        let job_id = format!("job_{}", self.next_job.fetch_add(1, Ordering::SeqCst));
        lock(&self.jobs).insert(job_id.clone(), JobEntry { asset_id, polls: 0 });
        lock(&self.submitted).push(modifications.to_vec());
        Ok(job_id)
    }

    async fn poll_job(&self, job_id: &str) -> Result<JobPoll> {
        let mut jobs = lock(&self.jobs);
        let Some(job) = jobs.get_mut(job_id) else {
            // Unknown ids look like a 404, which the real client reports as not ready.
            return Ok(JobPoll::rendering());
        };
        job.polls += 1;

        if self.fail_job_assets.iter().any(|n| job.asset_id.contains(n.as_str())) {
            return Ok(JobPoll::failed());
        }
        if self.never_finishes || job.polls <= self.rendering_polls {
            return Ok(JobPoll::rendering());
        }
        Ok(JobPoll::completed(Self::result_url(job_id)))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let job_id = url
            .strip_prefix("https://render.example/")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .ok_or_else(|| PipelineError::upstream(Service::RenderJob, format!("404 for {url}")))?;
        Ok(Self::video_bytes(job_id))
    }
}

// ---------------------------------------------------------------------------
// MockPublish
// ---------------------------------------------------------------------------

/// Records every publish. Pins get `https://www.pinterest.com/pin/{n}/`.
pub struct MockPublish {
    fail_titles: HashSet<String>,
    next_pin: AtomicU32,
    published: Mutex<Vec<(PublishRequest, usize)>>,
}

impl MockPublish {
    pub fn new() -> Self {
        Self {
            fail_titles: HashSet::new(),
            next_pin: AtomicU32::new(1000),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_for_title(mut self, title: &str) -> Self {
        self.fail_titles.insert(title.to_string());
        self
    }

    /// Accepted requests with the size of the uploaded video.
    pub fn published(&self) -> Vec<(PublishRequest, usize)> {
        lock(&self.published).clone()
    }
}

impl Default for MockPublish {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublishService for MockPublish {
    async fn publish(&self, video: Vec<u8>, request: &PublishRequest) -> Result<String> {
        if self.fail_titles.contains(&request.title) {
            return Err(PipelineError::upstream(
                Service::Publish,
                "Pinterest API error (HTTP 401): invalid token",
            ));
        }
        let pin = self.next_pin.fetch_add(1, Ordering::SeqCst);
        lock(&self.published).push((request.clone(), video.len()));
        Ok(format!("https://www.pinterest.com/pin/{pin}/"))
    }
}
