pub mod error;
pub mod types;

pub use error::{Result, VeniceError};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ImageGenerateRequest, Role};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use tracing::debug;

const VENICE_API_URL: &str = "https://api.venice.ai/api/v1";

#[derive(Clone)]
pub struct VeniceClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl VeniceClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: VENICE_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        Ok(headers)
    }

    fn json_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.headers()?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(VeniceError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "Venice chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.json_headers()?)
            .json(request)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// One system + one user turn, returning the first choice's text.
    pub async fn chat_completion(
        &self,
        model: &str,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(model)
            .message(ChatMessage::system(system))
            .message(ChatMessage::user(user));

        self.chat(&request)
            .await?
            .text()
            .ok_or(VeniceError::Empty("no choices in chat response"))
    }

    /// Generate an image and return the raw encoded bytes.
    pub async fn generate_image(&self, request: &ImageGenerateRequest) -> Result<Vec<u8>> {
        let url = format!("{}/image/generate", self.base_url);

        debug!(
            model = %request.model,
            width = request.width,
            height = request.height,
            "Venice image request"
        );

        let response = self
            .http
            .post(&url)
            .headers(self.json_headers()?)
            .json(request)
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Upscale a PNG by `scale` and return the raw encoded bytes.
    pub async fn upscale_image(&self, image: Vec<u8>, scale: u32) -> Result<Vec<u8>> {
        let url = format!("{}/image/upscale", self.base_url);

        debug!(scale, input_bytes = image.len(), "Venice upscale request");

        let part = Part::bytes(image)
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .part("image", part)
            .text("scale", scale.to_string());

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .multipart(form)
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
