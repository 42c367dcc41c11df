pub mod error;
pub mod types;

pub use error::{BannerbearError, Result};
pub use types::{Created, Modification, RenderData, RenderRequest};

use reqwest::multipart::{Form, Part};

const BASE_URL: &str = "https://api.bannerbear.com/v2";

pub struct BannerbearClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl BannerbearClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BannerbearError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }

    /// Upload a PNG so templates can reference it. Returns the image uid.
    pub async fn upload_image(&self, image: Vec<u8>) -> Result<String> {
        let url = format!("{}/images", self.base_url);
        let part = Part::bytes(image)
            .file_name("image.png")
            .mime_str("image/png")?;

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(Form::new().part("image", part))
            .send()
            .await?;

        let created: Created = Self::check(resp).await?.json().await?;
        tracing::info!(uid = %created.uid, "Bannerbear image uploaded");
        Ok(created.uid)
    }

    /// Submit a render. Returns immediately with the render uid.
    pub async fn create_render(
        &self,
        template_id: &str,
        modifications: &[Modification],
    ) -> Result<String> {
        let url = format!("{}/renders", self.base_url);
        let body = RenderRequest {
            template: template_id,
            modifications,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let created: Created = Self::check(resp).await?.json().await?;
        tracing::info!(uid = %created.uid, template_id, "Bannerbear render submitted");
        Ok(created.uid)
    }

    /// Fetch the current status of a render. A non-success HTTP status comes
    /// back as `Api` so callers can decide whether to keep polling.
    pub async fn get_render(&self, uid: &str) -> Result<RenderData> {
        let url = format!("{}/renders/{}", self.base_url, uid);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let data: RenderData = Self::check(resp).await?.json().await?;
        tracing::debug!(uid, status = %data.status, "Bannerbear render status");
        Ok(data)
    }

    /// Download a finished render from its public URL.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        let bytes = Self::check(resp).await?.bytes().await?;
        tracing::info!(url, bytes = bytes.len(), "Downloaded render output");
        Ok(bytes.to_vec())
    }
}
