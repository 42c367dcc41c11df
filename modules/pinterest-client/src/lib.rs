pub mod error;

pub use error::{PinterestError, Result};

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

const SANDBOX_URL: &str = "https://api-sandbox.pinterest.com/v5";

/// Public pin URL for a pin id.
pub fn pin_url(pin_id: &str) -> String {
    format!("https://www.pinterest.com/pin/{pin_id}/")
}

/// Fields of a video pin besides the media itself.
#[derive(Debug, Clone)]
pub struct VideoPin<'a> {
    pub board_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub link: &'a str,
}

#[derive(Debug, Deserialize)]
struct PinCreated {
    id: String,
}

pub struct PinterestClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl PinterestClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            base_url: SANDBOX_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Create a video pin and return its public URL.
    pub async fn create_video_pin(&self, video: Vec<u8>, pin: &VideoPin<'_>) -> Result<String> {
        let url = format!("{}/pins", self.base_url);
        let media = Part::bytes(video)
            .file_name("video.mp4")
            .mime_str("video/mp4")?;
        let form = Form::new()
            .part("media", media)
            .text("board_id", pin.board_id.to_string())
            .text("title", pin.title.to_string())
            .text("description", pin.description.to_string())
            .text("media_type", "video")
            .text("link", pin.link.to_string());

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PinterestError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let created: PinCreated = resp.json().await?;
        tracing::info!(pin_id = %created.id, board_id = pin.board_id, "Pin created");
        Ok(pin_url(&created.id))
    }
}
