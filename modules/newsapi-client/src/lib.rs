pub mod error;
pub mod types;

pub use error::{NewsApiError, Result};
pub use types::{Article, ArticleSource, EverythingResponse};

const BASE_URL: &str = "https://newsapi.org/v2";

pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Search all indexed articles for `query`. Results come back in NewsAPI's
    /// own relevance order.
    pub async fn everything(&self, query: &str) -> Result<Vec<Article>> {
        let url = format!("{}/everything", self.base_url);
        tracing::debug!(query, "NewsAPI search");

        let resp = self
            .client
            .get(&url)
            .query(&[("q", query), ("apiKey", self.api_key.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NewsApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: EverythingResponse = resp.json().await?;
        if body.status != "ok" {
            return Err(NewsApiError::Api {
                status: status.as_u16(),
                message: format!("unexpected response status '{}'", body.status),
            });
        }

        tracing::info!(query, count = body.articles.len(), "NewsAPI search complete");
        Ok(body.articles)
    }
}
