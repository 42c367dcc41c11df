use serde::Deserialize;

/// Envelope for `/v2/everything`.
#[derive(Debug, Clone, Deserialize)]
pub struct EverythingResponse {
    pub status: String,
    #[serde(rename = "totalResults", default)]
    pub total_results: u64,
    #[serde(default)]
    pub articles: Vec<Article>,
}

/// A single article from the search results. NewsAPI nulls out fields freely,
/// so everything but the URL is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub source: Option<ArticleSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleSource {
    pub id: Option<String>,
    pub name: Option<String>,
}
