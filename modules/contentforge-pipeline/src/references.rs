use std::sync::Arc;

use contentforge_common::{PipelineError, Reference};
use tracing::{info, warn};

use crate::traits::{ArticleSearch, SearchArticle};

/// Most references handed to generation and fact checking.
pub const MAX_REFERENCES: usize = 5;

/// Finds citation context for a topic: search, keep topical hits, cap at five.
pub struct ReferenceFetcher {
    search: Arc<dyn ArticleSearch>,
    relevance_terms: Vec<String>,
}

impl ReferenceFetcher {
    pub fn new(search: Arc<dyn ArticleSearch>, relevance_terms: &[String]) -> Self {
        Self {
            search,
            relevance_terms: relevance_terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Upstream order is kept. An empty result is a valid outcome, not an error.
    pub async fn fetch(&self, keywords: &str) -> Result<Vec<Reference>, PipelineError> {
        let articles = self.search.search(keywords).await?;
        if articles.is_empty() {
            warn!(keywords, "No articles found, generating without references");
            return Ok(Vec::new());
        }

        let total = articles.len();
        let references: Vec<Reference> = articles
            .into_iter()
            .filter(|a| is_relevant(a, &self.relevance_terms))
            .take(MAX_REFERENCES)
            .map(|a| Reference {
                title: a.title,
                description: a.description,
                url: a.url,
            })
            .collect();

        info!(
            keywords,
            total,
            kept = references.len(),
            "Reference search complete"
        );
        Ok(references)
    }
}

/// Case-insensitive substring match of any term against title or description.
/// `terms` must already be lowercase.
pub fn is_relevant(article: &SearchArticle, terms: &[String]) -> bool {
    let title = article.title.to_lowercase();
    let description = article.description.to_lowercase();
    terms
        .iter()
        .any(|t| title.contains(t.as_str()) || description.contains(t.as_str()))
}
