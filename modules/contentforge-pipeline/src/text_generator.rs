use std::sync::Arc;

use contentforge_common::{PipelineConfig, PipelineError, Reference, Service};
use tracing::{debug, info};

use crate::parsing::{parse_short_form_copy, truncate_chars, ShortFormCopy};
use crate::traits::TextCompletion;

/// System roles the pipeline speaks to the text model with.
pub mod roles {
    pub const BLOG_WRITER: &str = "You are an expert blog writer.";
    pub const FACT_CHECKER: &str = "You are an expert fact-checker.";
    pub const VISUAL_DESIGNER: &str = "You are a creative visual designer.";
    pub const SOCIAL_MEDIA_MANAGER: &str = "You are a social media manager.";
}

/// Prompt text used in place of citations when no references were found.
pub const GENERAL_KNOWLEDGE: &str = "Use general knowledge.";

/// Characters of the approved draft quoted in each short-form prompt.
pub const DRAFT_EXCERPT_CHARS: usize = 200;

/// Facts every long-form prompt must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSpec {
    pub topic: String,
    pub intent: String,
    pub audience: String,
    pub tone: String,
    pub format: String,
    pub article_length: u32,
    pub seo_terms: Vec<String>,
    pub reference_urls: Vec<String>,
    pub call_to_action: String,
    pub affiliate_link: String,
}

impl PromptSpec {
    pub fn from_config(config: &PipelineConfig, references: &[Reference]) -> Self {
        let content = &config.content;
        Self {
            topic: content.keywords.clone(),
            intent: content.intent.clone(),
            audience: content.target_audience.clone(),
            tone: content.tone_and_style.clone(),
            format: content.content_format.clone(),
            article_length: content.article_length,
            seo_terms: content.seo_keywords.clone(),
            reference_urls: references.iter().map(|r| r.url.clone()).collect(),
            call_to_action: content.call_to_action.clone(),
            affiliate_link: config.destination_link().to_string(),
        }
    }

    fn references_clause(&self) -> String {
        if self.reference_urls.is_empty() {
            format!("References: {GENERAL_KNOWLEDGE}")
        } else {
            format!("References: {}", self.reference_urls.join(", "))
        }
    }

    /// Instruction for a first draft.
    pub fn render(&self) -> String {
        format!(
            "Write a {length} word {intent} blog post about {topic} for {audience} \
             in a {tone} tone using a {format} format. \
             Incorporate SEO keywords: {seo}. \
             {references} \
             Include call to action: '{cta}' with link <a href='{link}'>{cta}</a>.",
            length = self.article_length,
            intent = self.intent,
            topic = self.topic,
            audience = self.audience,
            tone = self.tone,
            format = self.format,
            seo = self.seo_terms.join(", "),
            references = self.references_clause(),
            cta = self.call_to_action,
            link = self.affiliate_link,
        )
    }

    /// Instruction for revising `previous` in light of `feedback`, restating
    /// the first-draft constraints.
    pub fn render_revision(&self, previous: &str, feedback: &str) -> String {
        format!(
            "Revise this blog post based on feedback: {feedback}\n\nOriginal: {previous}\n\n\
             Maintain {length} words, {intent} intent, {tone} tone, and {format} format \
             for {audience}. Keep the call to action '{cta}' linking to {link}. {references}",
            length = self.article_length,
            intent = self.intent,
            tone = self.tone,
            format = self.format,
            audience = self.audience,
            cta = self.call_to_action,
            link = self.affiliate_link,
            references = self.references_clause(),
        )
    }
}

/// Drives the text model for drafts, revisions, image descriptions and
/// short-form copy.
#[derive(Clone)]
pub struct TextGenerator {
    client: Arc<dyn TextCompletion>,
    model: String,
}

impl TextGenerator {
    pub fn new(client: Arc<dyn TextCompletion>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Raw completion. Blank output counts as an upstream failure.
    pub async fn complete(&self, prompt: &str, system_role: &str) -> Result<String, PipelineError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Text completion");
        let text = self.client.complete(system_role, prompt, &self.model).await?;
        if text.trim().is_empty() {
            return Err(PipelineError::upstream(
                Service::TextGeneration,
                "model returned an empty completion",
            ));
        }
        Ok(text)
    }

    pub async fn generate(&self, spec: &PromptSpec, system_role: &str) -> Result<String, PipelineError> {
        let text = self.complete(&spec.render(), system_role).await?;
        info!(chars = text.len(), references = spec.reference_urls.len(), "Draft generated");
        Ok(text)
    }

    pub async fn revise(
        &self,
        previous: &str,
        feedback: &str,
        spec: &PromptSpec,
    ) -> Result<String, PipelineError> {
        if feedback.trim().is_empty() {
            return Err(PipelineError::Validation(
                "revision feedback must not be empty".to_string(),
            ));
        }
        let text = self
            .complete(&spec.render_revision(previous, feedback), roles::BLOG_WRITER)
            .await?;
        info!(chars = text.len(), "Draft revised");
        Ok(text)
    }

    /// Ask for a vivid image prompt for the blog header image.
    pub async fn image_description(&self, topic: &str, style: &str) -> Result<String, PipelineError> {
        let prompt = format!(
            "Create a vivid image description for a blog post about {topic} in a {style} style. \
             Describe only the scene, with no text overlays."
        );
        self.complete(&prompt, roles::VISUAL_DESIGNER).await
    }

    /// Generate and parse copy for short-form unit `index` (1-based).
    pub async fn short_form_copy(
        &self,
        index: u32,
        topic: &str,
        draft: &str,
    ) -> Result<ShortFormCopy, PipelineError> {
        let prompt = format!(
            "Create a Pinterest post for '{topic}', aspect {index}. \
             Include title, description, and 5-10 hashtags, formatted as lines starting with \
             'Title:', 'Description:' and 'Hashtags:'.\nBlog post: {excerpt}",
            excerpt = truncate_chars(draft, DRAFT_EXCERPT_CHARS),
        );
        let response = self.complete(&prompt, roles::SOCIAL_MEDIA_MANAGER).await?;
        parse_short_form_copy(&response)
    }
}

/// Prompt for the image of a short-form unit.
pub fn short_form_image_prompt(title: &str, topic: &str, style: &str) -> String {
    format!("Create a vivid {style} image for '{title}' about {topic}, vertical composition, no text.")
}
