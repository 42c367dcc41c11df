use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::types::{Dimensions, OutputKind};

/// Terms an article must mention (title or description) to count as a reference.
pub const DEFAULT_RELEVANCE_TERMS: &[&str] = &["mindfulness", "meditation", "stress", "mental"];

/// Destination link used when no affiliate link is configured.
pub const FALLBACK_LINK: &str = "https://example.com";

/// Per-run pipeline configuration, loaded from TOML.
/// Secrets may live in the file but env vars win (see [`Credentials::apply_env`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub content: ContentConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    pub keywords: String,
    pub intent: String,
    pub article_length: u32,
    #[serde(default = "default_audience")]
    pub target_audience: String,
    #[serde(default = "default_tone")]
    pub tone_and_style: String,
    #[serde(default = "default_format")]
    pub content_format: String,
    #[serde(default)]
    pub seo_keywords: Vec<String>,
    #[serde(default)]
    pub call_to_action: String,
    #[serde(default)]
    pub affiliate_link: String,
    #[serde(default = "default_image_style")]
    pub image_style: String,
    #[serde(default = "default_relevance_terms")]
    pub relevance_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputsConfig {
    #[serde(default = "default_kinds")]
    pub kinds: Vec<OutputKind>,
    #[serde(default = "default_post_count")]
    pub post_count: u32,
    /// Max short-form units in flight at once.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            kinds: default_kinds(),
            post_count: default_post_count(),
            worker_limit: default_worker_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    #[serde(default = "default_text_model")]
    pub text: String,
    #[serde(default = "default_image_model")]
    pub image: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            text: default_text_model(),
            image: default_image_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagesConfig {
    #[serde(default = "default_blog_dimensions")]
    pub blog: Dimensions,
    #[serde(default = "default_short_form_dimensions")]
    pub short_form: Dimensions,
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            blog: default_blog_dimensions(),
            short_form: default_short_form_dimensions(),
            upscale_factor: default_upscale_factor(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default)]
    pub template_id: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            template_id: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RenderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    #[serde(default)]
    pub board_id: String,
    /// Human-readable board name recorded in the manifest. Falls back to `board_id`.
    #[serde(default)]
    pub board_name: String,
}

impl PublishConfig {
    pub fn board_label(&self) -> &str {
        if self.board_name.is_empty() {
            &self.board_id
        } else {
            &self.board_name
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    #[serde(default)]
    pub newsapi_key: String,
    #[serde(default)]
    pub venice_api_key: String,
    #[serde(default)]
    pub bannerbear_api_key: String,
    #[serde(default)]
    pub pinterest_access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("newsapi_key", &redact(&self.newsapi_key))
            .field("venice_api_key", &redact(&self.venice_api_key))
            .field("bannerbear_api_key", &redact(&self.bannerbear_api_key))
            .field("pinterest_access_token", &redact(&self.pinterest_access_token))
            .finish()
    }
}

impl Credentials {
    /// Override file values with `NEWSAPI_KEY`, `VENICE_API_KEY`,
    /// `BANNERBEAR_API_KEY` and `PINTEREST_ACCESS_TOKEN` when set.
    pub fn apply_env(&mut self) {
        let overrides = [
            ("NEWSAPI_KEY", &mut self.newsapi_key),
            ("VENICE_API_KEY", &mut self.venice_api_key),
            ("BANNERBEAR_API_KEY", &mut self.bannerbear_api_key),
            ("PINTEREST_ACCESS_TOKEN", &mut self.pinterest_access_token),
        ];
        for (key, slot) in overrides {
            if let Ok(value) = env::var(key) {
                if !value.is_empty() {
                    *slot = value;
                }
            }
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl PipelineConfig {
    /// Load a TOML config file and layer env secrets on top.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.credentials.apply_env();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn wants(&self, kind: OutputKind) -> bool {
        self.outputs.kinds.contains(&kind)
    }

    /// Link attached to published posts and calls to action.
    pub fn destination_link(&self) -> &str {
        if self.content.affiliate_link.is_empty() {
            FALLBACK_LINK
        } else {
            &self.content.affiliate_link
        }
    }

    /// Check every required field once, before any external call.
    /// Reports all problems together.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut missing: Vec<&str> = Vec::new();
        let mut invalid: Vec<String> = Vec::new();

        let required = [
            ("credentials.newsapi_key", &self.credentials.newsapi_key),
            ("credentials.venice_api_key", &self.credentials.venice_api_key),
            ("models.text", &self.models.text),
            ("models.image", &self.models.image),
            ("content.keywords", &self.content.keywords),
            ("content.intent", &self.content.intent),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }

        if self.content.article_length == 0 {
            invalid.push("content.article_length must be greater than 0".to_string());
        }
        if self.content.relevance_terms.iter().all(|t| t.trim().is_empty()) {
            invalid.push("content.relevance_terms must contain at least one term".to_string());
        }
        if self.outputs.kinds.is_empty() {
            invalid.push("outputs.kinds must name at least one output".to_string());
        }
        if self.outputs.worker_limit == 0 {
            invalid.push("outputs.worker_limit must be at least 1".to_string());
        }
        if self.images.upscale_factor == 0 {
            invalid.push("images.upscale_factor must be at least 1".to_string());
        }

        if self.wants(OutputKind::Blog) && has_zero_side(self.images.blog) {
            invalid.push("images.blog dimensions must be non-zero".to_string());
        }

        if self.wants(OutputKind::ShortForm) {
            let short_form_required = [
                ("credentials.bannerbear_api_key", &self.credentials.bannerbear_api_key),
                (
                    "credentials.pinterest_access_token",
                    &self.credentials.pinterest_access_token,
                ),
                ("render.template_id", &self.render.template_id),
                ("publish.board_id", &self.publish.board_id),
            ];
            for (name, value) in short_form_required {
                if value.trim().is_empty() {
                    missing.push(name);
                }
            }
            if self.outputs.post_count == 0 {
                invalid.push("outputs.post_count must be at least 1".to_string());
            }
            if has_zero_side(self.images.short_form) {
                invalid.push("images.short_form dimensions must be non-zero".to_string());
            }
            if self.render.poll_interval_secs == 0 {
                invalid.push("render.poll_interval_secs must be at least 1".to_string());
            }
            if self.render.timeout_secs == 0 {
                invalid.push("render.timeout_secs must be at least 1".to_string());
            }
        }

        if !missing.is_empty() {
            invalid.insert(0, format!("missing required fields: {}", missing.join(", ")));
        }
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(invalid.join("; ")))
        }
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            keywords = %self.content.keywords,
            intent = %self.content.intent,
            article_length = self.content.article_length,
            outputs = ?self.outputs.kinds,
            post_count = self.outputs.post_count,
            worker_limit = self.outputs.worker_limit,
            text_model = %self.models.text,
            image_model = %self.models.image,
            board = %self.publish.board_label(),
            poll_interval_secs = self.render.poll_interval_secs,
            timeout_secs = self.render.timeout_secs,
            credentials = ?self.credentials,
            "Pipeline config loaded"
        );
    }
}

fn has_zero_side(d: Dimensions) -> bool {
    d.width == 0 || d.height == 0
}

fn default_audience() -> String {
    "busy professionals".to_string()
}

fn default_tone() -> String {
    "uplifting and conversational".to_string()
}

fn default_format() -> String {
    "listicle".to_string()
}

fn default_image_style() -> String {
    "realistic".to_string()
}

fn default_relevance_terms() -> Vec<String> {
    DEFAULT_RELEVANCE_TERMS.iter().map(|t| t.to_string()).collect()
}

fn default_kinds() -> Vec<OutputKind> {
    vec![OutputKind::ShortForm]
}

fn default_post_count() -> u32 {
    3
}

fn default_worker_limit() -> usize {
    3
}

fn default_text_model() -> String {
    "llama-3.3-70b".to_string()
}

fn default_image_model() -> String {
    "flux-dev".to_string()
}

fn default_blog_dimensions() -> Dimensions {
    Dimensions {
        width: 800,
        height: 600,
    }
}

fn default_short_form_dimensions() -> Dimensions {
    Dimensions {
        width: 864,
        height: 1280,
    }
}

fn default_upscale_factor() -> u32 {
    2
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
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
        template_id = "tmpl_123"

        [publish]
        board_id = "board_1"
        board_name = "Mindfulness Tips"

        [credentials]
        newsapi_key = "n"
        venice_api_key = "v"
        bannerbear_api_key = "b"
        pinterest_access_token = "p"
    "#;

    #[test]
    fn full_config_parses_with_defaults() {
        let config = PipelineConfig::from_toml(FULL).unwrap();
        assert!(config.wants(OutputKind::Blog));
        assert!(config.wants(OutputKind::ShortForm));
        assert_eq!(config.models.text, "llama-3.3-70b");
        assert_eq!(config.images.short_form, Dimensions { width: 864, height: 1280 });
        assert_eq!(config.images.blog, Dimensions { width: 800, height: 600 });
        assert_eq!(config.render.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.render.timeout(), Duration::from_secs(600));
        assert_eq!(config.content.relevance_terms.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml = FULL.replace("[publish]", "[publish]\nboard_colour = \"red\"");
        assert!(PipelineConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn validation_lists_every_missing_field() {
        let mut config = PipelineConfig::from_toml(FULL).unwrap();
        config.credentials.venice_api_key.clear();
        config.render.template_id.clear();
        let err = config.validate().unwrap_err();
        let PipelineError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("credentials.venice_api_key"), "{msg}");
        assert!(msg.contains("render.template_id"), "{msg}");
    }

    #[test]
    fn blog_only_runs_do_not_need_render_or_publish_credentials() {
        let mut config = PipelineConfig::from_toml(FULL).unwrap();
        config.outputs.kinds = vec![OutputKind::Blog];
        config.credentials.bannerbear_api_key.clear();
        config.credentials.pinterest_access_token.clear();
        config.publish.board_id.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_post_count_is_invalid_for_short_form() {
        let mut config = PipelineConfig::from_toml(FULL).unwrap();
        config.outputs.post_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn destination_link_falls_back() {
        let mut config = PipelineConfig::from_toml(FULL).unwrap();
        assert_eq!(config.destination_link(), "https://payhip.com/b/tnVQN");
        config.content.affiliate_link.clear();
        assert_eq!(config.destination_link(), FALLBACK_LINK);
    }

    #[test]
    fn credentials_debug_never_prints_secrets() {
        let config = PipelineConfig::from_toml(FULL).unwrap();
        let printed = format!("{:?}", config.credentials);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("\"v\""));
    }

    #[test]
    fn board_label_falls_back_to_id() {
        let publish = PublishConfig {
            board_id: "board_9".into(),
            board_name: String::new(),
        };
        assert_eq!(publish.board_label(), "board_9");
    }

    #[test]
    fn example_config_parses() {
        let example = include_str!("../../../contentforge.example.toml");
        let config = PipelineConfig::from_toml(example).unwrap();
        assert_eq!(config.outputs.worker_limit, 3);
        assert_eq!(config.images.blog, Dimensions { width: 800, height: 600 });
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contentforge.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.content.article_length, 500);
    }
}
