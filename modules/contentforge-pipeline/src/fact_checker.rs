use contentforge_common::{FactCheckResult, PipelineError, Reference};
use tracing::{info, warn};

use crate::parsing::parse_fact_check;
use crate::text_generator::{roles, TextGenerator};

/// Verification pass over generated text.
#[derive(Clone)]
pub struct FactChecker {
    generator: TextGenerator,
}

impl FactChecker {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }

    /// Score `content` against `references`. An unreadable verdict yields the
    /// fixed failing fallback; only transport problems are errors.
    pub async fn verify(
        &self,
        content: &str,
        references: &[Reference],
    ) -> Result<FactCheckResult, PipelineError> {
        let response = self
            .generator
            .complete(&verification_prompt(content, references), roles::FACT_CHECKER)
            .await?;

        let result = match parse_fact_check(&response) {
            Some((confidence, explanation)) => FactCheckResult::from_confidence(confidence, explanation),
            None => {
                warn!(response_chars = response.len(), "Fact check response unparseable");
                FactCheckResult::unparseable()
            }
        };
        info!(
            confidence = result.confidence,
            passed = result.passed,
            "Fact check complete"
        );
        Ok(result)
    }
}

fn verification_prompt(content: &str, references: &[Reference]) -> String {
    let mut prompt = format!(
        "Verify the factual accuracy of this content:\n{content}\n\n\
         Respond as 'Confidence: <0-100> - <explanation>'."
    );
    if !references.is_empty() {
        let urls: Vec<&str> = references.iter().map(|r| r.url.as_str()).collect();
        prompt.push_str(&format!("\nCheck against these references: {}", urls.join(", ")));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::MockText;

    fn checker(text: Arc<MockText>) -> FactChecker {
        FactChecker::new(TextGenerator::new(text, "m"))
    }

    #[tokio::test]
    async fn parses_confidence_and_explanation() {
        let text = Arc::new(MockText::new().on_role(roles::FACT_CHECKER, "Confidence: 85 - looks accurate"));
        let result = checker(text).verify("draft", &[]).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.confidence, 85);
        assert_eq!(result.explanation, "looks accurate");
    }

    #[tokio::test]
    async fn unparseable_response_is_fixed_fallback() {
        let text = Arc::new(MockText::new().on_role(roles::FACT_CHECKER, "Seems fine to me!"));
        let result = checker(text).verify("draft", &[]).await.unwrap();
        assert_eq!(result, FactCheckResult::unparseable());
    }

    #[tokio::test]
    async fn below_threshold_is_not_passed() {
        let text = Arc::new(MockText::new().on_role(roles::FACT_CHECKER, "Confidence: 40 - several errors"));
        let result = checker(text).verify("draft", &[]).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.confidence, 40);
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() {
        let text = Arc::new(MockText::unavailable());
        let err = checker(text).verify("draft", &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn prompt_embeds_reference_urls() {
        let text = Arc::new(MockText::new().on_role(roles::FACT_CHECKER, "Confidence: 90 - ok"));
        let refs = vec![Reference {
            title: "t".into(),
            description: "d".into(),
            url: "https://news.example/a".into(),
        }];
        checker(text.clone()).verify("the draft body", &refs).await.unwrap();
        let prompt = text.last_prompt(roles::FACT_CHECKER).unwrap();
        assert!(prompt.contains("the draft body"));
        assert!(prompt.contains("https://news.example/a"));
    }
}
