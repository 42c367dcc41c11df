//! Typed field extraction from semi-structured model output.
//!
//! Short-form copy must carry `Title:`, `Description:` and `Hashtags:` line
//! prefixes; a missing label is a `MalformedGenerationResponse`. Fact-check
//! responses are `Confidence: <n> - <explanation>`; there a parse failure is
//! reported as `None` and the caller applies the fixed fallback.

use contentforge_common::PipelineError;

const TITLE: &str = "Title:";
const DESCRIPTION: &str = "Description:";
const HASHTAGS: &str = "Hashtags:";
const CONFIDENCE: &str = "Confidence:";
const EXPLANATION_DELIMITER: &str = " - ";

/// Title, description and hashtags for one short-form unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortFormCopy {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
}

impl ShortFormCopy {
    /// Description with hashtags appended, as sent to the publish service.
    pub fn publish_description(&self) -> String {
        if self.hashtags.is_empty() {
            self.description.clone()
        } else {
            format!("{} {}", self.description, self.hashtags.join(" "))
        }
    }
}

fn malformed(field: &str) -> PipelineError {
    PipelineError::MalformedGenerationResponse {
        field: field.to_string(),
    }
}

/// Value after `label` on the first line that starts with it.
fn labelled_line<'a>(lines: &[&'a str], label: &str) -> Option<(usize, &'a str)> {
    lines.iter().enumerate().find_map(|(i, line)| {
        line.trim_start()
            .strip_prefix(label)
            .map(|rest| (i, rest.trim()))
    })
}

pub fn parse_short_form_copy(response: &str) -> Result<ShortFormCopy, PipelineError> {
    let lines: Vec<&str> = response.lines().collect();

    let (_, title) = labelled_line(&lines, TITLE).ok_or_else(|| malformed("title"))?;
    if title.is_empty() {
        return Err(malformed("title"));
    }

    let (_, description) =
        labelled_line(&lines, DESCRIPTION).ok_or_else(|| malformed("description"))?;
    if description.is_empty() {
        return Err(malformed("description"));
    }

    let (at, inline_tags) = labelled_line(&lines, HASHTAGS).ok_or_else(|| malformed("hashtags"))?;
    // Some models put the tags on the line below the label.
    let tag_text = if inline_tags.is_empty() {
        lines[at + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .unwrap_or("")
    } else {
        inline_tags
    };

    let hashtags = tag_text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ShortFormCopy {
        title: title.to_string(),
        description: description.to_string(),
        hashtags,
    })
}

/// Confidence (0–100) and explanation from a verification response.
pub fn parse_fact_check(response: &str) -> Option<(u8, String)> {
    let (_, after_marker) = response.split_once(CONFIDENCE)?;
    let token = after_marker.split_whitespace().next()?;
    let confidence: u8 = token.parse().ok().filter(|c| *c <= 100)?;
    let explanation = response.split(EXPLANATION_DELIMITER).nth(1)?;
    Some((confidence, explanation.trim().to_string()))
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
