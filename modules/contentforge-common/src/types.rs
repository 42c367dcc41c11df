use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// --- Configuration enums ---

/// Which deliverables a run should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Blog,
    ShortForm,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Blog => "blog",
            OutputKind::ShortForm => "short_form",
        }
    }
}

/// Width × height in pixels for one publishing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

// --- References ---

/// A news article used as citation context for generation and fact checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub title: String,
    pub description: String,
    pub url: String,
}

// --- Draft ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// The long-form candidate text moving through the approval loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Draft {
    pub body: String,
    pub status: ApprovalStatus,
    pub revision_count: u32,
    pub feedback_history: Vec<String>,
}

impl Draft {
    pub fn new(body: String) -> Self {
        Self {
            body,
            status: ApprovalStatus::Pending,
            revision_count: 0,
            feedback_history: Vec::new(),
        }
    }

    fn ensure_pending(&self, action: &str) -> Result<(), PipelineError> {
        if self.status != ApprovalStatus::Pending {
            return Err(PipelineError::InvalidTransition(format!(
                "cannot {action} a draft that is {:?}",
                self.status
            )));
        }
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), PipelineError> {
        self.ensure_pending("approve")?;
        self.status = ApprovalStatus::Approved;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), PipelineError> {
        self.ensure_pending("reject")?;
        self.status = ApprovalStatus::Rejected;
        Ok(())
    }

    /// Replace the body with a revision produced from `feedback`.
    pub fn apply_revision(&mut self, body: String, feedback: &str) -> Result<(), PipelineError> {
        self.ensure_pending("revise")?;
        if feedback.trim().is_empty() {
            return Err(PipelineError::Validation(
                "revision feedback must not be empty".to_string(),
            ));
        }
        self.body = body;
        self.revision_count += 1;
        self.feedback_history.push(feedback.to_string());
        Ok(())
    }
}

// --- Fact checking ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactCheckResult {
    pub passed: bool,
    pub confidence: u8,
    pub explanation: String,
}

impl FactCheckResult {
    pub const ACCEPT_THRESHOLD: u8 = 60;

    pub fn from_confidence(confidence: u8, explanation: impl Into<String>) -> Self {
        Self {
            passed: confidence >= Self::ACCEPT_THRESHOLD,
            confidence,
            explanation: explanation.into(),
        }
    }

    /// Fixed fail-safe result for a verification response that could not be parsed.
    pub fn unparseable() -> Self {
        Self {
            passed: false,
            confidence: 50,
            explanation: "unparseable".to_string(),
        }
    }
}

// --- Render jobs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Submitted,
    Rendering,
    Completed,
    Failed,
    TimedOut,
}

impl RenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RenderStatus::Completed | RenderStatus::Failed | RenderStatus::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub id: String,
    pub status: RenderStatus,
    pub result_url: Option<String>,
    pub polls: u32,
}

impl RenderJob {
    pub fn submitted(id: String) -> Self {
        Self {
            id,
            status: RenderStatus::Submitted,
            result_url: None,
            polls: 0,
        }
    }
}

// --- Artifacts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    Image,
    Video,
    Table,
}

/// A produced file handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub filename: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, filename: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            kind,
            filename: filename.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn text(filename: impl Into<String>, body: &str) -> Self {
        Self::new(ArtifactKind::Text, filename, body.as_bytes().to_vec())
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

// --- Short-form posts ---

/// A published short-form unit as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortFormPost {
    pub index: u32,
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub image_asset_id: String,
    pub video_artifact: String,
    pub publish_url: String,
    pub board: String,
    pub link: String,
    pub seo_keywords: Vec<String>,
}
