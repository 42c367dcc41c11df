//! The run's caller-visible output: typed artifacts plus published post records.
//!
//! Append-only and keyed by filename. Short-form units write from concurrent
//! tasks, so everything sits behind one mutex.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use contentforge_common::{Artifact, ArtifactKind, PipelineError, ShortFormPost};
use tracing::info;

pub const BLOG_POST_FILENAME: &str = "blog_post.txt";
pub const BLOG_IMAGE_FILENAME: &str = "blog_image_upscaled.png";
pub const POSTS_TABLE_FILENAME: &str = "short_form_posts.json";

/// Filename of the video for short-form unit `index` (1-based).
pub fn video_filename(index: u32) -> String {
    format!("pinterest_video_{index}.mp4")
}

#[derive(Default)]
pub struct Manifest {
    inner: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    artifacts: Vec<Artifact>,
    filenames: HashSet<String>,
    posts: Vec<ShortFormPost>,
}

impl Entries {
    fn ensure_new(&self, filename: &str) -> Result<(), PipelineError> {
        if self.filenames.contains(filename) {
            return Err(PipelineError::DuplicateArtifact(filename.to_string()));
        }
        Ok(())
    }

    fn push(&mut self, artifact: Artifact) {
        self.filenames.insert(artifact.filename.clone());
        self.artifacts.push(artifact);
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_artifact(&self, artifact: Artifact) -> Result<(), PipelineError> {
        let mut entries = self.entries();
        entries.ensure_new(&artifact.filename)?;
        info!(
            filename = %artifact.filename,
            kind = ?artifact.kind,
            bytes = artifact.size_bytes(),
            "Artifact stored"
        );
        entries.push(artifact);
        Ok(())
    }

    /// Store a published unit's post record and its video together, or neither.
    pub fn record_post(&self, mut post: ShortFormPost, video: Artifact) -> Result<(), PipelineError> {
        let mut entries = self.entries();
        entries.ensure_new(&video.filename)?;
        post.video_artifact = video.filename.clone();
        entries.push(video);
        entries.posts.push(post);
        Ok(())
    }

    pub fn post_count(&self) -> usize {
        self.entries().posts.len()
    }

    /// Posts ordered by unit index, as a JSON table artifact.
    /// `None` when nothing was published.
    pub fn posts_table(&self) -> Result<Option<Artifact>, serde_json::Error> {
        let mut posts = self.entries().posts.clone();
        if posts.is_empty() {
            return Ok(None);
        }
        posts.sort_by_key(|p| p.index);
        let payload = serde_json::to_vec_pretty(&posts)?;
        Ok(Some(Artifact::new(ArtifactKind::Table, POSTS_TABLE_FILENAME, payload)))
    }

    pub fn export(&self) -> ManifestExport {
        let entries = self.entries();
        let mut posts = entries.posts.clone();
        posts.sort_by_key(|p| p.index);
        ManifestExport {
            artifacts: entries.artifacts.clone(),
            posts,
        }
    }
}

/// Snapshot of a manifest handed to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestExport {
    pub artifacts: Vec<Artifact>,
    pub posts: Vec<ShortFormPost>,
}

impl ManifestExport {
    pub fn artifact(&self, filename: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.filename == filename)
    }

    pub fn by_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    /// Write every artifact into `dir` under its own filename.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output dir: {}", dir.display()))?;
        let mut written = Vec::with_capacity(self.artifacts.len());
        for artifact in &self.artifacts {
            let path = dir.join(&artifact.filename);
            std::fs::write(&path, &artifact.payload)
                .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
            written.push(path);
        }
        info!(dir = %dir.display(), files = written.len(), "Artifacts written");
        Ok(written)
    }
}
