//! Run log: ordered JSON timeline of every action taken during a run.
//!
//! Short-form units log from concurrent tasks, so events sit behind a mutex
//! and `seq` is assigned under the same lock. The binary writes the timeline
//! to `{output_dir}/run-log.json`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub const RUN_LOG_FILENAME: &str = "run-log.json";

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    inner: Mutex<Timeline>,
}

#[derive(Default)]
struct Timeline {
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        keywords: String,
        outputs: Vec<String>,
        post_count: u32,
    },
    ReferenceSearch {
        keywords: String,
        references: u32,
        degraded: bool,
    },
    DraftGenerated {
        chars: usize,
        references: u32,
    },
    FactCheck {
        confidence: u8,
        passed: bool,
        explanation: String,
    },
    ApprovalDecision {
        decision: String,
        revision_count: u32,
    },
    DraftRevised {
        chars: usize,
        revision_count: u32,
    },
    StateChanged {
        from: String,
        to: String,
    },
    UnitPhase {
        unit: String,
        phase: String,
    },
    RenderPoll {
        job_id: String,
        attempt: u32,
        status: String,
    },
    ArtifactStored {
        filename: String,
        kind: String,
        bytes: usize,
    },
    Published {
        unit: u32,
        url: String,
    },
    UnitFailed {
        unit: String,
        error: String,
    },
    RunAborted {
        reason: String,
    },
    RunFinished {
        posts_published: u32,
        units_failed: u32,
    },
}

impl RunLog {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            inner: Mutex::new(Timeline::default()),
        }
    }

    pub fn log(&self, kind: EventKind) {
        let mut timeline = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let seq = timeline.seq;
        timeline.events.push(RunEvent {
            seq,
            ts: Utc::now(),
            kind,
        });
        timeline.seq += 1;
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .clone()
    }

    /// Serialize the run log to JSON and write it into `dir`.
    /// Returns the file path on success.
    pub fn save(&self, dir: &Path, final_state: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(RUN_LOG_FILENAME);

        let events = self.events();
        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            final_state,
            events: &events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = events.len(), "Run log saved");

        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Serialization wrapper
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    final_state: &'a str,
    events: &'a [RunEvent],
}
