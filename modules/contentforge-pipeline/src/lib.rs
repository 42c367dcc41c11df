pub mod fact_checker;
pub mod manifest;
pub mod media;
pub mod orchestrator;
pub mod parsing;
pub mod references;
pub mod run_log;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod text_generator;
pub mod traits;

pub use manifest::{Manifest, ManifestExport};
pub use orchestrator::{ApprovalDecision, Orchestrator, PipelineRun, RunSnapshot, RunState};
pub use traits::Services;
