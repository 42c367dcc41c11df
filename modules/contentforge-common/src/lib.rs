pub mod config;
pub mod error;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Service};
pub use types::*;
