pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod types;

pub use error::{PipelineError, Result};
pub use pipeline::{run, JoinedTable, Pipeline, PipelineOutput};
