pub mod alias;
pub mod cfg_edit;
pub mod config;
pub mod domtree;
pub mod error;
pub mod live_values;
pub mod loop_analysis;
pub mod transform;
pub mod verify;

pub use config::PipelineConfig;
pub use error::{DiversifyError, Result, Violation};
pub use transform::{Pass, Pipeline, Transform};
