pub mod cancel;
pub mod checkpoint;
pub mod correction;
pub mod extraction;
pub mod merge;
pub mod orchestrator;
pub mod validation;

pub use cancel::*;
pub use checkpoint::*;
pub use correction::*;
pub use merge::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::record::RecordError;
use checkpoint::PipelineState;

/// The only failures `Pipeline::process` surfaces. Everything else degrades
/// into the returned validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Source text is empty")]
    EmptyInput,

    #[error("Confidence threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("Invalid pattern table: {0}")]
    InvalidPatternTable(String),

    #[error("Invalid field path: {0}")]
    InvalidPath(#[from] RecordError),

    #[error("No checkpoint transition out of {from}")]
    InvalidTransition { from: PipelineState },
}
