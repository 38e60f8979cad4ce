//! Pipeline error taxonomy
//!
//! Stage handler faults are fatal to the run; schema violations are
//! quarantined and never surface here.

use thiserror::Error;

use crate::state::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("plan not found at {path}")]
    PlanNotFound { path: String },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}
