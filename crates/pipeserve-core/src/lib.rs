//! pipeserve core
//!
//! Types shared by the pipeline engine and the HTTP service.
//!
//! This crate provides:
//! - The inference request/response wire types
//! - The tagged [`PipelineOutput`] union and its normalization into a mapping
//! - Error types and result handling

pub mod error;
pub mod output;
pub mod types;

pub use error::{Error, Result};
pub use output::{IntoMapping, Mapping, PipelineOutput, OUTPUT_KEY};
pub use types::{InferenceInput, InferenceRequest, InferenceResponse};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::output::{IntoMapping, Mapping, PipelineOutput};
    pub use crate::types::{InferenceInput, InferenceRequest, InferenceResponse};
}
