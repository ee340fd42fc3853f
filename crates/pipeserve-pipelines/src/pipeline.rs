//! Pipeline trait and call-argument parsing

use crate::args::Task;
use async_trait::async_trait;
use pipeserve_core::{Error, InferenceInput, Mapping, PipelineOutput, Result};
use serde::de::DeserializeOwned;

/// A constructed inference pipeline.
///
/// Built once at startup and shared read-only across concurrent requests.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Run the pipeline on one input with per-call keyword arguments
    async fn run(&self, input: &InferenceInput, args: &Mapping) -> Result<PipelineOutput>;

    /// Task this pipeline performs
    fn task(&self) -> Task;

    /// Pipeline name (usually the model id)
    fn name(&self) -> &str;
}

/// Parse per-call keyword arguments into a pipeline's typed argument struct
pub fn parse_call_args<T: DeserializeOwned>(args: &Mapping) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(args.clone()))
        .map_err(|e| Error::invalid_input(format!("Invalid call arguments: {}", e)))
}

/// Extract text (and optional pair) from an input
pub(crate) fn text_and_pair(input: &InferenceInput) -> Result<(&str, Option<&str>)> {
    match input {
        InferenceInput::Text(text) => Ok((text.as_str(), None)),
        InferenceInput::Structured(_) => {
            let text = input.field("text").ok_or_else(|| {
                Error::invalid_input("Structured input requires a string 'text' field")
            })?;
            Ok((text, input.field("text_pair")))
        }
    }
}
