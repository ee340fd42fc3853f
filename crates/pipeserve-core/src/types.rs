//! Inference request and response types

use crate::output::Mapping;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw pipeline input: free-form text or a structured object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceInput {
    /// Plain text input
    Text(String),

    /// Structured input, e.g. `{"text": "...", "text_pair": "..."}`
    Structured(Mapping),
}

impl InferenceInput {
    /// Look up a string field of a structured input
    pub fn field(&self, key: &str) -> Option<&str> {
        match self {
            Self::Text(_) => None,
            Self::Structured(map) => map.get(key).and_then(|v| v.as_str()),
        }
    }

    /// Whether this is a structured input
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

impl From<&str> for InferenceInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for InferenceInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl fmt::Display for InferenceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Structured(map) => {
                let rendered = serde_json::to_string(map).map_err(|_| fmt::Error)?;
                write!(f, "{rendered}")
            }
        }
    }
}

/// Inbound inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Pipeline input
    pub input: InferenceInput,

    /// Keyword arguments forwarded to the pipeline call
    #[serde(default)]
    pub args: Mapping,
}

/// Successful inference reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Normalized pipeline result
    pub result: Mapping,
}
