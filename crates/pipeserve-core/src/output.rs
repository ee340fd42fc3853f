//! Pipeline results and their normalization into a plain mapping
//!
//! Every pipeline declares which shape it produces by returning one variant of
//! [`PipelineOutput`]. Normalization is a single match with one conversion per
//! variant, so no per-request inspection of the result value is needed.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// String-keyed JSON object used for request args and response results
pub type Mapping = serde_json::Map<String, Value>;

/// Key used to wrap results that have no natural mapping form
pub const OUTPUT_KEY: &str = "output";

/// Explicit conversion of a result object into a mapping.
///
/// Implemented by result types that carry data which must be materialized
/// before transport (device tensors, lazily computed views).
pub trait IntoMapping: fmt::Debug + Send + Sync {
    /// Convert into a mapping; may fail if the data cannot be materialized
    fn to_mapping(&self) -> Result<Mapping>;
}

/// Raw result of a pipeline call
#[derive(Debug)]
pub enum PipelineOutput {
    /// Already a mapping; passed through unchanged
    Mapping(Mapping),

    /// A structured record whose fields form the mapping
    Record(Value),

    /// A result with an explicit conversion into a mapping
    Convertible(Box<dyn IntoMapping>),

    /// Anything else (lists, scalars); wrapped under [`OUTPUT_KEY`]
    Other(Value),
}

impl PipelineOutput {
    /// Build a record output from any serializable struct
    pub fn record<T: Serialize>(record: &T) -> Result<Self> {
        Ok(Self::Record(serde_json::to_value(record)?))
    }

    /// Build a convertible output
    pub fn convertible(value: impl IntoMapping + 'static) -> Self {
        Self::Convertible(Box::new(value))
    }

    /// Variant name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mapping(_) => "mapping",
            Self::Record(_) => "record",
            Self::Convertible(_) => "convertible",
            Self::Other(_) => "other",
        }
    }

    /// Normalize into a mapping
    pub fn into_mapping(self) -> Result<Mapping> {
        match self {
            Self::Mapping(map) => Ok(map),
            Self::Record(Value::Object(fields)) => Ok(fields),
            Self::Record(other) => Err(Error::normalization(format!(
                "record did not serialize to an object: {}",
                value_type(&other)
            ))),
            Self::Convertible(value) => value.to_mapping(),
            Self::Other(value) => {
                let mut wrapped = Mapping::new();
                wrapped.insert(OUTPUT_KEY.to_string(), value);
                Ok(wrapped)
            }
        }
    }
}

impl From<Mapping> for PipelineOutput {
    fn from(map: Mapping) -> Self {
        Self::Mapping(map)
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
