//! Pipeline construction arguments
//!
//! The service is configured by a single environment variable holding a
//! YAML (or JSON) mapping, e.g. `{"task": "sentiment-analysis"}`. It is parsed
//! into [`PipelineArgs`]; unknown keys and malformed values are rejected.

use pipeserve_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable holding the construction arguments
pub const PIPE_ARGS_ENV: &str = "PIPE_ARGS_STR";

/// Prefix selecting an in-process implementation instead of model weights
pub const BUILTIN_PREFIX: &str = "builtin:";

/// Inference task the pipeline performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Sequence classification (sentiment, topic, toxicity, ...)
    #[serde(rename = "text-classification", alias = "sentiment-analysis")]
    TextClassification,

    /// Hidden-state embeddings
    #[serde(rename = "feature-extraction")]
    FeatureExtraction,
}

impl Task {
    /// Canonical task name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextClassification => "text-classification",
            Self::FeatureExtraction => "feature-extraction",
        }
    }

    /// Model used when the configuration names none
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::TextClassification => "distilbert-base-uncased-finetuned-sst-2-english",
            Self::FeatureExtraction => "sentence-transformers/all-MiniLM-L6-v2",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text-classification" | "sentiment-analysis" => Ok(Self::TextClassification),
            "feature-extraction" => Ok(Self::FeatureExtraction),
            other => Err(Error::config(format!("Unknown task '{}'", other))),
        }
    }
}

/// Device type for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceType {
    /// CPU inference (always available)
    #[default]
    Cpu,
    /// CUDA GPU inference
    Cuda(usize),
    /// Metal (Apple Silicon)
    Metal(usize),
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let (kind, index) = match lower.split_once(':') {
            Some((kind, idx)) => {
                let idx = idx
                    .parse::<usize>()
                    .map_err(|_| Error::config(format!("Invalid device index in '{}'", s)))?;
                (kind.to_string(), idx)
            }
            None => (lower, 0),
        };

        match kind.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(index)),
            "mps" | "metal" => Ok(Self::Metal(index)),
            _ => Err(Error::config(format!("Unknown device '{}'", s))),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(device: DeviceType) -> Self {
        match device {
            DeviceType::Cpu => "cpu".to_string(),
            DeviceType::Cuda(idx) => format!("cuda:{}", idx),
            DeviceType::Metal(idx) => format!("metal:{}", idx),
        }
    }
}

/// How token embeddings are reduced by feature extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// Return one embedding per token
    #[default]
    None,
    /// Attention-masked mean over tokens
    Mean,
    /// The first ([CLS]) token
    Cls,
}

impl Pooling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mean => "mean",
            Self::Cls => "cls",
        }
    }
}

/// Where model weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Load from local filesystem
    Local { path: PathBuf },

    /// Download from HuggingFace Hub
    HuggingFace { repo: String, revision: String },

    /// Use built-in implementation
    Builtin { implementation: String },
}

/// Typed pipeline construction arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineArgs {
    /// Task to run
    pub task: Task,

    /// Hub repo id, local directory, or `builtin:<name>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Hub revision
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Explicit tokenizer.json path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<PathBuf>,

    /// Device to run on
    #[serde(default)]
    pub device: DeviceType,

    /// Maximum sequence length in tokens
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Label names, overriding the model's id2label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    /// Default pooling for feature extraction
    #[serde(default)]
    pub pooling: Pooling,

    /// Hub cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_max_length() -> usize {
    512
}

impl PipelineArgs {
    /// Arguments for a task with every other field defaulted
    pub fn new(task: Task) -> Self {
        Self {
            task,
            model: None,
            revision: default_revision(),
            tokenizer: None,
            device: DeviceType::default(),
            max_length: default_max_length(),
            labels: None,
            pooling: Pooling::default(),
            cache_dir: None,
        }
    }

    /// Parse a YAML or JSON mapping
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::config("Pipeline arguments are empty"));
        }

        let args: PipelineArgs = serde_yaml::from_str(raw)?;
        args.validate()?;
        Ok(args)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_pooling(mut self, pooling: Pooling) -> Self {
        self.pooling = pooling;
        self
    }

    /// Model identifier, falling back to the task default
    pub fn model_id(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.task.default_model())
    }

    /// Resolve the model identifier to a source
    pub fn model_source(&self) -> ModelSource {
        let id = self.model_id();

        if let Some(implementation) = id.strip_prefix(BUILTIN_PREFIX) {
            return ModelSource::Builtin {
                implementation: implementation.to_string(),
            };
        }

        let path = Path::new(id);
        if path.exists() || id.starts_with('.') || id.starts_with('/') {
            return ModelSource::Local {
                path: path.to_path_buf(),
            };
        }

        ModelSource::HuggingFace {
            repo: id.to_string(),
            revision: self.revision.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(Error::config("max_length must be greater than zero"));
        }

        if let Some(labels) = &self.labels {
            if labels.is_empty() {
                return Err(Error::config("labels must not be empty when given"));
            }
        }

        if self.task != Task::FeatureExtraction && self.pooling != Pooling::None {
            return Err(Error::config(format!(
                "pooling is only valid for feature-extraction, not {}",
                self.task
            )));
        }

        Ok(())
    }
}
