//! Error types for pipeserve

/// Result type alias using pipeserve's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeserve operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors (bad construction arguments, unknown task)
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline construction or execution errors
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Input the pipeline cannot accept
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Failure converting a pipeline result into a mapping
    #[error("normalization error: {0}")]
    Normalization(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML/JSON configuration parse errors
    #[error("configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new pipeline error
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new normalization error
    pub fn normalization(msg: impl Into<String>) -> Self {
        Self::Normalization(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable kind, used as the error `type` in responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::Yaml(_) => "configuration_error",
            Self::Pipeline(_) => "pipeline_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::Normalization(_) => "normalization_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}
