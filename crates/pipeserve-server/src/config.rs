//! Service configuration
//!
//! Server settings come from an optional YAML file with CLI/env overrides
//! applied last. Pipeline construction arguments always come from
//! `PIPE_ARGS_STR` (or `--pipe-args`).

use crate::cli::Cli;
use pipeserve_core::{Error, Result};
use pipeserve_pipelines::{PipelineArgs, PIPE_ARGS_ENV};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,

    /// Return structured errors instead of a null body on inference failure
    #[serde(default)]
    pub error_responses: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            body_limit: default_body_limit(),
            error_responses: false,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

impl ServerSettings {
    /// Read settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let settings: ServerSettings = serde_yaml::from_str(&content)?;
        if settings.body_limit == 0 {
            return Err(Error::config("body_limit must be greater than zero"));
        }
        Ok(settings)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

/// Complete startup configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub pipeline: PipelineArgs,
}

impl ServiceConfig {
    pub fn new(pipeline: PipelineArgs) -> Self {
        Self {
            server: ServerSettings::default(),
            pipeline,
        }
    }

    /// Load configuration from file and CLI overrides
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut server = match &cli.config {
            Some(path) => ServerSettings::from_file(path)?,
            None => ServerSettings::default(),
        };

        if let Some(listen) = &cli.listen {
            server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            server.port = port;
        }
        if let Some(limit) = cli.body_limit {
            if limit == 0 {
                return Err(Error::config("--body-limit must be greater than zero"));
            }
            server.body_limit = limit;
        }
        if cli.error_responses {
            server.error_responses = true;
        }

        let raw = cli.pipe_args.as_deref().ok_or_else(|| {
            Error::config(format!(
                "{} is not set; pass pipeline arguments via the environment or --pipe-args",
                PIPE_ARGS_ENV
            ))
        })?;
        let pipeline = PipelineArgs::parse(raw)?;

        Ok(Self { server, pipeline })
    }
}
