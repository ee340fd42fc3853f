use clap::builder::BoolishValueParser;
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "pipeserve")]
#[command(author, version, about = "Serve a single inference pipeline over HTTP", long_about = None)]
pub struct Cli {
    /// Service configuration file (YAML)
    #[arg(short, long, env = "PIPESERVE_CONFIG")]
    pub config: Option<String>,

    /// Pipeline construction arguments (YAML or JSON mapping)
    #[arg(long = "pipe-args", env = "PIPE_ARGS_STR", hide_env_values = true)]
    pub pipe_args: Option<String>,

    /// Listen address
    #[arg(short = 'l', long, env = "PIPESERVE_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PIPESERVE_PORT")]
    pub port: Option<u16>,

    /// Maximum request body size in bytes
    #[arg(long, env = "PIPESERVE_BODY_LIMIT")]
    pub body_limit: Option<usize>,

    /// Return structured error bodies instead of null on inference failure
    #[arg(long, env = "PIPESERVE_ERROR_RESPONSES", value_parser = BoolishValueParser::new())]
    pub error_responses: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "PIPESERVE_LOG_JSON", value_parser = BoolishValueParser::new())]
    pub log_json: bool,
}
