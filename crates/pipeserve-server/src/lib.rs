//! pipeserve server
//!
//! Serves one inference pipeline over HTTP. The pipeline is built once by
//! [`AppState::initialize`] and shared read-only by every request.

pub mod cli;
pub mod config;
pub mod inference;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use cli::Cli;
pub use config::ServiceConfig;
pub use inference::{handle_inference, run_inference};
pub use routes::create_router;
pub use state::AppState;
