//! Application state shared by all request handlers

use crate::config::ServiceConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use pipeserve_core::Result;
use pipeserve_pipelines::{CandleFactory, Pipeline, PipelineFactory};
use std::sync::Arc;
use tracing::info;

/// Immutable state built once at startup
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<dyn Pipeline>,
    pub config: Arc<ServiceConfig>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the pipeline with the default Candle factory
    pub async fn initialize(config: ServiceConfig) -> Result<Self> {
        Self::initialize_with(config, &CandleFactory).await
    }

    /// Build the pipeline through `factory`
    ///
    /// Any construction failure is returned; no partial state is kept.
    pub async fn initialize_with(
        config: ServiceConfig,
        factory: &dyn PipelineFactory,
    ) -> Result<Self> {
        info!("Loading pipeline...");
        let pipeline = factory.build(&config.pipeline).await?;
        info!(task = %pipeline.task(), name = pipeline.name(), "Pipeline loaded.");

        Ok(Self {
            pipeline,
            config: Arc::new(config),
            metrics_handle: None,
        })
    }

    /// State around an already constructed pipeline
    pub fn from_pipeline(pipeline: Arc<dyn Pipeline>, config: ServiceConfig) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
