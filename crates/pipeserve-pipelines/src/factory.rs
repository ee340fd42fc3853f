//! Pipeline factory
//!
//! Turns [`PipelineArgs`] into a ready-to-run [`Pipeline`]. Loading reads
//! weights from disk or the Hub, so it runs on the blocking thread pool.

use crate::args::{ModelSource, PipelineArgs, Task};
use crate::feature_extraction::FeatureExtractionPipeline;
use crate::lexicon::{LexiconSentimentPipeline, LEXICON_IMPLEMENTATION};
use crate::loader::resolve_model_files;
use crate::pipeline::Pipeline;
use crate::text_classification::TextClassificationPipeline;
use async_trait::async_trait;
use pipeserve_core::{Error, Result};
use std::sync::Arc;

/// Constructs a pipeline from construction arguments.
///
/// The server depends on this trait rather than on a concrete loader so the
/// inference backend can be swapped or stubbed.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn build(&self, args: &PipelineArgs) -> Result<Arc<dyn Pipeline>>;
}

/// Default factory backed by Candle
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleFactory;

#[async_trait]
impl PipelineFactory for CandleFactory {
    async fn build(&self, args: &PipelineArgs) -> Result<Arc<dyn Pipeline>> {
        let args = args.clone();
        tokio::task::spawn_blocking(move || load_pipeline(&args))
            .await
            .map_err(|e| Error::internal(format!("Pipeline loader task failed: {}", e)))?
    }
}

/// Build a pipeline with the default factory
pub async fn build_pipeline(args: &PipelineArgs) -> Result<Arc<dyn Pipeline>> {
    CandleFactory.build(args).await
}

fn load_pipeline(args: &PipelineArgs) -> Result<Arc<dyn Pipeline>> {
    tracing::info!("Building {} pipeline with model '{}'", args.task, args.model_id());

    if let ModelSource::Builtin { implementation } = args.model_source() {
        return load_builtin(args, &implementation);
    }

    let files = resolve_model_files(args)?;

    let pipeline: Arc<dyn Pipeline> = match args.task {
        Task::TextClassification => Arc::new(TextClassificationPipeline::load(args, &files)?),
        Task::FeatureExtraction => Arc::new(FeatureExtractionPipeline::load(args, &files)?),
    };
    Ok(pipeline)
}

fn load_builtin(args: &PipelineArgs, implementation: &str) -> Result<Arc<dyn Pipeline>> {
    match (args.task, implementation) {
        (Task::TextClassification, LEXICON_IMPLEMENTATION) => Ok(Arc::new(
            LexiconSentimentPipeline::with_labels(args.labels.as_deref())?,
        )),
        (task, other) => Err(Error::config(format!(
            "No builtin implementation '{}' for task {}",
            other, task
        ))),
    }
}
