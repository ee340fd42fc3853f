//! pipeserve pipelines
//!
//! Inference pipelines built on Candle, and the factory that constructs one
//! from typed construction arguments.
//!
//! Supported tasks:
//! - `text-classification` (alias `sentiment-analysis`): BERT and DistilBERT
//!   sequence classifiers, or the in-process `builtin:lexicon` classifier
//! - `feature-extraction`: BERT-family encoders with optional pooling

pub mod args;
pub mod factory;
pub mod feature_extraction;
pub mod lexicon;
pub mod loader;
pub mod pipeline;
pub mod text_classification;

pub use args::{DeviceType, ModelSource, PipelineArgs, Pooling, Task, PIPE_ARGS_ENV};
pub use factory::{build_pipeline, CandleFactory, PipelineFactory};
pub use feature_extraction::{FeatureExtractionPipeline, TensorOutput};
pub use lexicon::LexiconSentimentPipeline;
pub use pipeline::{parse_call_args, Pipeline};
pub use text_classification::TextClassificationPipeline;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::args::{PipelineArgs, Task};
    pub use crate::factory::{build_pipeline, PipelineFactory};
    pub use crate::pipeline::Pipeline;
    pub use pipeserve_core::prelude::*;
}
