//! Feature extraction (embeddings) on BERT-family encoders

use crate::args::{PipelineArgs, Pooling, Task};
use crate::loader::{
    candle_err, create_device, encode_input, load_tokenizer, load_var_builder,
    parse_json_config, truncating_tokenizer, ModelFiles, ModelHeader,
};
use crate::pipeline::{parse_call_args, text_and_pair, Pipeline};
use async_trait::async_trait;
use candle_core::{Device, IndexOp, Tensor};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use pipeserve_core::{Error, InferenceInput, IntoMapping, Mapping, PipelineOutput, Result};
use serde::Deserialize;
use serde_json::json;
use tokenizers::Tokenizer;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtractionArgs {
    #[serde(default)]
    pooling: Option<Pooling>,

    /// L2-normalize each embedding
    #[serde(default)]
    normalize: bool,

    /// Return the raw tensor instead of nested lists
    #[serde(default)]
    return_tensors: bool,

    #[serde(default)]
    max_length: Option<usize>,
}

/// Embedding tensor returned when `return_tensors` is set
#[derive(Debug)]
pub struct TensorOutput {
    tensor: Tensor,
}

impl TensorOutput {
    pub fn new(tensor: Tensor) -> Self {
        Self { tensor }
    }
}

impl IntoMapping for TensorOutput {
    fn to_mapping(&self) -> Result<Mapping> {
        let data = self
            .tensor
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| Error::normalization(format!("Failed to read tensor data: {}", e)))?;

        let mut map = Mapping::new();
        map.insert("shape".to_string(), json!(self.tensor.dims()));
        map.insert("dtype".to_string(), json!(self.tensor.dtype().as_str()));
        map.insert("data".to_string(), json!(data));
        Ok(map)
    }
}

/// Candle embedding pipeline
pub struct FeatureExtractionPipeline {
    name: String,
    tokenizer: Tokenizer,
    model: BertModel,
    device: Device,
    pooling: Pooling,
    max_length: usize,
}

impl FeatureExtractionPipeline {
    /// Load from resolved checkpoint files
    pub fn load(args: &PipelineArgs, files: &ModelFiles) -> Result<Self> {
        let header: ModelHeader = parse_json_config(&files.config)?;
        if !matches!(header.model_type.as_str(), "bert" | "") {
            return Err(Error::config(format!(
                "feature-extraction supports bert-family encoders, got model_type '{}'",
                header.model_type
            )));
        }

        let tokenizer = truncating_tokenizer(
            &load_tokenizer(files, args.tokenizer.as_deref())?,
            args.max_length,
        )?;
        let bert_config: BertConfig = parse_json_config(&files.config)?;
        let device = create_device(args.device)?;
        let vb = load_var_builder(&files.weights, &device)?;

        let model = BertModel::load(vb.pp("bert"), &bert_config)
            .or_else(|_| BertModel::load(vb.clone(), &bert_config))
            .map_err(|e| Error::config(format!("Failed to load BERT encoder: {}", e)))?;

        tracing::info!(
            "Loaded feature extractor (hidden_size={}, pooling='{}')",
            bert_config.hidden_size,
            args.pooling.as_str()
        );

        Ok(Self {
            name: args.model_id().to_string(),
            tokenizer,
            model,
            device,
            pooling: args.pooling,
            max_length: args.max_length,
        })
    }

    /// Embeddings shaped `(1, tokens, hidden)` or `(1, hidden)` when pooled
    fn embed(&self, text: &str, pair: Option<&str>, call: &ExtractionArgs) -> Result<Tensor> {
        let encoding = encode_input(
            &self.tokenizer,
            self.max_length,
            call.max_length.unwrap_or(self.max_length),
            text,
            pair,
        )?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("Failed to create input tensor"))?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("Failed to create token type tensor"))?;
        let mask = Tensor::new(encoding.get_attention_mask(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("Failed to create attention mask"))?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&mask))
            .map_err(candle_err("Model forward pass failed"))?;

        let pooled = match call.pooling.unwrap_or(self.pooling) {
            Pooling::None => hidden_states,
            Pooling::Cls => hidden_states
                .i((.., 0, ..))
                .map_err(candle_err("Failed to extract CLS token"))?,
            Pooling::Mean => mean_pool(&hidden_states, &mask)?,
        };

        if call.normalize {
            l2_normalize(&pooled)
        } else {
            Ok(pooled)
        }
    }
}

/// Attention-masked mean over the token axis
fn mean_pool(hidden_states: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let mask = mask
        .to_dtype(hidden_states.dtype())
        .and_then(|m| m.unsqueeze(2))
        .map_err(candle_err("Failed to prepare mask"))?;

    let summed = hidden_states
        .broadcast_mul(&mask)
        .and_then(|t| t.sum(1))
        .map_err(candle_err("Failed to sum embeddings"))?;
    let counts = mask
        .sum(1)
        .and_then(|c| c.clamp(1e-9f32, f32::MAX))
        .map_err(candle_err("Failed to count tokens"))?;

    summed
        .broadcast_div(&counts)
        .map_err(candle_err("Mean pooling failed"))
}

fn l2_normalize(t: &Tensor) -> Result<Tensor> {
    let norm = t
        .sqr()
        .and_then(|s| s.sum_keepdim(candle_core::D::Minus1))
        .and_then(|s| s.sqrt())
        .and_then(|n| n.clamp(1e-12f32, f32::MAX))
        .map_err(candle_err("Failed to compute norm"))?;

    t.broadcast_div(&norm)
        .map_err(candle_err("Normalization failed"))
}

fn tensor_to_json(t: &Tensor) -> Result<serde_json::Value> {
    let value = match t.rank() {
        2 => json!(t.to_vec2::<f32>().map_err(candle_err("Failed to read embeddings"))?),
        3 => json!(t.to_vec3::<f32>().map_err(candle_err("Failed to read embeddings"))?),
        rank => {
            return Err(Error::internal(format!(
                "Unexpected embedding rank {}",
                rank
            )))
        }
    };
    Ok(value)
}

#[async_trait]
impl Pipeline for FeatureExtractionPipeline {
    async fn run(&self, input: &InferenceInput, args: &Mapping) -> Result<PipelineOutput> {
        let call: ExtractionArgs = parse_call_args(args)?;
        let (text, pair) = text_and_pair(input)?;
        let embeddings = self.embed(text, pair, &call)?;

        if call.return_tensors {
            return Ok(PipelineOutput::convertible(TensorOutput::new(embeddings)));
        }

        Ok(PipelineOutput::Other(tensor_to_json(&embeddings)?))
    }

    fn task(&self) -> Task {
        Task::FeatureExtraction
    }

    fn name(&self) -> &str {
        &self.name
    }
}
