//! Text classification on BERT-family sequence classifiers
//!
//! The architecture is picked once at load time from `config.json`
//! (`model_type`). Plain text input yields a ranked list of
//! `{label, score}` entries; a structured `{"text", "text_pair"}` input with
//! the default `top_k` yields the single best `{label, score}` mapping.

use crate::args::{PipelineArgs, Task};
use crate::loader::{
    candle_err, create_device, encode_input, load_tokenizer, load_var_builder,
    parse_json_config, resolve_labels, truncating_tokenizer, ModelFiles, ModelHeader,
};
use crate::pipeline::{parse_call_args, text_and_pair, Pipeline};
use async_trait::async_trait;
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use pipeserve_core::{Error, InferenceInput, Mapping, PipelineOutput, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokenizers::{Encoding, Tokenizer};

/// Post-processing applied to raw logits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreFunction {
    Softmax,
    Sigmoid,
    None,
}

impl ScoreFunction {
    pub fn apply(&self, logits: &[f32]) -> Vec<f32> {
        match self {
            Self::Softmax => softmax(logits),
            Self::Sigmoid => logits.iter().map(|&x| sigmoid(x)).collect(),
            Self::None => logits.to_vec(),
        }
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return exps;
    }
    exps.into_iter().map(|x| x / sum).collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// One ranked prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Rank labels by score, highest first
pub fn rank_labels(labels: &[String], scores: &[f32], top_k: Option<usize>) -> Vec<LabelScore> {
    let mut ranked: Vec<LabelScore> = labels
        .iter()
        .zip(scores)
        .map(|(label, &score)| LabelScore {
            label: label.clone(),
            score,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(k) = top_k {
        ranked.truncate(k);
    }
    ranked
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassificationArgs {
    /// Number of labels to return; `null` returns every label
    #[serde(default = "default_top_k")]
    top_k: Option<usize>,

    #[serde(default)]
    function_to_apply: Option<ScoreFunction>,

    #[serde(default)]
    max_length: Option<usize>,
}

fn default_top_k() -> Option<usize> {
    Some(1)
}

enum Backbone {
    Bert {
        model: BertModel,
        pooler: Option<Linear>,
    },
    DistilBert {
        model: DistilBertModel,
        pre_classifier: Option<Linear>,
    },
}

/// Candle sequence classification pipeline
pub struct TextClassificationPipeline {
    name: String,
    tokenizer: Tokenizer,
    backbone: Backbone,
    classifier: Linear,
    device: Device,
    labels: Vec<String>,
    default_function: ScoreFunction,
    max_length: usize,
}

impl TextClassificationPipeline {
    /// Load from resolved checkpoint files
    pub fn load(args: &PipelineArgs, files: &ModelFiles) -> Result<Self> {
        let header: ModelHeader = parse_json_config(&files.config)?;
        if !matches!(header.model_type.as_str(), "bert" | "distilbert" | "") {
            return Err(Error::config(format!(
                "text-classification does not support model_type '{}'",
                header.model_type
            )));
        }

        let tokenizer = truncating_tokenizer(
            &load_tokenizer(files, args.tokenizer.as_deref())?,
            args.max_length,
        )?;
        let device = create_device(args.device)?;
        let vb = load_var_builder(&files.weights, &device)?;

        let explicit = args.labels.as_deref();
        let num_labels = header.label_count(explicit);
        let labels = resolve_labels(num_labels, explicit, &header);

        let (backbone, hidden_size) = if header.model_type == "distilbert" {
            load_distilbert(&vb, &files.config)?
        } else {
            load_bert(&vb, &files.config)?
        };

        let classifier = candle_nn::linear(hidden_size, num_labels, vb.pp("classifier"))
            .map_err(|e| {
                Error::config(format!(
                    "Model has no sequence classification head (classifier, {}x{}): {}",
                    hidden_size, num_labels, e
                ))
            })?;

        let default_function = if header.is_multi_label() || num_labels == 1 {
            ScoreFunction::Sigmoid
        } else {
            ScoreFunction::Softmax
        };

        tracing::info!(
            "Loaded {} classifier with {} labels: {:?}",
            if header.model_type.is_empty() { "bert" } else { header.model_type.as_str() },
            num_labels,
            labels
        );

        Ok(Self {
            name: args.model_id().to_string(),
            tokenizer,
            backbone,
            classifier,
            device,
            labels,
            default_function,
            max_length: args.max_length,
        })
    }

    fn encode(&self, text: &str, pair: Option<&str>, max_length: usize) -> Result<Encoding> {
        encode_input(&self.tokenizer, self.max_length, max_length, text, pair)
    }

    fn logits(&self, encoding: &Encoding) -> Result<Vec<f32>> {
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(candle_err("Failed to create input tensor"))?;

        let pooled = match &self.backbone {
            Backbone::Bert { model, pooler } => {
                let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(candle_err("Failed to create token type tensor"))?;
                let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(candle_err("Failed to create attention mask"))?;

                let hidden_states = model
                    .forward(&input_ids, &token_type_ids, Some(&attention_mask))
                    .map_err(candle_err("Model forward pass failed"))?;
                let cls = hidden_states
                    .i((.., 0, ..))
                    .map_err(candle_err("Failed to get CLS token"))?;

                match pooler {
                    Some(pooler) => pooler
                        .forward(&cls)
                        .and_then(|t| t.tanh())
                        .map_err(candle_err("Pooler failed"))?,
                    None => cls,
                }
            }
            Backbone::DistilBert {
                model,
                pre_classifier,
            } => {
                // DistilBERT masks positions where the mask is 1.
                let inverted: Vec<u8> = encoding
                    .get_attention_mask()
                    .iter()
                    .map(|&x| u8::from(x == 0))
                    .collect();
                let attention_mask = Tensor::new(inverted.as_slice(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(candle_err("Failed to create attention mask"))?;

                let hidden_states = model
                    .forward(&input_ids, &attention_mask)
                    .map_err(candle_err("Model forward pass failed"))?;
                let cls = hidden_states
                    .i((.., 0, ..))
                    .map_err(candle_err("Failed to get CLS token"))?;

                match pre_classifier {
                    Some(pre) => pre
                        .forward(&cls)
                        .and_then(|t| t.relu())
                        .map_err(candle_err("Pre-classifier failed"))?,
                    None => cls,
                }
            }
        };

        self.classifier
            .forward(&pooled)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(candle_err("Classification head failed"))
    }
}

fn load_bert(vb: &VarBuilder, config_path: &std::path::Path) -> Result<(Backbone, usize)> {
    let config: BertConfig = parse_json_config(config_path)?;
    let mut errors = Vec::new();

    for prefix in ["bert", ""] {
        let vb_prefix = if prefix.is_empty() { vb.clone() } else { vb.pp(prefix) };

        match BertModel::load(vb_prefix.clone(), &config) {
            Ok(model) => {
                let pooler = candle_nn::linear(
                    config.hidden_size,
                    config.hidden_size,
                    vb_prefix.pp("pooler").pp("dense"),
                )
                .ok();
                tracing::debug!(
                    "Loaded BERT backbone from '{}' (pooler: {})",
                    if prefix.is_empty() { "<root>" } else { prefix },
                    pooler.is_some()
                );
                return Ok((Backbone::Bert { model, pooler }, config.hidden_size));
            }
            Err(e) => errors.push(format!(
                "{}: {}",
                if prefix.is_empty() { "<root>" } else { prefix },
                e
            )),
        }
    }

    Err(Error::config(format!(
        "Failed to load BERT backbone with tried prefixes [{}]",
        errors.join(" | ")
    )))
}

fn load_distilbert(vb: &VarBuilder, config_path: &std::path::Path) -> Result<(Backbone, usize)> {
    let config: DistilBertConfig = parse_json_config(config_path)?;
    let header: ModelHeader = parse_json_config(config_path)?;
    let hidden_size = header.hidden_size.unwrap_or(768);

    let model = DistilBertModel::load(vb.pp("distilbert"), &config)
        .map_err(|e| Error::config(format!("Failed to load DistilBERT model: {}", e)))?;

    let pre_classifier = candle_nn::linear(hidden_size, hidden_size, vb.pp("pre_classifier")).ok();
    if pre_classifier.is_some() {
        tracing::debug!("Loaded pre_classifier layer (hidden_size={})", hidden_size);
    }

    Ok((
        Backbone::DistilBert {
            model,
            pre_classifier,
        },
        hidden_size,
    ))
}

#[async_trait]
impl Pipeline for TextClassificationPipeline {
    async fn run(&self, input: &InferenceInput, args: &Mapping) -> Result<PipelineOutput> {
        let start = Instant::now();
        let call: ClassificationArgs = parse_call_args(args)?;
        let (text, pair) = text_and_pair(input)?;

        let encoding = self.encode(text, pair, call.max_length.unwrap_or(self.max_length))?;
        let logits = self.logits(&encoding)?;
        let scores = call
            .function_to_apply
            .unwrap_or(self.default_function)
            .apply(&logits);
        let ranked = rank_labels(&self.labels, &scores, call.top_k);

        tracing::debug!(
            "Classified {} tokens in {}us",
            encoding.len(),
            start.elapsed().as_micros()
        );

        shape_output(input, call.top_k, ranked)
    }

    fn task(&self) -> Task {
        Task::TextClassification
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Single best mapping for structured top-1 calls, ranked list otherwise
fn shape_output(
    input: &InferenceInput,
    top_k: Option<usize>,
    ranked: Vec<LabelScore>,
) -> Result<PipelineOutput> {
    if input.is_structured() && top_k == Some(1) {
        let best = ranked
            .into_iter()
            .next()
            .ok_or_else(|| Error::pipeline("Classifier produced no scores"))?;
        return match serde_json::to_value(best)? {
            serde_json::Value::Object(map) => Ok(PipelineOutput::Mapping(map)),
            _ => Err(Error::internal("Label score did not serialize to an object")),
        };
    }

    Ok(PipelineOutput::Other(serde_json::to_value(ranked)?))
}
