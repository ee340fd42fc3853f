//! Lexicon-based sentiment pipeline
//!
//! In-process fallback selected with `model: builtin:lexicon`. Needs no
//! weights or network access.

use crate::args::Task;
use crate::pipeline::{parse_call_args, text_and_pair, Pipeline};
use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use pipeserve_core::{Error, InferenceInput, Mapping, PipelineOutput, Result};
use serde::{Deserialize, Serialize};

pub const LEXICON_IMPLEMENTATION: &str = "lexicon";

const POSITIVE_WORDS: &[&str] = &[
    "good",
    "great",
    "excellent",
    "love",
    "amazing",
    "wonderful",
    "happy",
    "fantastic",
    "awesome",
    "best",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "hate",
    "horrible",
    "worst",
    "sad",
    "angry",
    "disappointed",
    "poor",
];

/// Result record of the lexicon classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
    pub model: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LexiconArgs {}

pub struct LexiconSentimentPipeline {
    name: String,
    negative_label: String,
    positive_label: String,
    positive: AhoCorasick,
    negative: AhoCorasick,
}

impl LexiconSentimentPipeline {
    pub fn new() -> Result<Self> {
        Self::with_labels(None)
    }

    /// Build with optional `[negative, positive]` label names
    pub fn with_labels(labels: Option<&[String]>) -> Result<Self> {
        let (negative_label, positive_label) = match labels {
            None => ("NEGATIVE".to_string(), "POSITIVE".to_string()),
            Some([negative, positive]) => (negative.clone(), positive.clone()),
            Some(other) => {
                return Err(Error::config(format!(
                    "lexicon sentiment takes exactly two labels, got {}",
                    other.len()
                )))
            }
        };

        let positive = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(POSITIVE_WORDS)
            .map_err(|e| {
                Error::config(format!("Failed to build positive sentiment matcher: {e}"))
            })?;

        let negative = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(NEGATIVE_WORDS)
            .map_err(|e| {
                Error::config(format!("Failed to build negative sentiment matcher: {e}"))
            })?;

        Ok(Self {
            name: format!("builtin:{}", LEXICON_IMPLEMENTATION),
            negative_label,
            positive_label,
            positive,
            negative,
        })
    }

    /// Classify text by counting lexicon hits
    pub fn classify(&self, text: &str) -> Classification {
        let positive_hits = self.positive.find_iter(text).count() as f32;
        let negative_hits = self.negative.find_iter(text).count() as f32;
        let total = positive_hits + negative_hits;

        let positive_share = if total == 0.0 {
            0.5
        } else {
            positive_hits / total
        };

        let (label, score) = if positive_share >= 0.5 {
            (&self.positive_label, positive_share)
        } else {
            (&self.negative_label, 1.0 - positive_share)
        };

        Classification {
            label: label.clone(),
            score,
            model: self.name.clone(),
        }
    }
}

#[async_trait]
impl Pipeline for LexiconSentimentPipeline {
    async fn run(&self, input: &InferenceInput, args: &Mapping) -> Result<PipelineOutput> {
        let _: LexiconArgs = parse_call_args(args)?;
        let (text, pair) = text_and_pair(input)?;

        let classification = match pair {
            Some(pair) => self.classify(&format!("{} {}", text, pair)),
            None => self.classify(text),
        };

        PipelineOutput::record(&classification)
    }

    fn task(&self) -> Task {
        Task::TextClassification
    }

    fn name(&self) -> &str {
        &self.name
    }
}
