//! Model file resolution and loading helpers for Candle pipelines

use crate::args::{DeviceType, ModelSource, PipelineArgs};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use pipeserve_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::{Encoding, Tokenizer};

const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";
const VOCAB_FILE: &str = "vocab.txt";

/// Map a Candle error into a pipeline error with context
pub(crate) fn candle_err(context: &'static str) -> impl Fn(candle_core::Error) -> Error {
    move |e| Error::pipeline(format!("{}: {}", context, e))
}

/// Files that make up a transformer checkpoint
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// Directory containing the checkpoint
    pub dir: PathBuf,
    pub config: PathBuf,
    pub weights: PathBuf,
    /// tokenizer.json, if present
    pub tokenizer: Option<PathBuf>,
    /// WordPiece vocabulary, used when tokenizer.json is absent
    pub vocab: Option<PathBuf>,
}

/// The fields of config.json needed before picking an architecture
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelHeader {
    #[serde(default)]
    pub model_type: String,

    #[serde(default)]
    pub id2label: Option<HashMap<String, String>>,

    #[serde(default)]
    pub problem_type: Option<String>,

    #[serde(default)]
    pub num_labels: Option<usize>,

    #[serde(default, alias = "dim")]
    pub hidden_size: Option<usize>,
}

impl ModelHeader {
    /// Labels ordered by id, if the config declares them
    pub fn ordered_labels(&self) -> Option<Vec<String>> {
        let id2label = self.id2label.as_ref()?;
        let mut entries: Vec<(usize, &String)> = id2label
            .iter()
            .filter_map(|(id, label)| id.parse::<usize>().ok().map(|id| (id, label)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        Some(entries.into_iter().map(|(_, label)| label.clone()).collect())
    }

    /// Size of the classification head
    ///
    /// Explicit labels win, then id2label, then the declared count, then 2.
    pub fn label_count(&self, explicit: Option<&[String]>) -> usize {
        explicit
            .map(<[String]>::len)
            .or_else(|| self.id2label.as_ref().map(HashMap::len))
            .or(self.num_labels)
            .unwrap_or(2)
    }

    pub fn is_multi_label(&self) -> bool {
        self.problem_type.as_deref() == Some("multi_label_classification")
    }
}

/// Locate the checkpoint files, downloading from the Hub if needed
pub fn resolve_model_files(args: &PipelineArgs) -> Result<ModelFiles> {
    match args.model_source() {
        ModelSource::Local { path } => local_model_files(&path),
        ModelSource::HuggingFace { repo, revision } => {
            download_from_huggingface(&repo, &revision, args.cache_dir.as_deref())
        }
        ModelSource::Builtin { implementation } => Err(Error::config(format!(
            "Builtin implementation '{}' has no model files",
            implementation
        ))),
    }
}

/// Collect checkpoint files from a local directory
pub fn local_model_files(dir: &Path) -> Result<ModelFiles> {
    if !dir.is_dir() {
        return Err(Error::config(format!(
            "Model path does not exist or is not a directory: {}",
            dir.display()
        )));
    }

    let config = dir.join(CONFIG_FILE);
    if !config.exists() {
        return Err(Error::config(format!(
            "{} not found in {}",
            CONFIG_FILE,
            dir.display()
        )));
    }

    let weights = dir.join(WEIGHTS_FILE);
    if !weights.exists() {
        return Err(Error::config(format!(
            "{} not found in {}",
            WEIGHTS_FILE,
            dir.display()
        )));
    }

    let tokenizer = Some(dir.join(TOKENIZER_FILE)).filter(|p| p.exists());
    let vocab = Some(dir.join(VOCAB_FILE)).filter(|p| p.exists());

    Ok(ModelFiles {
        dir: dir.to_path_buf(),
        config,
        weights,
        tokenizer,
        vocab,
    })
}

/// Download model files from HuggingFace Hub
fn download_from_huggingface(
    repo: &str,
    revision: &str,
    cache_dir: Option<&Path>,
) -> Result<ModelFiles> {
    tracing::info!("Fetching model from HuggingFace: {} @ {}", repo, revision);

    let mut builder = ApiBuilder::new().with_progress(false);
    if let Some(cache_dir) = cache_dir {
        builder = builder.with_cache_dir(cache_dir.to_path_buf());
    }

    let api = builder.build().map_err(|e| {
        Error::config(format!("Failed to initialize HuggingFace API: {}", e))
    })?;

    let repo_obj = api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config = repo_obj.get(CONFIG_FILE).map_err(|e| {
        Error::config(format!("Failed to download {} from {}: {}", CONFIG_FILE, repo, e))
    })?;

    let weights = repo_obj.get(WEIGHTS_FILE).map_err(|e| {
        Error::config(format!("Failed to download {} from {}: {}", WEIGHTS_FILE, repo, e))
    })?;

    let tokenizer = match repo_obj.get(TOKENIZER_FILE) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!("{} not available: {}", TOKENIZER_FILE, e);
            None
        }
    };

    let vocab = if tokenizer.is_none() {
        repo_obj.get(VOCAB_FILE).ok()
    } else {
        None
    };

    let dir = config
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::internal("Invalid HuggingFace cache path"))?;

    tracing::info!("Model available at: {}", dir.display());

    Ok(ModelFiles {
        dir,
        config,
        weights,
        tokenizer,
        vocab,
    })
}

/// Create Candle device from device type
pub fn create_device(device_type: DeviceType) -> Result<Device> {
    match device_type {
        DeviceType::Cpu => Ok(Device::Cpu),
        DeviceType::Cuda(idx) => Device::new_cuda(idx)
            .map_err(|e| Error::config(format!("Failed to create CUDA device {}: {}", idx, e))),
        DeviceType::Metal(idx) => Device::new_metal(idx)
            .map_err(|e| Error::config(format!("Failed to create Metal device {}: {}", idx, e))),
    }
}

/// Read and deserialize a JSON config file
pub fn parse_json_config<T: DeserializeOwned>(config_path: &Path) -> Result<T> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        Error::config(format!("Failed to read config {}: {}", config_path.display(), e))
    })?;

    serde_json::from_str(&config_str).map_err(|e| {
        Error::config(format!("Failed to parse config {}: {}", config_path.display(), e))
    })
}

/// Load the tokenizer, preferring an explicit override
pub fn load_tokenizer(files: &ModelFiles, override_path: Option<&Path>) -> Result<Tokenizer> {
    if let Some(path) = override_path.or(files.tokenizer.as_deref()) {
        tracing::debug!("Loading tokenizer from {}", path.display());
        return Tokenizer::from_file(path).map_err(|e| {
            Error::config(format!("Failed to load tokenizer {}: {}", path.display(), e))
        });
    }

    if let Some(vocab_path) = &files.vocab {
        tracing::debug!("Building WordPiece tokenizer from {}", vocab_path.display());
        return wordpiece_tokenizer(vocab_path);
    }

    Err(Error::config(format!(
        "No tokenizer found in {} (tried {}, {})",
        files.dir.display(),
        TOKENIZER_FILE,
        VOCAB_FILE
    )))
}

fn wordpiece_tokenizer(vocab_path: &Path) -> Result<Tokenizer> {
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;

    let wordpiece = WordPiece::from_file(vocab_path.to_string_lossy().as_ref())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| Error::config(format!("Failed to build WordPiece model: {}", e)))?;

    let sep_id = wordpiece_id(&wordpiece, "[SEP]")?;
    let cls_id = wordpiece_id(&wordpiece, "[CLS]")?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_post_processor(Some(BertProcessing::new(
        ("[SEP]".to_string(), sep_id),
        ("[CLS]".to_string(), cls_id),
    )));

    Ok(tokenizer)
}

fn wordpiece_id(wordpiece: &tokenizers::models::wordpiece::WordPiece, token: &str) -> Result<u32> {
    use tokenizers::Model;

    wordpiece
        .token_to_id(token)
        .ok_or_else(|| Error::config(format!("Vocabulary has no {} token", token)))
}

/// Copy of `tokenizer` that truncates to `max_length` tokens, special tokens included
pub fn truncating_tokenizer(tokenizer: &Tokenizer, max_length: usize) -> Result<Tokenizer> {
    use tokenizers::{PostProcessor, TruncationParams};

    let special = tokenizer
        .get_post_processor()
        .map_or(0, |processor| processor.added_tokens(true));
    if max_length <= special {
        return Err(Error::config(format!(
            "max_length {} leaves no room for input next to {} special tokens",
            max_length, special
        )));
    }

    let mut tokenizer = tokenizer.clone();
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::config(format!("Failed to configure truncation: {}", e)))?;
    Ok(tokenizer)
}

/// Encode a text or text pair, honoring a per-call `max_length`
///
/// `tokenizer` already truncates to `configured`; other lengths use a
/// reconfigured copy.
pub(crate) fn encode_input(
    tokenizer: &Tokenizer,
    configured: usize,
    max_length: usize,
    text: &str,
    pair: Option<&str>,
) -> Result<Encoding> {
    let custom;
    let tokenizer = if max_length == configured {
        tokenizer
    } else {
        custom = truncating_tokenizer(tokenizer, max_length)
            .map_err(|e| Error::invalid_input(e.to_string()))?;
        &custom
    };

    let encoded = match pair {
        Some(pair) => tokenizer.encode((text, pair), true),
        None => tokenizer.encode(text, true),
    };
    encoded.map_err(|e| Error::pipeline(format!("Tokenization failed: {}", e)))
}

/// Memory-map the safetensors weights
pub fn load_var_builder(weights: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    // SAFETY: the weights file is not modified while the process holds the map.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights.to_path_buf()], DType::F32, device)
            .map_err(|e| Error::config(format!("Failed to load weights: {}", e)))?
    };

    Ok(vb)
}

/// Label names for a classification head
///
/// Explicit labels win, then the config's id2label, then generic names.
pub fn resolve_labels(
    num_labels: usize,
    explicit: Option<&[String]>,
    header: &ModelHeader,
) -> Vec<String> {
    let mut resolved = explicit
        .map(<[String]>::to_vec)
        .or_else(|| header.ordered_labels())
        .unwrap_or_default();

    if resolved.is_empty() && num_labels == 2 {
        resolved = vec!["NEGATIVE".to_string(), "POSITIVE".to_string()];
    }

    for idx in resolved.len()..num_labels {
        resolved.push(format!("LABEL_{}", idx));
    }
    resolved.truncate(num_labels.max(1));
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Task;
    use std::fs;

    fn header(json: &str) -> ModelHeader {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_ordered_labels_sorted_by_id() {
        let h = header(r#"{"model_type": "bert", "id2label": {"1": "POSITIVE", "0": "NEGATIVE"}}"#);
        assert_eq!(
            h.ordered_labels().unwrap(),
            vec!["NEGATIVE".to_string(), "POSITIVE".to_string()]
        );
        assert!(!h.is_multi_label());
    }

    #[test]
    fn test_label_count() {
        let h = header(r#"{"id2label": {"0": "a", "1": "b", "2": "c"}, "num_labels": 7}"#);
        assert_eq!(h.label_count(None), 3);

        let explicit = vec!["x".to_string()];
        assert_eq!(h.label_count(Some(&explicit)), 1);
        assert_eq!(header(r#"{"num_labels": 5}"#).label_count(None), 5);
        assert_eq!(ModelHeader::default().label_count(None), 2);
    }

    #[test]
    fn test_hidden_size_alias() {
        let h = header(r#"{"model_type": "distilbert", "dim": 768}"#);
        assert_eq!(h.hidden_size, Some(768));
    }

    #[test]
    fn test_resolve_labels_precedence() {
        let h = header(r#"{"id2label": {"0": "neg", "1": "pos"}}"#);

        let explicit = vec!["bad".to_string(), "good".to_string()];
        assert_eq!(resolve_labels(2, Some(&explicit), &h), explicit);
        assert_eq!(resolve_labels(2, None, &h), vec!["neg", "pos"]);
        assert_eq!(
            resolve_labels(2, None, &ModelHeader::default()),
            vec!["NEGATIVE", "POSITIVE"]
        );
        assert_eq!(
            resolve_labels(3, None, &ModelHeader::default()),
            vec!["LABEL_0", "LABEL_1", "LABEL_2"]
        );
    }

    #[test]
    fn test_resolve_labels_pads_short_list() {
        let explicit = vec!["toxic".to_string()];
        assert_eq!(
            resolve_labels(3, Some(&explicit), &ModelHeader::default()),
            vec!["toxic", "LABEL_1", "LABEL_2"]
        );
    }

    #[test]
    fn test_local_model_files_missing_dir() {
        let err = local_model_files(Path::new("./definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_local_model_files_requires_weights() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();

        let err = local_model_files(dir.path()).unwrap_err();
        assert!(err.to_string().contains(WEIGHTS_FILE));
    }

    #[test]
    fn test_local_model_files_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        fs::write(dir.path().join(WEIGHTS_FILE), b"").unwrap();
        fs::write(dir.path().join(VOCAB_FILE), "[PAD]\n").unwrap();

        let files = local_model_files(dir.path()).unwrap();
        assert!(files.tokenizer.is_none());
        assert!(files.vocab.is_some());
    }

    #[test]
    fn test_builtin_has_no_files() {
        let args = PipelineArgs::new(Task::TextClassification).with_model("builtin:lexicon");
        assert!(resolve_model_files(&args).is_err());
    }

    #[test]
    fn test_tokenizer_missing() {
        let dir = tempfile::tempdir().unwrap();
        let files = ModelFiles {
            dir: dir.path().to_path_buf(),
            config: dir.path().join(CONFIG_FILE),
            weights: dir.path().join(WEIGHTS_FILE),
            tokenizer: None,
            vocab: None,
        };
        assert!(load_tokenizer(&files, None).is_err());
    }

    #[test]
    fn test_wordpiece_from_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let vocab = dir.path().join(VOCAB_FILE);
        fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\nworld\n").unwrap();

        let files = ModelFiles {
            dir: dir.path().to_path_buf(),
            config: dir.path().join(CONFIG_FILE),
            weights: dir.path().join(WEIGHTS_FILE),
            tokenizer: None,
            vocab: Some(vocab),
        };

        let tokenizer = load_tokenizer(&files, None).unwrap();
        let encoding = tokenizer.encode("hello world", true).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 4, 5, 3]);
    }

    fn vocab_tokenizer(dir: &Path) -> Tokenizer {
        let vocab = dir.join(VOCAB_FILE);
        fs::write(&vocab, "[PAD]\n[UNK]\n[CLS]\n[SEP]\nhello\nworld\n").unwrap();
        let files = ModelFiles {
            dir: dir.to_path_buf(),
            config: dir.join(CONFIG_FILE),
            weights: dir.join(WEIGHTS_FILE),
            tokenizer: None,
            vocab: Some(vocab),
        };
        load_tokenizer(&files, None).unwrap()
    }

    #[test]
    fn test_truncation_keeps_special_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = truncating_tokenizer(&vocab_tokenizer(dir.path()), 4).unwrap();

        let encoding = encode_input(&tokenizer, 4, 4, "hello world hello world", None).unwrap();
        assert_eq!(encoding.get_ids(), &[2, 4, 5, 3]);

        let longer = encode_input(&tokenizer, 4, 5, "hello world hello world", None).unwrap();
        assert_eq!(longer.get_ids(), &[2, 4, 5, 4, 3]);
    }

    #[test]
    fn test_truncation_needs_room_for_input() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = vocab_tokenizer(dir.path());

        assert!(matches!(truncating_tokenizer(&tokenizer, 3), Err(Error::Config(_))));
        let err = encode_input(&tokenizer, 512, 3, "hello", Some("world")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_parse_json_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "not json").unwrap();
        assert!(parse_json_config::<ModelHeader>(&path).is_err());
    }
}
