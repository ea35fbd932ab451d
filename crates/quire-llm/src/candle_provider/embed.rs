use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};

use crate::error::LlmError;

/// Longest token sequence passed to the encoder; longer chunks are truncated.
pub const MAX_SEQUENCE_TOKENS: usize = 256;

#[derive(Clone)]
pub struct EmbedModel {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
}

impl std::fmt::Debug for EmbedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedModel")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

fn fetch(repo: &hf_hub::api::sync::ApiRepo, repo_id: &str, file: &str) -> Result<std::path::PathBuf, LlmError> {
    repo.get(file).map_err(|e| {
        LlmError::ModelLoad(format!("failed to download {file} from {repo_id}: {e}"))
    })
}

impl EmbedModel {
    /// Load a BERT sentence encoder from `HuggingFace` Hub.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn load(repo_id: &str, device: &Device) -> Result<Self, LlmError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            LlmError::ModelLoad(format!("failed to create HuggingFace API client: {e}"))
        })?;
        let repo = api.model(repo_id.to_owned());

        let config_path = fetch(&repo, repo_id, "config.json")?;
        let tokenizer_path = fetch(&repo, repo_id, "tokenizer.json")?;
        let weights_path = fetch(&repo, repo_id, "model.safetensors")?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read BERT config: {e}")))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(|e| LlmError::ModelLoad(format!("failed to configure truncation: {e}")))?;

        // SAFETY: file is a valid safetensors downloaded from hf-hub, not modified during
        // VarBuilder lifetime
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? };

        let model = BertModel::load(vb, &config)?;
        tracing::info!(repo = repo_id, "loaded embedding model");

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device: device.clone(),
        })
    }

    /// Encode `text` into a mean-pooled, L2-normalised vector.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the model forward pass fails.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(token_type_ids.as_slice(), &self.device)?.unsqueeze(0)?;

        let embeddings = self.model.forward(&input_ids, &token_type_ids, None)?;

        let seq_len = embeddings.dim(1)?;
        let sum = embeddings.sum(1)?;
        let mean_pooled = (sum
            / f64::from(
                u32::try_from(seq_len)
                    .map_err(|e| LlmError::Inference(format!("sequence length overflow: {e}")))?,
            ))?;

        let norm = mean_pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = mean_pooled.broadcast_div(&norm)?.squeeze(0)?;

        normalized.to_vec1::<f32>().map_err(LlmError::Candle)
    }
}
