//! Local sentence-embedding backend running on candle.

pub mod embed;

pub use candle_core::Device;

use crate::error::LlmError;
use crate::provider::{ChatCompletion, LlmProvider, Message};

use self::embed::EmbedModel;

const PROVIDER: &str = "candle";

#[derive(Clone, Debug)]
pub struct CandleEmbedder {
    model: std::sync::Arc<EmbedModel>,
    repo_id: String,
    device: Device,
}

impl CandleEmbedder {
    /// Download (or reuse the cached copy of) `repo_id` and load it on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model files cannot be fetched or loaded.
    pub fn new(repo_id: &str, device: Device) -> Result<Self, LlmError> {
        let model = EmbedModel::load(repo_id, &device)?;
        Ok(Self {
            model: std::sync::Arc::new(model),
            repo_id: repo_id.to_owned(),
            device,
        })
    }

    #[must_use]
    pub fn device_name(&self) -> &'static str {
        match &self.device {
            Device::Cpu => "cpu",
            Device::Cuda(_) => "cuda",
            Device::Metal(_) => "metal",
        }
    }
}

/// Pick the accelerator enabled at compile time, falling back to CPU.
#[must_use]
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        return device;
    }
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        return device;
    }
    Device::Cpu
}

impl LlmProvider for CandleEmbedder {
    async fn chat(&self, _messages: &[Message]) -> Result<ChatCompletion, LlmError> {
        Err(LlmError::ChatUnsupported { provider: PROVIDER })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self.model.clone();
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| LlmError::Inference(format!("candle embedding task failed: {e}")))?
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.repo_id
    }
}
