#[cfg(feature = "candle")]
use crate::candle_provider::CandleEmbedder;
use crate::claude::ClaudeProvider;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;

use crate::provider::{ChatCompletion, LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::Claude($p) => $expr,
            #[cfg(feature = "candle")]
            AnyProvider::Candle($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    Claude(ClaudeProvider),
    #[cfg(feature = "candle")]
    Candle(CandleEmbedder),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    /// Return a cloneable closure that calls `embed()` on this provider.
    pub fn embed_fn(&self) -> impl Fn(&str) -> crate::provider::EmbedFuture + Send + Sync {
        let provider = std::sync::Arc::new(self.clone());
        move |text: &str| -> crate::provider::EmbedFuture {
            let p = std::sync::Arc::clone(&provider);
            let owned = text.to_owned();
            Box::pin(async move { p.embed(&owned).await })
        }
    }
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<ChatCompletion, crate::LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| p.name())
    }

    fn model(&self) -> &str {
        delegate_provider!(self, |p| p.model())
    }
}
