#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("{provider} API request failed (status {status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} request timed out after {seconds}s")]
    Timeout { provider: &'static str, seconds: u64 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: &'static str },

    #[error("chat not supported by {provider}")]
    ChatUnsupported { provider: &'static str },

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure came from credentials the API rejected.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
