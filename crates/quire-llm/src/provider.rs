use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub type EmbedFuture = Pin<Box<dyn Future<Output = Result<Vec<f32>, LlmError>> + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Token accounting reported by the provider for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Clone, Debug)]
pub struct ChatCompletion {
    pub text: String,
    pub model: String,
    pub usage: Usage,
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the model and return the assistant text with token usage.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<ChatCompletion, LlmError>> + Send;

    /// Embed a single text into a dense vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support embeddings or the request fails.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &'static str;

    /// Identifier of the model used for `chat`.
    fn model(&self) -> &str;
}
