//! Test-only mock provider with scripted answers and deterministic embeddings.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{ChatCompletion, LlmProvider, Message, Usage};

pub const MOCK_EMBEDDING_DIM: usize = 64;

/// Failure injected into `chat` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Api { status: u16 },
    Timeout,
    RateLimited,
}

impl MockFailure {
    fn to_error(self) -> LlmError {
        match self {
            Self::Api { status } => LlmError::Api {
                provider: "mock",
                status,
                message: "mock API failure".into(),
            },
            Self::Timeout => LlmError::Timeout {
                provider: "mock",
                seconds: 0,
            },
            Self::RateLimited => LlmError::RateLimited,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    pub default_response: String,
    pub model: String,
    pub usage: Usage,
    pub failure: Option<MockFailure>,
    pub fail_embed: bool,
    /// Fixed vectors returned when the embedded text contains the paired needle.
    pub embedding_overrides: Vec<(String, Vec<f32>)>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            chat_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            model: "mock-model".into(),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
            failure: None,
            fail_embed: false,
            embedding_overrides: Vec::new(),
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    #[must_use]
    pub fn with_embedding_for(mut self, needle: impl Into<String>, vector: Vec<f32>) -> Self {
        self.embedding_overrides.push((needle.into(), vector));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Number of `chat` calls made so far, across all clones.
    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Message lists received by `chat`, oldest first.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// Hashed bag-of-words embedding: texts sharing words have high cosine similarity.
#[must_use]
pub fn hashed_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; MOCK_EMBEDDING_DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.to_lowercase().bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (hash % MOCK_EMBEDDING_DIM as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    } else {
        vector[0] = 1.0;
    }
    vector
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<ChatCompletion, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if let Some(failure) = self.failure {
            return Err(failure.to_error());
        }
        let text = {
            let mut responses = self
                .responses
                .lock()
                .map_err(|e| LlmError::Other(format!("mock lock poisoned: {e}")))?;
            if responses.is_empty() {
                self.default_response.clone()
            } else {
                responses.remove(0)
            }
        };
        Ok(ChatCompletion {
            text,
            model: self.model.clone(),
            usage: self.usage,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding failure".into()));
        }
        if let Some((_, vector)) = self
            .embedding_overrides
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
        {
            return Ok(vector.clone());
        }
        Ok(hashed_embedding(text))
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn scripted_responses_then_default() {
        let mock = MockProvider::with_responses(vec!["first".into()]);
        assert_eq!(mock.chat(&[]).await.unwrap().text, "first");
        assert_eq!(mock.chat(&[]).await.unwrap().text, "mock response");
        assert_eq!(mock.chat_calls(), 2);
    }

    #[tokio::test]
    async fn failure_modes_map_to_errors() {
        let err = MockProvider::failing(MockFailure::Timeout)
            .chat(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));

        let err = MockProvider::failing(MockFailure::Api { status: 401 })
            .chat(&[])
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn clones_share_recorded_requests() {
        let mock = MockProvider::default();
        let clone = mock.clone();
        clone.chat(&[Message::user("hello")]).await.unwrap();
        let recorded = mock.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0][0].content, "hello");
    }

    #[test]
    fn hashed_embedding_is_unit_length_and_deterministic() {
        let a = hashed_embedding("Inflation rose in 2023");
        let b = hashed_embedding("Inflation rose in 2023");
        assert_eq!(a, b);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
        assert_eq!(hashed_embedding("").len(), MOCK_EMBEDDING_DIM);
    }

    #[test]
    fn shared_words_score_higher() {
        let query = hashed_embedding("inflation rate");
        let related = hashed_embedding("the inflation rate in kenya");
        let unrelated = hashed_embedding("ocean tides migrate slowly");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn embedding_override_wins() {
        let mock = MockProvider::default().with_embedding_for("needle", vec![1.0, 0.0]);
        assert_eq!(mock.embed("a needle here").await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(mock.embed("other").await.unwrap().len(), MOCK_EMBEDDING_DIM);
    }
}
