use std::time::Duration;

use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::error::LlmError;
use crate::provider::{ChatCompletion, LlmProvider, Message, Role, Usage};

const PROVIDER: &str = "ollama";

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    embedding_model: String,
    timeout: Duration,
    max_tokens: Option<u32>,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String, timeout_secs: u64) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
            timeout: Duration::from_secs(timeout_secs),
            max_tokens: None,
        }
    }

    /// Cap generated tokens per chat reply (`num_predict`).
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Check that the Ollama server answers a model listing request.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client
            .list_local_models()
            .await
            .map_err(|e| LlmError::Other(format!("Ollama health check failed: {e}")))?;
        Ok(())
    }

    fn timeout_error(&self) -> LlmError {
        LlmError::Timeout {
            provider: PROVIDER,
            seconds: self.timeout.as_secs(),
        }
    }
}

impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message]) -> Result<ChatCompletion, LlmError> {
        let ollama_messages: Vec<ChatMessage> = messages.iter().map(convert_message).collect();
        let mut request = ChatMessageRequest::new(self.model.clone(), ollama_messages);
        if let Some(max_tokens) = self.max_tokens {
            let limit = i32::try_from(max_tokens).unwrap_or(i32::MAX);
            request = request.options(ModelOptions::default().num_predict(limit));
        }

        let response = tokio::time::timeout(self.timeout, self.client.send_chat_messages(request))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| LlmError::Other(format!("Ollama chat request failed: {e}")))?;

        let usage = response
            .final_data
            .as_ref()
            .map_or_else(Usage::default, |data| Usage {
                input_tokens: u64::from(data.prompt_eval_count),
                output_tokens: u64::from(data.eval_count),
            });

        if response.message.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }

        Ok(ChatCompletion {
            text: response.message.content,
            model: self.model.clone(),
            usage,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::from(text),
        );

        let response = tokio::time::timeout(self.timeout, self.client.generate_embeddings(request))
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(|e| LlmError::Other(format!("Ollama embedding request failed: {e}")))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn convert_message(msg: &Message) -> ChatMessage {
    let text = msg.content.clone();
    match msg.role {
        Role::System => ChatMessage::system(text),
        Role::Assistant => ChatMessage::assistant(text),
        Role::User => ChatMessage::user(text),
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::test_server::{http_response, spawn};

    fn provider() -> OllamaProvider {
        OllamaProvider::new("http://localhost:11434", "llama3".into(), "all-minilm".into(), 30)
    }

    #[test]
    fn parse_host_port_with_port() {
        let (host, port) = parse_host_port("http://localhost:11434");
        assert_eq!(host, "http://localhost");
        assert_eq!(port, 11434);
    }

    #[test]
    fn parse_host_port_without_port_uses_default() {
        let (host, port) = parse_host_port("http://ollama.internal/");
        assert_eq!(host, "http://ollama.internal");
        assert_eq!(port, 11434);
    }

    #[test]
    fn parse_host_port_custom_port() {
        let (host, port) = parse_host_port("http://10.0.0.5:9000");
        assert_eq!(host, "http://10.0.0.5");
        assert_eq!(port, 9000);
    }

    #[test]
    fn convert_message_roles() {
        let system = convert_message(&Message::system("rules"));
        assert_eq!(system.content, "rules");
        let user = convert_message(&Message::user("question"));
        assert_eq!(user.content, "question");
    }

    #[test]
    fn reports_models_and_capabilities() {
        let p = provider();
        assert_eq!(p.name(), "ollama");
        assert_eq!(p.model(), "llama3");
        assert_eq!(p.embedding_model(), "all-minilm");
        assert!(p.supports_embeddings());
    }

    #[test]
    fn timeout_error_carries_configured_seconds() {
        let err = provider().timeout_error();
        assert!(matches!(
            err,
            LlmError::Timeout {
                provider: "ollama",
                seconds: 30
            }
        ));
    }

    #[tokio::test]
    async fn chat_request_carries_output_token_limit() {
        let body = r#"{"model":"llama3","created_at":"2026-01-01T00:00:00Z","message":{"role":"assistant","content":"An answer [Report, p.2]"},"done":true,"total_duration":1,"load_duration":1,"prompt_eval_count":7,"prompt_eval_duration":1,"eval_count":3,"eval_duration":1}"#;
        let (port, requests, _handle) = spawn(vec![http_response("200 OK", body)]).await;
        let provider = OllamaProvider::new(
            &format!("http://127.0.0.1:{port}"),
            "llama3".into(),
            "all-minilm".into(),
            5,
        )
        .with_max_tokens(256);

        let _ = provider.chat(&[Message::user("question")]).await;

        let recorded = requests.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&recorded[0]).unwrap();
        assert_eq!(sent["model"], "llama3");
        assert_eq!(sent["options"]["num_predict"], 256);
    }

    #[tokio::test]
    async fn chat_request_without_limit_sends_no_options() {
        let body = r#"{"model":"llama3","created_at":"2026-01-01T00:00:00Z","message":{"role":"assistant","content":"ok"},"done":true}"#;
        let (port, requests, _handle) = spawn(vec![http_response("200 OK", body)]).await;
        let provider = OllamaProvider::new(
            &format!("http://127.0.0.1:{port}"),
            "llama3".into(),
            "all-minilm".into(),
            5,
        );

        let _ = provider.chat(&[Message::user("question")]).await;

        let recorded = requests.lock().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&recorded[0]).unwrap();
        assert!(sent.get("options").is_none_or(|o| o.get("num_predict").is_none()));
    }
}
