use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::build_client;
use crate::provider::{ChatCompletion, LlmProvider, Message, Role, Usage};
use crate::retry::send_with_retry;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RETRIES: u32 = 3;
const PROVIDER: &str = "claude";

#[derive(Clone)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    url: String,
    timeout_secs: u64,
}

impl fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClaudeProvider {
    /// Create a provider talking to the public Messages API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        Self::with_url(api_key, model, max_tokens, timeout_secs, API_URL.to_owned())
    }

    /// Same as [`ClaudeProvider::new`] but posting to `url` instead of the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_url(
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout_secs: u64,
        url: String,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client(Duration::from_secs(timeout_secs))?,
            api_key,
            model,
            max_tokens,
            url,
            timeout_secs,
        })
    }

    fn build_request(&self, body: &RequestBody<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }

    fn map_transport(&self, err: LlmError) -> LlmError {
        match err {
            LlmError::Http(e) if e.is_timeout() => LlmError::Timeout {
                provider: PROVIDER,
                seconds: self.timeout_secs,
            },
            other => other,
        }
    }

    async fn send_request(&self, messages: &[Message]) -> Result<ChatCompletion, LlmError> {
        let (system, chat_messages) = split_messages(messages);
        let body = RequestBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: &chat_messages,
        };

        let response = send_with_retry(PROVIDER, MAX_RETRIES, || {
            self.build_request(&body).send()
        })
        .await
        .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport(LlmError::Http(e)))?;

        if !status.is_success() {
            tracing::error!("Claude API error {status}: {text}");
            return Err(LlmError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let resp: ApiResponse = serde_json::from_str(&text)?;
        let answer: String = resp
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if answer.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });
        tracing::debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "claude usage"
        );

        Ok(ChatCompletion {
            text: answer,
            model: resp.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }
}

impl LlmProvider for ClaudeProvider {
    async fn chat(&self, messages: &[Message]) -> Result<ChatCompletion, LlmError> {
        self.send_request(messages).await
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::EmbedUnsupported { provider: PROVIDER })
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn split_messages(messages: &[Message]) -> (Option<String>, Vec<ApiMessage<'_>>) {
    let mut system_parts = Vec::new();
    let mut chat = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.as_str()),
            Role::User => chat.push(ApiMessage {
                role: "user",
                content: &msg.content,
            }),
            Role::Assistant => chat.push(ApiMessage {
                role: "assistant",
                content: &msg.content,
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, chat)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: &'a [ApiMessage<'a>],
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::test_server::{http_response, spawn};

    fn provider_at(port: u16) -> ClaudeProvider {
        ClaudeProvider::with_url(
            "test-key".into(),
            "claude-haiku-4-5-20251001".into(),
            256,
            5,
            format!("http://127.0.0.1:{port}/v1/messages"),
        )
        .unwrap()
    }

    #[test]
    fn split_messages_extracts_system() {
        let messages = vec![
            Message::system("rules"),
            Message::user("question"),
            Message::system("more rules"),
        ];
        let (system, chat) = split_messages(&messages);
        assert_eq!(system.as_deref(), Some("rules\n\nmore rules"));
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].role, "user");
        assert_eq!(chat[0].content, "question");
    }

    #[test]
    fn split_messages_without_system() {
        let messages = vec![Message::user("hi")];
        let (system, chat) = split_messages(&messages);
        assert!(system.is_none());
        assert_eq!(chat.len(), 1);
    }

    #[test]
    fn request_body_omits_absent_system() {
        let body = RequestBody {
            model: "m",
            max_tokens: 10,
            system: None,
            messages: &[],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn debug_redacts_api_key() {
        let provider = provider_at(1);
        let debug = format!("{provider:?}");
        assert!(!debug.contains("test-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn api_error_message_prefers_structured_body() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad model"}}"#;
        assert_eq!(api_error_message(body), "bad model");
        assert_eq!(api_error_message("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn chat_concatenates_text_blocks_and_reports_usage() {
        let body = r#"{"model":"claude-haiku-4-5-20251001","content":[{"type":"text","text":"Hello "},{"type":"text","text":"[Report, p.2]"}],"usage":{"input_tokens":12,"output_tokens":4}}"#;
        let (port, requests, _handle) = spawn(vec![http_response("200 OK", body)]).await;
        let provider = provider_at(port);

        let completion = provider
            .chat(&[Message::system("sys"), Message::user("q")])
            .await
            .unwrap();

        assert_eq!(completion.text, "Hello [Report, p.2]");
        assert_eq!(completion.model, "claude-haiku-4-5-20251001");
        assert_eq!(completion.usage.input_tokens, 12);
        assert_eq!(completion.usage.output_tokens, 4);

        let sent: serde_json::Value =
            serde_json::from_str(&requests.lock().unwrap()[0]).unwrap();
        assert_eq!(sent["system"], "sys");
        assert_eq!(sent["messages"][0]["role"], "user");
        assert_eq!(sent["max_tokens"], 256);
    }

    #[tokio::test]
    async fn chat_maps_error_status_to_api_error() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        let (port, _requests, _handle) =
            spawn(vec![http_response("401 Unauthorized", body)]).await;
        let provider = provider_at(port);

        let err = provider.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(err.is_auth(), "expected auth error, got {err:?}");
        match err {
            LlmError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid x-api-key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_rejects_empty_content() {
        let body = r#"{"content":[],"usage":{"input_tokens":1,"output_tokens":0}}"#;
        let (port, _requests, _handle) = spawn(vec![http_response("200 OK", body)]).await;
        let provider = provider_at(port);

        let err = provider.chat(&[Message::user("q")]).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { provider: "claude" }));
    }

    #[tokio::test]
    async fn embed_is_unsupported() {
        let provider = provider_at(1);
        assert!(!provider.supports_embeddings());
        let err = provider.embed("text").await.unwrap_err();
        assert!(matches!(err, LlmError::EmbedUnsupported { .. }));
    }
}
