//! Grounded answer generation with a tagged outcome.

use std::time::{Duration, Instant};

use quire_llm::provider::Usage;
use quire_llm::{LlmError, LlmProvider};
use quire_memory::RetrievedChunk;
use serde::Serialize;

use crate::citation::{Citation, extract_citations, verify_citations};
use crate::prompt::build_messages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Retrieval returned nothing.
    NoContext,
    /// The confidence gate refused before generation.
    LowConfidence,
    /// The model answered with the fallback message.
    ModelDeclined,
    /// The model answered without any verifiable citation.
    MissingCitation,
    /// The model cited a source or page that was not retrieved.
    UnverifiedCitation,
}

impl FallbackReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoContext => "no_context",
            Self::LowConfidence => "low_confidence",
            Self::ModelDeclined => "model_declined",
            Self::MissingCitation => "missing_citation",
            Self::UnverifiedCitation => "unverified_citation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answer {
        text: String,
        citations: Vec<Citation>,
    },
    Fallback {
        reason: FallbackReason,
    },
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub outcome: Outcome,
    pub model: String,
    pub usage: Usage,
    pub latency_ms: u64,
}

impl Generation {
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self.outcome, Outcome::Fallback { .. })
    }

    #[must_use]
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self.outcome {
            Outcome::Fallback { reason } => Some(reason),
            Outcome::Answer { .. } => None,
        }
    }

    #[must_use]
    pub fn citations(&self) -> &[Citation] {
        match &self.outcome {
            Outcome::Answer { citations, .. } => citations,
            Outcome::Fallback { .. } => &[],
        }
    }

    /// Text shown to the reader: the answer, or `fallback` verbatim.
    #[must_use]
    pub fn answer<'a>(&'a self, fallback: &'a str) -> &'a str {
        match &self.outcome {
            Outcome::Answer { text, .. } => text,
            Outcome::Fallback { .. } => fallback,
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether the model output is the fallback message, tolerating quoting,
/// case and whitespace drift.
fn is_decline(output: &str, fallback: &str) -> bool {
    let output = normalize(output);
    let fallback = normalize(fallback);
    let fallback = fallback.trim_end_matches('.');
    output.trim_end_matches('.') == fallback || output.starts_with(fallback)
}

pub struct Generator<P> {
    provider: P,
    fallback: String,
    timeout: Duration,
}

impl<P: LlmProvider> Generator<P> {
    #[must_use]
    pub fn new(provider: P, fallback: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            fallback: fallback.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn fallback_message(&self) -> &str {
        &self.fallback
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// A fallback decided without calling the model.
    #[must_use]
    pub fn decline(&self, reason: FallbackReason) -> Generation {
        Generation {
            outcome: Outcome::Fallback { reason },
            model: self.provider.model().to_owned(),
            usage: Usage::default(),
            latency_ms: 0,
        }
    }

    /// Answer `question` from `chunks` only.
    ///
    /// With no chunks the fallback is returned without a model call.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails or exceeds the configured timeout.
    /// A failed call is never turned into a fallback.
    pub async fn generate(
        &self,
        question: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<Generation, LlmError> {
        if chunks.is_empty() {
            tracing::debug!("no context retrieved, skipping model call");
            return Ok(self.decline(FallbackReason::NoContext));
        }

        let messages = build_messages(question, chunks, &self.fallback);
        let start = Instant::now();
        let completion = match tokio::time::timeout(self.timeout, self.provider.chat(&messages))
            .await
        {
            Ok(Ok(completion)) => completion,
            Ok(Err(e)) => {
                tracing::error!(provider = self.provider.name(), "generation failed: {e}");
                return Err(e);
            }
            Err(_) => {
                tracing::error!(
                    provider = self.provider.name(),
                    seconds = self.timeout.as_secs(),
                    "generation timed out"
                );
                return Err(LlmError::Timeout {
                    provider: self.provider.name(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = self.classify(&completion.text, chunks);
        if let Outcome::Fallback { reason } = &outcome {
            tracing::info!(reason = reason.as_str(), "answer replaced by fallback");
        }
        tracing::debug!(
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            latency_ms,
            "generation complete"
        );

        Ok(Generation {
            outcome,
            model: completion.model,
            usage: completion.usage,
            latency_ms,
        })
    }

    fn classify(&self, text: &str, chunks: &[RetrievedChunk]) -> Outcome {
        let check = verify_citations(&extract_citations(text), chunks);
        if is_decline(text, &self.fallback) && check.verified.is_empty() {
            return Outcome::Fallback {
                reason: FallbackReason::ModelDeclined,
            };
        }
        if !check.unverified.is_empty() {
            tracing::warn!(
                cited = ?check.unverified,
                "answer cites sources that were not retrieved"
            );
            return Outcome::Fallback {
                reason: FallbackReason::UnverifiedCitation,
            };
        }
        if check.verified.is_empty() {
            return Outcome::Fallback {
                reason: FallbackReason::MissingCitation,
            };
        }
        Outcome::Answer {
            text: text.trim().to_owned(),
            citations: check.verified,
        }
    }
}
