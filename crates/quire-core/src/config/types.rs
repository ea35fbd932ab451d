use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::vault::Secret;

pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "The answer cannot be determined from the provided documents.";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus: CorpusConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            index: IndexConfig::default(),
            audit: AuditConfig::default(),
            timeouts: TimeoutConfig::default(),
            fallback_message: default_fallback_message(),
            secrets: ResolvedSecrets::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub dir: PathBuf,
    /// Citation name shared by every tabular source.
    pub csv_source_name: String,
    /// File name to display name.
    pub document_names: HashMap<String, String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("corpus"),
            csv_source_name: "IMF Financial Access Survey".into(),
            document_names: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,
    pub min_row_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
            min_chunk_chars: 80,
            min_row_chars: 40,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub collection: String,
    pub confidence: ConfidenceConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            collection: "corpus".into(),
            confidence: ConfidenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Below this best similarity no answer is attempted.
    pub min_score: f32,
    /// Below this best similarity an answer is flagged as low confidence.
    pub warn_score: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            min_score: 0.65,
            warn_score: 0.70,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Ollama,
    Candle,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// Ollama embedding model name.
    pub model: String,
    pub base_url: String,
    /// `HuggingFace` repository loaded by the candle backend.
    pub candle_repo: String,
}

impl EmbeddingConfig {
    /// Identity of the embedding model; indexes built with another identity are not reused.
    #[must_use]
    pub fn identity(&self) -> String {
        match self.provider {
            EmbeddingProviderKind::Ollama => format!("ollama:{}", self.model),
            EmbeddingProviderKind::Candle => format!("candle:{}", self.candle_repo),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            model: "all-minilm".into(),
            base_url: "http://localhost:11434".into(),
            candle_repo: "sentence-transformers/all-MiniLM-L6-v2".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Claude,
    Ollama,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub model: String,
    pub max_tokens: u32,
    /// Ollama server URL, used when `provider = "ollama"`.
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Claude,
            model: "claude-haiku-4-5-20251001".into(),
            max_tokens: 1024,
            base_url: "http://localhost:11434".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    Persistent,
    Ephemeral,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub mode: IndexMode,
    pub sqlite_path: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            mode: IndexMode::Persistent,
            sqlite_path: "data/index.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// `stdout` or a file path.
    pub destination: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: "logs/audit.jsonl".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub llm_seconds: u64,
    pub embedding_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: 60,
            embedding_seconds: 30,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub claude_api_key: Option<Secret>,
}
