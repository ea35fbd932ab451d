//! Append-only JSONL record of every answered query.

use std::path::Path;

use quire_memory::RetrievedChunk;
use quire_memory::document::DocType;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::config::AuditConfig;
use crate::confidence::ConfidenceLevel;
use crate::generator::FallbackReason;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub page: u32,
    pub doc_type: DocType,
    pub similarity: f32,
}

/// Retrieved `(source, page)` pairs in first-seen order, each with its best similarity.
#[must_use]
pub fn dedup_sources(chunks: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for retrieved in chunks {
        let c = &retrieved.chunk;
        if let Some(existing) = sources
            .iter_mut()
            .find(|s| s.source == c.source_name && s.page == c.page)
        {
            existing.similarity = existing.similarity.max(retrieved.similarity);
        } else {
            sources.push(SourceRef {
                source: c.source_name.clone(),
                page: c.page,
                doc_type: c.doc_type,
                similarity: retrieved.similarity,
            });
        }
    }
    sources
}

/// Outcome of one query, returned to the caller and written as one audit line.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    pub confidence: ConfidenceLevel,
    pub best_similarity: Option<f32>,
    pub sources: Vec<SourceRef>,
    pub citations: Vec<String>,
    pub num_chunks: usize,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Disabled,
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

impl AuditLogger {
    /// Create an `AuditLogger` from config, creating the log directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, AuditError> {
        let destination = if !config.enabled {
            AuditDestination::Disabled
        } else if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let path = Path::new(&config.destination);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            destination: AuditDestination::Disabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self.destination, AuditDestination::Disabled)
    }

    /// Append one record as a single line.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub async fn log(&self, record: &QueryResult) -> Result<(), AuditError> {
        if let AuditDestination::Disabled = self.destination {
            return Ok(());
        }
        let json = serde_json::to_string(record)?;

        match &self.destination {
            AuditDestination::Disabled => {}
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                f.write_all(line.as_bytes()).await?;
                f.flush().await?;
            }
        }
        Ok(())
    }
}
