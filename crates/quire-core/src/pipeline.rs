//! Query orchestration: retrieve, gate, generate, audit.

use std::path::{Path, PathBuf};
use std::time::Instant;

use quire_llm::{LlmError, LlmProvider};
use quire_memory::document::{CorpusLoader, DocumentError, FileReport, SkippedFile};
use quire_memory::{CorpusIndex, MemoryError, RebuildStats, RetrievedChunk};
use tokio::sync::Mutex;

use crate::audit::{AuditError, AuditLogger, QueryResult, dedup_sources};
use crate::confidence::{ConfidenceLevel, ConfidencePolicy};
use crate::generator::{FallbackReason, Generation, Generator};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] MemoryError),

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("index build failed: {0}")]
    Build(#[source] MemoryError),

    #[error("corpus ingestion failed: {0}")]
    Ingest(#[from] DocumentError),
}

#[derive(Debug)]
pub struct RebuildReport {
    pub stats: RebuildStats,
    pub files: Vec<FileReport>,
    pub skipped: Vec<SkippedFile>,
}

/// A finished query. The answer is always present; `audit_error` reports a
/// failed audit write without discarding it.
#[derive(Debug)]
pub struct QueryResponse {
    pub result: QueryResult,
    pub retrieved: Vec<RetrievedChunk>,
    pub audit_error: Option<AuditError>,
}

pub struct RagPipeline<P, E> {
    loader: CorpusLoader,
    corpus_dir: PathBuf,
    index: CorpusIndex<E>,
    generator: Generator<P>,
    policy: ConfidencePolicy,
    audit: AuditLogger,
    top_k: usize,
    /// Serializes corpus ingestion so concurrent first queries build once.
    build_lock: Mutex<()>,
}

impl<P: LlmProvider, E: LlmProvider> RagPipeline<P, E> {
    #[must_use]
    pub fn new(
        loader: CorpusLoader,
        corpus_dir: impl Into<PathBuf>,
        index: CorpusIndex<E>,
        generator: Generator<P>,
    ) -> Self {
        Self {
            loader,
            corpus_dir: corpus_dir.into(),
            index,
            generator,
            policy: ConfidencePolicy::default(),
            audit: AuditLogger::disabled(),
            top_k: 5,
            build_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ConfidencePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn set_top_k(&mut self, top_k: usize) {
        self.top_k = top_k;
    }

    #[must_use]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[must_use]
    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    #[must_use]
    pub fn index(&self) -> &CorpusIndex<E> {
        &self.index
    }

    #[must_use]
    pub fn fallback_message(&self) -> &str {
        self.generator.fallback_message()
    }

    /// Build the index if no complete generation exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the corpus cannot be read or indexed.
    pub async fn ensure_index(&self) -> Result<Option<RebuildReport>, PipelineError> {
        if self.index.is_built().await {
            return Ok(None);
        }
        let _guard = self.build_lock.lock().await;
        if self.index.is_built().await {
            return Ok(None);
        }
        tracing::info!("no index for the configured embedding model, building");
        self.rebuild_corpus().await.map(Some)
    }

    /// Re-ingest the corpus directory and replace the index content.
    ///
    /// Queries running meanwhile keep using the previous index.
    ///
    /// # Errors
    ///
    /// Returns an error if the corpus directory cannot be listed or indexing fails.
    pub async fn rebuild(&self) -> Result<RebuildReport, PipelineError> {
        let _guard = self.build_lock.lock().await;
        self.rebuild_corpus().await
    }

    async fn rebuild_corpus(&self) -> Result<RebuildReport, PipelineError> {
        let report = self.loader.load_corpus(&self.corpus_dir).await?;
        for skipped in &report.skipped {
            tracing::warn!(file = %skipped.file, reason = %skipped.reason, "skipped corpus file");
        }
        let stats = self
            .index
            .rebuild(&report.chunks)
            .await
            .map_err(PipelineError::Build)?;
        tracing::info!(
            chunks = stats.chunks,
            files = report.files.len(),
            skipped = report.skipped.len(),
            elapsed_ms = stats.elapsed_ms,
            "index ready"
        );
        Ok(RebuildReport {
            stats,
            files: report.files,
            skipped: report.skipped,
        })
    }

    /// Answer one question against the current index.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or the model call fails. Fallbacks are
    /// successful results, not errors.
    pub async fn query(&self, question: &str) -> Result<QueryResponse, PipelineError> {
        let start = Instant::now();
        self.ensure_index().await?;

        let retrieved = self
            .index
            .search(question, self.top_k)
            .await
            .map_err(PipelineError::Retrieval)?;
        let scores: Vec<f32> = retrieved.iter().map(|c| c.similarity).collect();

        let (generation, confidence, best) = if retrieved.is_empty() {
            let generation = self.generator.generate(question, &retrieved).await?;
            (generation, ConfidenceLevel::Unscored, None)
        } else {
            let verdict = self.policy.assess(&scores);
            let generation = if verdict.allows_generation() {
                self.generator.generate(question, &retrieved).await?
            } else {
                tracing::info!(
                    best = ?verdict.best(),
                    min_score = self.policy.min_score(),
                    "retrieval below confidence floor, not generating"
                );
                self.generator.decline(FallbackReason::LowConfidence)
            };
            (generation, verdict.level(), verdict.best())
        };

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = self.result(question, &generation, &retrieved, confidence, best, latency_ms);

        let audit_error = match self.audit.log(&result).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("audit write failed: {e}");
                Some(e)
            }
        };

        Ok(QueryResponse {
            result,
            retrieved,
            audit_error,
        })
    }

    fn result(
        &self,
        question: &str,
        generation: &Generation,
        retrieved: &[RetrievedChunk],
        confidence: ConfidenceLevel,
        best_similarity: Option<f32>,
        latency_ms: u64,
    ) -> QueryResult {
        QueryResult {
            timestamp: chrono::Utc::now().to_rfc3339(),
            question: question.to_owned(),
            answer: generation
                .answer(self.generator.fallback_message())
                .to_owned(),
            is_fallback: generation.is_fallback(),
            fallback_reason: generation.fallback_reason(),
            confidence,
            best_similarity,
            sources: dedup_sources(retrieved),
            citations: generation
                .citations()
                .iter()
                .map(ToString::to_string)
                .collect(),
            num_chunks: retrieved.len(),
            model: generation.model.clone(),
            input_tokens: generation.usage.input_tokens,
            output_tokens: generation.usage.output_tokens,
            latency_ms,
        }
    }
}
