//! Application bootstrap: config resolution, provider, store, and pipeline construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quire_llm::any::AnyProvider;
use quire_llm::claude::ClaudeProvider;
use quire_llm::ollama::OllamaProvider;
use quire_memory::document::{CorpusLoader, SplitterConfig};
use quire_memory::index::collection_base;
use quire_memory::{CorpusIndex, InMemoryVectorStore, SqliteVectorStore, VectorStore};

use crate::audit::AuditLogger;
use crate::config::{Config, EmbeddingProviderKind, IndexMode, LlmProviderKind};
use crate::confidence::ConfidencePolicy;
use crate::generator::Generator;
use crate::pipeline::RagPipeline;
use crate::vault::{EnvVaultProvider, VaultProvider};

pub type AppPipeline = RagPipeline<AnyProvider, AnyProvider>;

/// Priority: explicit path > `QUIRE_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("QUIRE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Load and validate config, then resolve secrets from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is unreadable or invalid.
    pub async fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        Self::load_with_vault(config_path, &EnvVaultProvider).await
    }

    /// # Errors
    ///
    /// Returns an error if the config is unreadable or invalid, or the vault fails.
    pub async fn load_with_vault(
        config_path: PathBuf,
        vault: &dyn VaultProvider,
    ) -> anyhow::Result<Self> {
        let mut config = Config::load(&config_path)?;
        config.validate()?;
        config.resolve_secrets(vault).await?;
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            config_path: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Construct every component and attach to the configured index.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider, the vector store or the audit log cannot be set up.
    pub async fn build_pipeline(&self) -> anyhow::Result<AppPipeline> {
        let config = &self.config;
        let generation = create_generation_provider(config)?;
        let embedder = create_embedding_provider(config)?;
        health_check(&embedder).await;

        let store = open_store(config).await?;
        let base = collection_base(&config.retrieval.collection, &config.embedding.identity());
        let index = CorpusIndex::open(store, embedder, base)
            .await
            .context("failed to open vector index")?;

        let audit = AuditLogger::from_config(&config.audit)
            .await
            .with_context(|| format!("failed to open audit log {}", config.audit.destination))?;

        let generator = Generator::new(
            generation,
            config.fallback_message.clone(),
            Duration::from_secs(config.timeouts.llm_seconds),
        );

        Ok(RagPipeline::new(
            create_corpus_loader(config),
            config.corpus.dir.clone(),
            index,
            generator,
        )
        .with_policy(ConfidencePolicy::from_config(&config.retrieval.confidence))
        .with_audit(audit)
        .with_top_k(config.retrieval.top_k))
    }
}

#[must_use]
pub fn create_corpus_loader(config: &Config) -> CorpusLoader {
    let chunking = &config.chunking;
    CorpusLoader::new(
        SplitterConfig {
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            min_chunk_chars: chunking.min_chunk_chars,
            min_row_chars: chunking.min_row_chars,
        },
        config.corpus.document_names.clone(),
        config.corpus.csv_source_name.clone(),
    )
}

/// Provider answering questions.
///
/// # Errors
///
/// Returns an error if Claude is selected without an API key.
pub fn create_generation_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        LlmProviderKind::Claude => {
            let api_key = config
                .secrets
                .claude_api_key
                .as_ref()
                .context("Claude API key not found: set QUIRE_CLAUDE_API_KEY or ANTHROPIC_API_KEY")?
                .expose()
                .to_owned();
            let provider = ClaudeProvider::new(
                api_key,
                config.llm.model.clone(),
                config.llm.max_tokens,
                config.timeouts.llm_seconds,
            )?;
            Ok(AnyProvider::Claude(provider))
        }
        LlmProviderKind::Ollama => Ok(AnyProvider::Ollama(
            OllamaProvider::new(
                &config.llm.base_url,
                config.llm.model.clone(),
                config.embedding.model.clone(),
                config.timeouts.llm_seconds,
            )
            .with_max_tokens(config.llm.max_tokens),
        )),
    }
}

/// Provider embedding chunks and questions.
///
/// # Errors
///
/// Returns an error if the candle backend is selected but not compiled in, or
/// its model cannot be loaded.
pub fn create_embedding_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.embedding.provider {
        EmbeddingProviderKind::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(
            &config.embedding.base_url,
            config.llm.model.clone(),
            config.embedding.model.clone(),
            config.timeouts.embedding_seconds,
        ))),
        #[cfg(feature = "candle")]
        EmbeddingProviderKind::Candle => {
            let device = quire_llm::candle_provider::select_device();
            let embedder =
                quire_llm::candle_provider::CandleEmbedder::new(&config.embedding.candle_repo, device)
                    .with_context(|| {
                        format!("failed to load embedding model {}", config.embedding.candle_repo)
                    })?;
            Ok(AnyProvider::Candle(embedder))
        }
        #[cfg(not(feature = "candle"))]
        EmbeddingProviderKind::Candle => {
            anyhow::bail!("embedding.provider = \"candle\" requires building with the `candle` feature")
        }
    }
}

/// Vector store for the configured index mode.
///
/// # Errors
///
/// Returns an error if the `SQLite` database cannot be opened.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.index.mode {
        IndexMode::Ephemeral => {
            tracing::info!("using in-memory index, rebuilt on every start");
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
        IndexMode::Persistent => {
            let store = SqliteVectorStore::open(&config.index.sqlite_path)
                .await
                .with_context(|| format!("failed to open {}", config.index.sqlite_path))?;
            tracing::info!(path = %config.index.sqlite_path, "using persistent index");
            Ok(Arc::new(store))
        }
    }
}

pub async fn health_check(provider: &AnyProvider) {
    match provider {
        AnyProvider::Ollama(ollama) => match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        },
        #[cfg(feature = "candle")]
        AnyProvider::Candle(candle) => {
            tracing::info!("candle embedder loaded, device: {}", candle.device_name());
        }
        _ => {}
    }
}
