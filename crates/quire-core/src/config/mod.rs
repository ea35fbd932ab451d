mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

use crate::vault::{Secret, VaultProvider};

/// Checked in order; the first non-empty value wins.
pub const CLAUDE_API_KEY_VARS: [&str; 2] = ["QUIRE_CLAUDE_API_KEY", "ANTHROPIC_API_KEY"];

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be greater than zero");
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.chunk_overlap,
                chunking.chunk_size
            );
        }
        let confidence = self.retrieval.confidence;
        for (name, value) in [
            ("min_score", confidence.min_score),
            ("warn_score", confidence.warn_score),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                bail!("retrieval.confidence.{name} must be within [-1, 1], got {value}");
            }
        }
        if confidence.min_score > confidence.warn_score {
            bail!("retrieval.confidence.min_score must not exceed warn_score");
        }
        if self.fallback_message.trim().is_empty() {
            bail!("fallback_message must not be empty");
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be greater than zero");
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            bail!("timeouts must be greater than zero");
        }
        Ok(())
    }

    /// Resolve API keys through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        for key in CLAUDE_API_KEY_VARS {
            if let Some(val) = vault.get_secret(key).await? {
                self.secrets.claude_api_key = Some(Secret::new(val));
                break;
            }
        }
        Ok(())
    }
}
