use super::Config;

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Option<T> {
    let parsed = serde_json::from_value(serde_json::Value::String(value.to_lowercase())).ok();
    if parsed.is_none() {
        tracing::warn!("ignoring invalid {key} value: {value}");
    }
    parsed
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!("ignoring invalid {key} value: {value}");
    }
    parsed
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_corpus();
        self.apply_env_overrides_models();
        self.apply_env_overrides_runtime();
    }

    fn apply_env_overrides_corpus(&mut self) {
        if let Ok(v) = std::env::var("QUIRE_CORPUS_DIR") {
            self.corpus.dir = v.into();
        }
        if let Ok(v) = std::env::var("QUIRE_CORPUS_CSV_SOURCE_NAME") {
            self.corpus.csv_source_name = v;
        }
        if let Ok(v) = std::env::var("QUIRE_CHUNK_SIZE")
            && let Some(size) = parse_num("QUIRE_CHUNK_SIZE", &v)
        {
            self.chunking.chunk_size = size;
        }
        if let Ok(v) = std::env::var("QUIRE_CHUNK_OVERLAP")
            && let Some(overlap) = parse_num("QUIRE_CHUNK_OVERLAP", &v)
        {
            self.chunking.chunk_overlap = overlap;
        }
        if let Ok(v) = std::env::var("QUIRE_RETRIEVAL_TOP_K")
            && let Some(top_k) = parse_num("QUIRE_RETRIEVAL_TOP_K", &v)
        {
            self.retrieval.top_k = top_k;
        }
        if let Ok(v) = std::env::var("QUIRE_RETRIEVAL_MIN_SCORE")
            && let Some(score) = parse_num("QUIRE_RETRIEVAL_MIN_SCORE", &v)
        {
            self.retrieval.confidence.min_score = score;
        }
        if let Ok(v) = std::env::var("QUIRE_RETRIEVAL_WARN_SCORE")
            && let Some(score) = parse_num("QUIRE_RETRIEVAL_WARN_SCORE", &v)
        {
            self.retrieval.confidence.warn_score = score;
        }
    }

    fn apply_env_overrides_models(&mut self) {
        if let Ok(v) = std::env::var("QUIRE_EMBEDDING_PROVIDER")
            && let Some(kind) = parse_enum("QUIRE_EMBEDDING_PROVIDER", &v)
        {
            self.embedding.provider = kind;
        }
        if let Ok(v) = std::env::var("QUIRE_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("QUIRE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("QUIRE_LLM_PROVIDER")
            && let Some(kind) = parse_enum("QUIRE_LLM_PROVIDER", &v)
        {
            self.llm.provider = kind;
        }
        if let Ok(v) = std::env::var("QUIRE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("QUIRE_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("QUIRE_LLM_MAX_TOKENS")
            && let Some(tokens) = parse_num("QUIRE_LLM_MAX_TOKENS", &v)
        {
            self.llm.max_tokens = tokens;
        }
    }

    fn apply_env_overrides_runtime(&mut self) {
        if let Ok(v) = std::env::var("QUIRE_INDEX_MODE")
            && let Some(mode) = parse_enum("QUIRE_INDEX_MODE", &v)
        {
            self.index.mode = mode;
        }
        if let Ok(v) = std::env::var("QUIRE_SQLITE_PATH") {
            self.index.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("QUIRE_AUDIT_ENABLED")
            && let Some(enabled) = parse_num("QUIRE_AUDIT_ENABLED", &v)
        {
            self.audit.enabled = enabled;
        }
        if let Ok(v) = std::env::var("QUIRE_AUDIT_DESTINATION") {
            self.audit.destination = v;
        }
        if let Ok(v) = std::env::var("QUIRE_TIMEOUT_LLM")
            && let Some(secs) = parse_num("QUIRE_TIMEOUT_LLM", &v)
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("QUIRE_TIMEOUT_EMBEDDING")
            && let Some(secs) = parse_num("QUIRE_TIMEOUT_EMBEDDING", &v)
        {
            self.timeouts.embedding_seconds = secs;
        }
        if let Ok(v) = std::env::var("QUIRE_FALLBACK_MESSAGE") {
            self.fallback_message = v;
        }
    }
}
