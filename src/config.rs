use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RagConfig {
    pub server: ServerConfig,
    pub documents: DocumentsConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentsConfig {
    /// A single text file, or a directory of `.txt`/`.md` files.
    pub path: String,
    pub comment_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub target_size: usize,
    pub overlap: usize,
}

/// Which embedding backend a deployment uses. Never mixed within one knowledge base.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingStrategy {
    Lexical,
    LocalNeural,
    RemoteApi,
}

impl EmbeddingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::LocalNeural => "local-neural",
            Self::RemoteApi => "remote-api",
        }
    }
}

impl std::fmt::Display for EmbeddingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmbeddingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lexical" => Ok(Self::Lexical),
            "local-neural" | "local" => Ok(Self::LocalNeural),
            "remote-api" | "remote" => Ok(Self::RemoteApi),
            _ => Err(format!("unknown embedding strategy: {s}")),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub strategy: EmbeddingStrategy,
    /// Local ONNX model name.
    pub model: String,
    /// Hosted embedding model for the `remote-api` strategy.
    pub remote_model: String,
    /// Where `ragbase model download` puts the ONNX model and tokenizer.
    pub cache_dir: String,
    pub vocabulary_cap: usize,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub batch_size: usize,
    pub max_retries: u32,
    /// Per-request HTTP timeout for the remote API. 0 disables it.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Upper bound on the assembled context string. 0 disables the cap.
    pub max_context_chars: usize,
    /// Deadline for embedding one query. 0 disables it.
    pub embed_timeout_secs: u64,
    /// Deadline for embedding the whole corpus. 0 disables it.
    pub ingest_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub endpoint: String,
    /// Per-request HTTP timeout for generation calls. 0 disables it.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            log_level: "info".into(),
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        let path = default_ragbase_dir()
            .join("data")
            .join("knowledge-base.txt")
            .to_string_lossy()
            .into_owned();
        Self {
            path,
            comment_prefix: "#".into(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 500,
            overlap: 50,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_ragbase_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            strategy: EmbeddingStrategy::Lexical,
            model: "all-MiniLM-L6-v2".into(),
            remote_model: "text-embedding-004".into(),
            cache_dir,
            vocabulary_cap: 5000,
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            batch_size: 10,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_context_chars: 8000,
            embed_timeout_secs: 120,
            ingest_timeout_secs: 600,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".into(),
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            timeout_secs: 60,
        }
    }
}

/// Returns `~/.ragbase/`
pub fn default_ragbase_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragbase")
}

/// Returns the default config file path: `~/.ragbase/config.toml`
pub fn default_config_path() -> PathBuf {
    default_ragbase_dir().join("config.toml")
}

impl RagConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RagConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `RAGBASE_DOCUMENTS`, `RAGBASE_LOG_LEVEL`, `RAGBASE_EMBEDDING`, `RAGBASE_PORT`,
    /// and `GEMINI_API_KEY` (used by both the remote embedder and the generator
    /// when their own key is unset).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("RAGBASE_DOCUMENTS") {
            self.documents.path = val;
        }
        if let Ok(val) = std::env::var("RAGBASE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("RAGBASE_EMBEDDING") {
            self.embedding.strategy = val.parse().map_err(anyhow::Error::msg)?;
        }
        if let Ok(val) = std::env::var("RAGBASE_PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("invalid RAGBASE_PORT: {val}"))?;
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            if self.embedding.api_key.is_none() {
                self.embedding.api_key = Some(val.clone());
            }
            if self.generation.api_key.is_none() {
                self.generation.api_key = Some(val);
            }
        }
        Ok(())
    }

    /// Resolve the document path, expanding `~` if needed.
    pub fn resolved_documents_path(&self) -> PathBuf {
        expand_tilde(&self.documents.path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RagConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.chunking.target_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.strategy, EmbeddingStrategy::Lexical);
        assert_eq!(config.embedding.vocabulary_cap, 5000);
        assert_eq!(config.embedding.batch_size, 10);
        assert!(config.documents.path.ends_with("knowledge-base.txt"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[documents]
path = "/srv/docs"

[embedding]
strategy = "remote-api"
batch_size = 5

[retrieval]
top_k = 8
"#;
        let config: RagConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.documents.path, "/srv/docs");
        assert_eq!(config.embedding.strategy, EmbeddingStrategy::RemoteApi);
        assert_eq!(config.embedding.batch_size, 5);
        assert_eq!(config.retrieval.top_k, 8);
        // defaults still apply for unset fields
        assert_eq!(config.chunking.target_size, 500);
        assert_eq!(config.documents.comment_prefix, "#");
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let toml_str = r#"
[embedding]
strategy = "word2vec"
"#;
        assert!(toml::from_str::<RagConfig>(toml_str).is_err());
        assert!("word2vec".parse::<EmbeddingStrategy>().is_err());
        assert_eq!(
            "local".parse::<EmbeddingStrategy>().unwrap(),
            EmbeddingStrategy::LocalNeural
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RagConfig::default();
        std::env::set_var("RAGBASE_DOCUMENTS", "/tmp/corpus");
        std::env::set_var("RAGBASE_LOG_LEVEL", "trace");
        std::env::set_var("RAGBASE_EMBEDDING", "remote-api");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.documents.path, "/tmp/corpus");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.embedding.strategy, EmbeddingStrategy::RemoteApi);

        // Clean up
        std::env::remove_var("RAGBASE_DOCUMENTS");
        std::env::remove_var("RAGBASE_LOG_LEVEL");
        std::env::remove_var("RAGBASE_EMBEDDING");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RagConfig::load_from(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/etc/kb.txt"), PathBuf::from("/etc/kb.txt"));
    }
}
