//! The in-memory knowledge base.
//!
//! [`KnowledgeBase`] owns the embedding provider, the document source, and the
//! built entries. It is built at most once: [`KnowledgeBase::initialize`] is
//! single-flight, so concurrent first callers share one ingestion run and
//! later callers return immediately. After that the entries are read-only and
//! searches read them without locking.

pub mod context;
pub mod search;
pub mod source;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::chunker::{Chunk, Chunker};
use crate::config::RagConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{RagError, Result};
use context::RelevantContext;
use search::SearchResult;
use source::{strip_comment_lines, DocumentSource};

/// Where an entry's text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryMetadata {
    pub source: String,
    pub chunk_index: usize,
}

/// One embedded chunk.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    /// `"{source}-{chunk_index}"`, stable across rebuilds of the same corpus.
    pub id: String,
    pub content: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

impl Entry {
    fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: format!("{}-{}", chunk.source, chunk.index),
            content: chunk.content,
            embedding,
            metadata: EntryMetadata {
                source: chunk.source,
                chunk_index: chunk.index,
            },
        }
    }
}

/// Health snapshot for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub initialized: bool,
    pub entry_count: usize,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<String>,
}

/// Tunables for building and querying.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseOptions {
    pub chunker: Chunker,
    pub comment_prefix: String,
    pub top_k: usize,
    pub max_context_chars: usize,
    /// Deadline for embedding one query. `None` waits indefinitely.
    pub embed_timeout: Option<Duration>,
    /// Deadline for embedding the whole corpus during ingestion.
    pub ingest_timeout: Option<Duration>,
}

impl Default for KnowledgeBaseOptions {
    fn default() -> Self {
        Self {
            chunker: Chunker::default(),
            comment_prefix: "#".into(),
            top_k: 3,
            max_context_chars: 8000,
            embed_timeout: Some(Duration::from_secs(120)),
            ingest_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl From<&RagConfig> for KnowledgeBaseOptions {
    fn from(config: &RagConfig) -> Self {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Self {
            chunker: Chunker::from(&config.chunking),
            comment_prefix: config.documents.comment_prefix.clone(),
            top_k: config.retrieval.top_k,
            max_context_chars: config.retrieval.max_context_chars,
            embed_timeout: secs(config.retrieval.embed_timeout_secs),
            ingest_timeout: secs(config.retrieval.ingest_timeout_secs),
        }
    }
}

struct Built {
    entries: Vec<Entry>,
    dimensions: usize,
    built_at: String,
}

pub struct KnowledgeBase {
    provider: Arc<dyn EmbeddingProvider>,
    source: Arc<dyn DocumentSource>,
    options: KnowledgeBaseOptions,
    state: OnceCell<Built>,
}

impl KnowledgeBase {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        source: Arc<dyn DocumentSource>,
        options: KnowledgeBaseOptions,
    ) -> Self {
        Self {
            provider,
            source,
            options,
            state: OnceCell::new(),
        }
    }

    /// Build the provider and document source described by `config`.
    ///
    /// Fails only on configuration errors (e.g. missing model files or API key).
    /// Nothing is ingested until [`initialize`](Self::initialize) is called.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        let source: Arc<dyn DocumentSource> =
            Arc::from(source::source_for_path(config.resolved_documents_path()));
        info!(
            strategy = %config.embedding.strategy,
            documents = %config.resolved_documents_path().display(),
            "knowledge base configured"
        );
        Ok(Self::new(provider, source, KnowledgeBaseOptions::from(config)))
    }

    pub fn options(&self) -> &KnowledgeBaseOptions {
        &self.options
    }

    /// Ingest the corpus if that has not happened yet, then report status.
    ///
    /// Concurrent callers wait for the single in-flight build. If the build
    /// fails the knowledge base stays uninitialized and the next call retries.
    pub async fn initialize(&self) -> Result<Status> {
        if self.state.initialized() {
            debug!("knowledge base already initialized");
        }
        self.state.get_or_try_init(|| self.build()).await?;
        Ok(self.status())
    }

    pub fn status(&self) -> Status {
        let built = self.state.get();
        Status {
            initialized: built.is_some(),
            entry_count: built.map_or(0, |b| b.entries.len()),
            provider: self.provider.name().to_string(),
            dimensions: built.map(|b| b.dimensions).filter(|&d| d > 0),
            built_at: built.map(|b| b.built_at.clone()),
        }
    }

    /// All entries in corpus order. Empty before initialization.
    pub fn entries(&self) -> &[Entry] {
        self.state.get().map(|b| b.entries.as_slice()).unwrap_or(&[])
    }

    /// Drop the built entries so the next [`initialize`](Self::initialize) re-ingests.
    pub fn reset(&mut self) {
        if self.state.take().is_some() {
            info!("knowledge base reset");
        }
    }

    /// Top `top_k` entries for `query` by cosine similarity, best first.
    ///
    /// Returns an empty list when the knowledge base is uninitialized or empty.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let Some(built) = self.state.get() else {
            warn!("knowledge base not initialized");
            return Ok(vec![]);
        };
        if built.entries.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let provider = Arc::clone(&self.provider);
        let query_text = query.to_string();
        let query_embedding = run_blocking(self.options.embed_timeout, move || {
            provider.embed(&query_text)
        })
        .await?;

        let results = search::rank(&query_embedding, &built.entries, top_k)?;
        debug!(
            results = results.len(),
            best = results.first().map(|r| r.score),
            "search complete"
        );
        Ok(results)
    }

    /// Search with the configured `top_k` and assemble the context string.
    pub async fn retrieve(&self, query: &str) -> Result<RelevantContext> {
        let results = self.search(query, self.options.top_k).await?;
        Ok(context::assemble(&results, self.options.max_context_chars))
    }

    async fn build(&self) -> Result<Built> {
        info!(provider = self.provider.name(), "initializing knowledge base");

        let source = Arc::clone(&self.source);
        let documents = tokio::task::spawn_blocking(move || source.load()).await??;

        let mut chunks: Vec<Chunk> = Vec::new();
        for doc in &documents {
            let text = strip_comment_lines(&doc.text, &self.options.comment_prefix);
            if text.trim().is_empty() {
                warn!(source = %doc.source, "document has no content after removing comments");
                continue;
            }
            let doc_chunks = self.options.chunker.chunk(&text, &doc.source);
            info!(source = %doc.source, chunks = doc_chunks.len(), "document chunked");
            chunks.extend(doc_chunks);
        }

        if chunks.is_empty() {
            warn!(documents = documents.len(), "no chunks created; knowledge base is empty");
            return Ok(Built {
                entries: vec![],
                dimensions: 0,
                built_at: chrono::Utc::now().to_rfc3339(),
            });
        }

        info!(chunks = chunks.len(), "generating embeddings");
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let provider = Arc::clone(&self.provider);
        let embeddings = run_blocking(self.options.ingest_timeout, move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            provider.fit(&refs)?;
            provider.embed_batch(&refs)
        })
        .await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::Provider(format!(
                "provider returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        let dimensions = embeddings[0].len();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        let entries: Vec<Entry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Entry::from_chunk(chunk, embedding))
            .collect();

        info!(entries = entries.len(), dimensions, "knowledge base initialized");
        Ok(Built {
            entries,
            dimensions,
            built_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Run a provider call on the blocking pool, optionally under a deadline.
///
/// On timeout the blocking task keeps running to completion in the background;
/// only the caller stops waiting.
async fn run_blocking<T, F>(deadline: Option<Duration>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    match deadline {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| RagError::Timeout(limit))??,
        None => task.await?,
    }
}
