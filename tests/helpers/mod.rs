#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ragbase::embedding::lexical::LexicalEmbeddingProvider;
use ragbase::embedding::EmbeddingProvider;
use ragbase::knowledge::source::{Document, DocumentSource};
use ragbase::{KnowledgeBase, KnowledgeBaseOptions, RagError, Result};

/// Document source that counts how often it is loaded.
pub struct CountingSource {
    docs: Vec<Document>,
    delay: Duration,
    loads: AtomicUsize,
}

impl CountingSource {
    pub fn new(docs: Vec<Document>) -> Self {
        Self::with_delay(docs, Duration::ZERO)
    }

    /// Sleeps on every load, to widen the window for concurrent callers.
    pub fn with_delay(docs: Vec<Document>, delay: Duration) -> Self {
        Self {
            docs,
            delay,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DocumentSource for CountingSource {
    fn load(&self) -> Result<Vec<Document>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.docs.clone())
    }
}

/// Embeds corpus texts with `corpus_dims` and queries with `query_dims`,
/// mimicking a provider swap between ingestion and search.
pub struct MismatchedProvider {
    pub corpus_dims: usize,
    pub query_dims: usize,
}

impl EmbeddingProvider for MismatchedProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0; self.query_dims])
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; self.corpus_dims]).collect())
    }

    fn dimensions(&self) -> usize {
        self.corpus_dims
    }

    fn name(&self) -> &str {
        "mismatched"
    }
}

/// Fails the first batch with a provider error, then behaves like the lexical provider.
pub struct FlakyProvider {
    inner: LexicalEmbeddingProvider,
    failed: AtomicBool,
}

impl FlakyProvider {
    pub fn new() -> Self {
        Self {
            inner: LexicalEmbeddingProvider::new(5000),
            failed: AtomicBool::new(false),
        }
    }
}

impl EmbeddingProvider for FlakyProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(RagError::Provider("simulated network failure".into()));
        }
        self.inner.embed_batch(texts)
    }

    fn fit(&self, corpus: &[&str]) -> Result<()> {
        self.inner.fit(corpus)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Sleeps before every query embedding.
pub struct SlowQueryProvider {
    pub delay: Duration,
}

impl EmbeddingProvider for SlowQueryProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        std::thread::sleep(self.delay);
        Ok(vec![1.0, 0.0])
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Lexical knowledge base over an in-memory corpus.
pub fn lexical_kb(docs: Vec<Document>) -> (KnowledgeBase, Arc<CountingSource>) {
    lexical_kb_with(docs, KnowledgeBaseOptions::default())
}

pub fn lexical_kb_with(
    docs: Vec<Document>,
    options: KnowledgeBaseOptions,
) -> (KnowledgeBase, Arc<CountingSource>) {
    let source = Arc::new(CountingSource::new(docs));
    let kb = KnowledgeBase::new(
        Arc::new(LexicalEmbeddingProvider::new(5000)),
        source.clone(),
        options,
    );
    (kb, source)
}

pub fn doc(source: &str, text: &str) -> Document {
    Document::new(source, text)
}
