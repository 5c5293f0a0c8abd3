//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and three interchangeable
//! implementations, selected via [`create_provider`] from configuration:
//!
//! - [`lexical::LexicalEmbeddingProvider`]: bag-of-words counts over the corpus vocabulary
//! - [`local::LocalEmbeddingProvider`]: all-MiniLM-L6-v2 via ONNX Runtime
//! - [`remote::RemoteEmbeddingProvider`]: hosted embedding API over HTTP
//!
//! Vectors from different providers are never comparable; a knowledge base is
//! always built and queried with the same provider instance.

pub mod lexical;
pub mod local;
pub mod remote;

use crate::config::{EmbeddingConfig, EmbeddingStrategy};
use crate::error::Result;

/// Number of dimensions produced by the local model (all-MiniLM-L6-v2).
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched
    /// inference; results must equal per-item [`embed`](Self::embed) calls.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Prepare any corpus-dependent state before the corpus is embedded.
    ///
    /// Called once per knowledge-base build with every chunk text. Providers
    /// with a fixed model ignore it.
    fn fit(&self, _corpus: &[&str]) -> Result<()> {
        Ok(())
    }

    /// Number of dimensions this provider currently produces. `0` when unknown.
    fn dimensions(&self) -> usize;

    /// Short identifier used in logs and status output.
    fn name(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// Fails with a configuration error when the selected strategy cannot be set
/// up: missing model files for `local-neural`, missing API key for `remote-api`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.strategy {
        EmbeddingStrategy::Lexical => Ok(Box::new(lexical::LexicalEmbeddingProvider::new(
            config.vocabulary_cap,
        ))),
        EmbeddingStrategy::LocalNeural => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        EmbeddingStrategy::RemoteApi => {
            let provider = remote::RemoteEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
    }
}

/// L2-normalize a vector in place. Leaves a zero vector untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
