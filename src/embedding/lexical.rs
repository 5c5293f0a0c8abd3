//! Bag-of-words embedding over a vocabulary learned from the corpus.
//!
//! The vocabulary is every distinct lower-cased whitespace token in the corpus
//! (with leading and trailing punctuation trimmed), in first-seen order,
//! truncated to a cap. A text embeds as its term-count
//! vector over that vocabulary, L2-normalized. Out-of-vocabulary terms are
//! dropped, so a text sharing no terms with the corpus embeds as the zero vector.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{l2_normalize, EmbeddingProvider};
use crate::error::{RagError, Result};

#[derive(Debug, Default)]
struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    fn build(corpus: &[&str], cap: usize) -> Self {
        let mut vocab = Self::default();
        'outer: for text in corpus {
            for token in tokens(text) {
                if vocab.terms.len() >= cap {
                    break 'outer;
                }
                if !vocab.index.contains_key(&token) {
                    vocab.index.insert(token.clone(), vocab.terms.len());
                    vocab.terms.push(token);
                }
            }
        }
        vocab
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.terms.len()];
        for token in tokens(text) {
            if let Some(&i) = self.index.get(&token) {
                v[i] += 1.0;
            }
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

/// Lexical provider. Must be [`fit`](EmbeddingProvider::fit) on the corpus
/// before anything can be embedded.
pub struct LexicalEmbeddingProvider {
    cap: usize,
    vocabulary: RwLock<Option<Vocabulary>>,
}

impl LexicalEmbeddingProvider {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            vocabulary: RwLock::new(None),
        }
    }

    /// Vocabulary terms in vector order. Empty before `fit`.
    pub fn vocabulary(&self) -> Vec<String> {
        self.vocabulary
            .read()
            .map(|guard| (*guard).as_ref().map(|v| v.terms.clone()).unwrap_or_default())
            .unwrap_or_default()
    }
}

impl EmbeddingProvider for LexicalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let guard = self
            .vocabulary
            .read()
            .map_err(|e| RagError::Provider(format!("vocabulary lock poisoned: {e}")))?;
        let vocab = (*guard).as_ref().ok_or_else(|| {
            RagError::Config("lexical vocabulary not built; fit the provider on a corpus first".into())
        })?;
        Ok(vocab.vectorize(text))
    }

    fn fit(&self, corpus: &[&str]) -> Result<()> {
        let vocab = Vocabulary::build(corpus, self.cap);
        tracing::info!(
            vocabulary = vocab.terms.len(),
            cap = self.cap,
            documents = corpus.len(),
            "lexical vocabulary built"
        );
        let mut guard = self
            .vocabulary
            .write()
            .map_err(|e| RagError::Provider(format!("vocabulary lock poisoned: {e}")))?;
        *guard = Some(vocab);
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.vocabulary
            .read()
            .map(|guard| (*guard).as_ref().map_or(0, |v| v.terms.len()))
            .unwrap_or(0)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}
