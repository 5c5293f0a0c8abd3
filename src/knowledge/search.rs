//! Cosine similarity and top-K ranking over knowledge-base entries.

use std::cmp::Ordering;

use serde::Serialize;

use super::Entry;
use crate::error::{RagError, Result};

/// One ranked entry.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub entry: Entry,
    pub score: f32,
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude. Vectors of different
/// lengths come from different providers and are rejected.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Score every entry against `query`, highest first, keeping at most `top_k`.
///
/// The sort is stable, so entries with equal scores keep their corpus order.
pub fn rank(query: &[f32], entries: &[Entry], top_k: usize) -> Result<Vec<SearchResult>> {
    Ok(top_indices(query, entries, top_k)?
        .into_iter()
        .map(|(i, score)| SearchResult {
            entry: entries[i].clone(),
            score,
        })
        .collect())
}

/// `(position, score)` of the best `top_k` entries. Only these are cloned by [`rank`].
fn top_indices(query: &[f32], entries: &[Entry], top_k: usize) -> Result<Vec<(usize, f32)>> {
    let mut scored = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| cosine_similarity(&entry.embedding, query).map(|score| (i, score)))
        .collect::<Result<Vec<_>>>()?;

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    Ok(scored)
}
