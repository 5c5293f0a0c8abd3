//! Turns ranked search results into the context string handed to generation.

use std::collections::BTreeSet;

use serde::Serialize;

use super::search::SearchResult;

/// Placed between passages in the assembled context.
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelevantContext {
    pub context: String,
    /// Unique source identifiers of the passages that made it into `context`.
    pub sources: BTreeSet<String>,
}

/// Join passages in rank order, stopping before `max_chars` would be exceeded.
///
/// `max_chars == 0` means no cap. A first passage longer than the cap is cut
/// at a character boundary so the context is never empty when results exist.
pub fn assemble(results: &[SearchResult], max_chars: usize) -> RelevantContext {
    let mut out = RelevantContext::default();
    let mut used = 0usize;
    let sep_len = PASSAGE_SEPARATOR.chars().count();

    for (i, result) in results.iter().enumerate() {
        let content = &result.entry.content;
        let len = content.chars().count();
        let extra = if i == 0 { len } else { sep_len + len };

        if max_chars > 0 && used + extra > max_chars {
            if i == 0 {
                out.context = content.chars().take(max_chars).collect();
                out.sources.insert(result.entry.metadata.source.clone());
            }
            tracing::debug!(kept = i.max(1), dropped = results.len() - i.max(1), max_chars, "context capped");
            break;
        }

        if i > 0 {
            out.context.push_str(PASSAGE_SEPARATOR);
        }
        out.context.push_str(content);
        out.sources.insert(result.entry.metadata.source.clone());
        used += extra;
    }

    out
}
