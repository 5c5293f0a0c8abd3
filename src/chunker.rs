//! Paragraph-based text chunking.
//!
//! Text is split into paragraphs on blank lines and packed into chunks of
//! roughly `target_size` characters. Each new chunk is seeded with the last
//! `overlap / 5` words of the previous one, so the overlap is a word-count
//! approximation of a character budget rather than an exact one. Paragraphs
//! are never split: a paragraph larger than the target becomes its own
//! oversized chunk.

use serde::Serialize;

use crate::config::ChunkingConfig;

/// Rough characters-per-word ratio used to turn the overlap budget into words.
const CHARS_PER_WORD: usize = 5;

/// A contiguous span of cleaned text from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub content: String,
    pub source: String,
    /// Zero-based position within `source`.
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    pub target_size: usize,
    pub overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            target_size: 500,
            overlap: 50,
        }
    }
}

impl From<&ChunkingConfig> for Chunker {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            target_size: config.target_size,
            overlap: config.overlap,
        }
    }
}

impl Chunker {
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size,
            overlap,
        }
    }

    /// Chunk one document. Indices restart at zero for every call.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        chunk_text(text, self.target_size, self.overlap)
            .into_iter()
            .enumerate()
            .map(|(index, content)| Chunk {
                content,
                source: source.to_string(),
                index,
            })
            .collect()
    }
}

/// Split `text` into trimmed, non-empty chunk strings.
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let overlap_words = overlap / CHARS_PER_WORD;
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in paragraphs(text) {
        let paragraph_len = paragraph.chars().count();

        if current_len + paragraph_len > target_size && current_len > 0 {
            let tail = overlap_tail(&current, overlap_words);
            chunks.push(current.trim().to_string());

            current = tail;
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&paragraph);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&paragraph);
        }
        current_len = current.chars().count();
    }

    let last = current.trim();
    if !last.is_empty() {
        chunks.push(last.to_string());
    }

    chunks
}

/// Paragraphs separated by whitespace-only lines, with inner whitespace collapsed.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut lines, &mut out);
        } else {
            lines.push(line);
        }
    }
    flush_paragraph(&mut lines, &mut out);

    out
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let cleaned = lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if !cleaned.is_empty() {
        out.push(cleaned);
    }
    lines.clear();
}

/// The last `words` words of `chunk`, space-joined.
fn overlap_tail(chunk: &str, words: usize) -> String {
    if words == 0 {
        return String::new();
    }
    let all: Vec<&str> = chunk.split_whitespace().collect();
    let start = all.len().saturating_sub(words);
    all[start..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(chunk_text("", 500, 50).is_empty());
        assert!(chunk_text("   \n\n \t \n", 500, 50).is_empty());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunk_text("Hello world. More text here.", 500, 50);
        assert_eq!(chunks, vec!["Hello world. More text here.".to_string()]);
    }

    #[test]
    fn whitespace_inside_paragraph_is_collapsed() {
        let chunks = chunk_text("alpha   beta\n  gamma\tdelta", 500, 50);
        assert_eq!(chunks, vec!["alpha beta gamma delta".to_string()]);
    }

    #[test]
    fn paragraphs_merge_until_target() {
        let text = "one two\n\nthree four\n\n\n   \nfive six";
        let chunks = chunk_text(text, 500, 50);
        assert_eq!(chunks, vec!["one two three four five six".to_string()]);
    }

    #[test]
    fn closing_a_chunk_seeds_overlap_words() {
        // overlap 10 => two trailing words carried over
        let text = "aaa bbb ccc ddd\n\neee fff ggg hhh";
        let chunks = chunk_text(text, 20, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "aaa bbb ccc ddd");
        assert_eq!(chunks[1], "ccc ddd eee fff ggg hhh");
    }

    #[test]
    fn zero_overlap_carries_nothing() {
        let text = "aaa bbb ccc ddd\n\neee fff ggg hhh";
        let chunks = chunk_text(text, 20, 4);
        assert_eq!(chunks, vec!["aaa bbb ccc ddd", "eee fff ggg hhh"]);
    }

    #[test]
    fn oversized_paragraph_is_not_split() {
        let long = "word ".repeat(200);
        let text = format!("short intro\n\n{long}\n\ntail");
        let chunks = chunk_text(&text, 50, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "short intro");
        assert_eq!(chunks[1], long.trim());
        assert_eq!(chunks[2], "tail");
    }

    #[test]
    fn oversized_first_paragraph_stands_alone() {
        let long = "x".repeat(80);
        let chunks = chunk_text(&long, 10, 50);
        assert_eq!(chunks, vec![long]);
    }

    #[test]
    fn chunks_reconstruct_source_without_overlap() {
        let text = "First paragraph with several words.\n\n\
                    Second paragraph is here.\n\n\
                    Third one closes   the\ndocument nicely.\n\n\
                    And a fourth for good measure.";
        let chunks = chunk_text(text, 40, 0);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
        assert_eq!(chunks.join(" "), normalized(text));
    }

    #[test]
    fn chunks_with_overlap_contain_every_paragraph_in_order() {
        let text = "p1 a b c d\n\np2 e f g h\n\np3 i j k l\n\np4 m n o p";
        let chunks = chunk_text(text, 12, 10);
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            // drop the two carried-over words
            let fresh: Vec<&str> = chunk.split(' ').skip(2).collect();
            rebuilt.push(' ');
            rebuilt.push_str(&fresh.join(" "));
        }
        assert_eq!(rebuilt, normalized(text));
    }

    #[test]
    fn chunker_assigns_per_source_indices() {
        let chunker = Chunker::new(10, 0);
        let chunks = chunker.chunk("first block\n\nsecond block", "guide.txt");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        assert!(chunks.iter().all(|c| c.source == "guide.txt"));

        let again = chunker.chunk("other", "faq.txt");
        assert_eq!(again[0].index, 0);
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        // 6 chars each, 12+ bytes each
        let text = "مرحبا!\n\nمرحبا!";
        let chunks = chunk_text(text, 13, 0);
        assert_eq!(chunks.len(), 1);
    }
}
