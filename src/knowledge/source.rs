//! Where document text comes from.
//!
//! A [`DocumentSource`] yields plain text plus a source identifier (the file
//! name) per document. Binary formats are expected to be converted to text
//! before they reach this layer.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// File extensions picked up by [`DirectorySource`].
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// One document's raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Loads the corpus. A missing source is an empty corpus, not an error.
pub trait DocumentSource: Send + Sync {
    fn load(&self) -> Result<Vec<Document>>;
}

/// A single text file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    fn load(&self) -> Result<Vec<Document>> {
        if !self.path.is_file() {
            tracing::warn!(path = %self.path.display(), "knowledge base file not found");
            return Ok(vec![]);
        }
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                tracing::info!(path = %self.path.display(), bytes = text.len(), "loaded knowledge base file");
                Ok(vec![Document::new(file_name(&self.path), text)])
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "knowledge base file unreadable");
                Ok(vec![])
            }
        }
    }
}

/// Every `.txt`/`.md` file directly inside a directory, in file-name order.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentSource for DirectorySource {
    fn load(&self) -> Result<Vec<Document>> {
        if !self.dir.is_dir() {
            tracing::warn!(dir = %self.dir.display(), "data directory not found");
            return Ok(vec![]);
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_text_extension(p))
            .collect();
        paths.sort();

        tracing::info!(dir = %self.dir.display(), files = paths.len(), "found text files to process");

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            match std::fs::read_to_string(&path) {
                Ok(text) => docs.push(Document::new(file_name(&path), text)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file")
                }
            }
        }
        Ok(docs)
    }
}

/// A fixed in-memory corpus.
pub struct StaticSource {
    docs: Vec<Document>,
}

impl StaticSource {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }
}

impl DocumentSource for StaticSource {
    fn load(&self) -> Result<Vec<Document>> {
        Ok(self.docs.clone())
    }
}

/// Pick [`DirectorySource`] or [`FileSource`] depending on what `path` is.
pub fn source_for_path(path: impl AsRef<Path>) -> Box<dyn DocumentSource> {
    let path = path.as_ref();
    if path.is_dir() {
        Box::new(DirectorySource::new(path))
    } else {
        Box::new(FileSource::new(path))
    }
}

/// Drop lines whose first non-whitespace text is `prefix`.
pub fn strip_comment_lines(text: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with(prefix))
        .collect::<Vec<_>>()
        .join("\n")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.iter().any(|t| e.eq_ignore_ascii_case(t)))
        .unwrap_or(false)
}
