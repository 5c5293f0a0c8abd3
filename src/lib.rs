//! In-memory retrieval for retrieval-augmented generation.
//!
//! ragbase turns a corpus of text documents into embedded passages and, given
//! a query, returns the passages most relevant to it, ready to be placed in a
//! generation prompt. Everything lives in process memory; the corpus is
//! ingested once per process.
//!
//! # Architecture
//!
//! - **Chunking**: paragraph packing with a word-count overlap
//! - **Embeddings**: one of three interchangeable strategies, chosen by config:
//!
//! | Strategy | Backend | Dimensions |
//! |----------|---------|------------|
//! | `lexical` | bag-of-words over the corpus vocabulary | vocabulary size (≤ 5000) |
//! | `local-neural` | ONNX Runtime, all-MiniLM-L6-v2 | 384 |
//! | `remote-api` | Gemini embedding API | model-defined |
//!
//! - **Search**: brute-force cosine similarity, stable top-K
//! - **Transport**: HTTP JSON API (axum) and a CLI
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`chunker`]: Paragraph-based chunking
//! - [`embedding`]: The [`embedding::EmbeddingProvider`] trait and its strategies
//! - [`knowledge`]: Document sources, the knowledge base, ranking, context assembly
//! - [`language`]: Script-range language detection
//! - [`generation`]: Hosted chat-model client that consumes the context

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod language;

pub use error::{RagError, Result};
pub use knowledge::{KnowledgeBase, KnowledgeBaseOptions, Status};
