mod helpers;

use std::sync::Arc;

use helpers::{doc, lexical_kb, lexical_kb_with, FlakyProvider};
use ragbase::chunker::Chunker;
use ragbase::knowledge::source::StaticSource;
use ragbase::{KnowledgeBase, KnowledgeBaseOptions};

#[tokio::test]
async fn empty_document_contributes_no_chunks() {
    let (kb, _) = lexical_kb(vec![
        doc("a.txt", "Hello world. More text here."),
        doc("b.txt", ""),
    ]);

    let status = kb.initialize().await.unwrap();
    assert!(status.initialized);
    assert!(status.entry_count >= 1);
    assert!(kb.entries().iter().all(|e| e.metadata.source == "a.txt"));
}

#[tokio::test]
async fn empty_corpus_is_initialized_and_empty() {
    let (kb, _) = lexical_kb(vec![]);
    let status = kb.initialize().await.unwrap();
    assert!(status.initialized);
    assert_eq!(status.entry_count, 0);
    assert!(kb.search("anything", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn comment_only_document_yields_nothing() {
    let (kb, _) = lexical_kb(vec![doc("notes.txt", "# title\n   # another\n\n#")]);
    let status = kb.initialize().await.unwrap();
    assert!(status.initialized);
    assert_eq!(status.entry_count, 0);
}

#[tokio::test]
async fn comment_lines_are_stripped_before_chunking() {
    let (kb, _) = lexical_kb(vec![doc(
        "kb.txt",
        "# Knowledge base v2\nOpening hours are nine to five.\n# internal note\n",
    )]);
    kb.initialize().await.unwrap();
    let entries = kb.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "Opening hours are nine to five.");
}

#[tokio::test]
async fn entry_ids_are_source_and_index() {
    let options = KnowledgeBaseOptions {
        chunker: Chunker::new(20, 0),
        ..KnowledgeBaseOptions::default()
    };
    let (kb, _) = lexical_kb_with(
        vec![
            doc("guide.txt", "first paragraph here\n\nsecond paragraph here"),
            doc("faq.txt", "only one"),
        ],
        options,
    );
    kb.initialize().await.unwrap();

    let ids: Vec<&str> = kb.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["guide.txt-0", "guide.txt-1", "faq.txt-0"]);
    assert_eq!(kb.entries()[2].metadata.chunk_index, 0);
}

#[tokio::test]
async fn ids_are_stable_across_rebuilds() {
    let docs = vec![doc("a.txt", "one\n\ntwo"), doc("b.txt", "three")];
    let options = KnowledgeBaseOptions {
        chunker: Chunker::new(3, 0),
        ..KnowledgeBaseOptions::default()
    };
    let (mut kb, source) = lexical_kb_with(docs, options);

    kb.initialize().await.unwrap();
    let first: Vec<String> = kb.entries().iter().map(|e| e.id.clone()).collect();

    kb.reset();
    assert!(!kb.status().initialized);
    kb.initialize().await.unwrap();
    let second: Vec<String> = kb.entries().iter().map(|e| e.id.clone()).collect();

    assert_eq!(first, second);
    assert_eq!(source.loads(), 2);
}

#[tokio::test]
async fn all_vectors_share_one_length() {
    let (kb, _) = lexical_kb(vec![
        doc("a.txt", "alpha beta gamma"),
        doc("b.txt", "delta epsilon"),
    ]);
    let status = kb.initialize().await.unwrap();
    let dims = status.dimensions.unwrap();
    assert_eq!(dims, 5);
    assert!(kb.entries().iter().all(|e| e.embedding.len() == dims));
}

#[tokio::test]
async fn failed_ingestion_leaves_uninitialized_and_retries() {
    let source = StaticSource::new(vec![doc("a.txt", "retry me please")]);
    let kb = KnowledgeBase::new(
        Arc::new(FlakyProvider::new()),
        Arc::new(source),
        KnowledgeBaseOptions::default(),
    );

    let err = kb.initialize().await.unwrap_err();
    assert!(!err.is_config());
    assert!(!kb.status().initialized);

    let status = kb.initialize().await.unwrap();
    assert!(status.initialized);
    assert_eq!(status.entry_count, 1);
}

#[tokio::test]
async fn status_reports_provider_before_init() {
    let (kb, _) = lexical_kb(vec![doc("a.txt", "x")]);
    let status = kb.status();
    assert!(!status.initialized);
    assert_eq!(status.entry_count, 0);
    assert_eq!(status.provider, "lexical");
    assert!(status.built_at.is_none());
}
