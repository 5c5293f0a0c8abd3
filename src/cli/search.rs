use anyhow::Result;

use ragbase::config::RagConfig;
use ragbase::knowledge::context;
use ragbase::KnowledgeBase;

/// Run a search from the terminal against a freshly ingested knowledge base.
pub async fn search(
    config: &RagConfig,
    query: &str,
    top_k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let kb = KnowledgeBase::from_config(config)?;
    let status = kb.initialize().await?;

    if status.entry_count == 0 {
        println!(
            "Knowledge base is empty (no documents at {}).",
            config.resolved_documents_path().display()
        );
        return Ok(());
    }

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let results = kb.search(query, top_k).await?;

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    if show_context {
        let assembled = context::assemble(&results, config.retrieval.max_context_chars);
        println!("{}", assembled.context);
        println!();
        let sources: Vec<&str> = assembled.sources.iter().map(String::as_str).collect();
        println!("Sources: {}", sources.join(", "));
        return Ok(());
    }

    println!(
        "Found {} result(s) from {} passages\n",
        results.len(),
        status.entry_count
    );

    for (i, result) in results.iter().enumerate() {
        let preview: String = result.entry.content.chars().take(120).collect();
        let ellipsis = if result.entry.content.chars().count() > 120 {
            "..."
        } else {
            ""
        };

        println!(
            "  {}. {} (score: {:.4})",
            i + 1,
            result.entry.id,
            result.score,
        );
        println!("     {preview}{ellipsis}");
        println!();
    }

    Ok(())
}
