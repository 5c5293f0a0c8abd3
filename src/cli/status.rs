//! CLI `ingest` command: build the knowledge base once and print its status.

use anyhow::Result;
use std::time::Instant;

use ragbase::config::RagConfig;
use ragbase::KnowledgeBase;

pub async fn ingest(config: &RagConfig) -> Result<()> {
    let kb = KnowledgeBase::from_config(config)?;

    let started = Instant::now();
    let status = kb.initialize().await?;
    let elapsed = started.elapsed();

    let mut per_source: Vec<(String, usize)> = Vec::new();
    for entry in kb.entries() {
        match per_source.last_mut() {
            Some((source, count)) if *source == entry.metadata.source => *count += 1,
            _ => per_source.push((entry.metadata.source.clone(), 1)),
        }
    }

    println!("Knowledge Base");
    println!("{}", "=".repeat(40));
    println!("  Documents path:    {}", config.resolved_documents_path().display());
    println!("  Provider:          {}", status.provider);
    println!("  Initialized:       {}", status.initialized);
    println!("  Entries:           {}", status.entry_count);
    if let Some(dims) = status.dimensions {
        println!("  Dimensions:        {dims}");
    }
    println!("  Build time:        {:.2}s", elapsed.as_secs_f64());
    println!();

    if !per_source.is_empty() {
        println!("By Source:");
        for (source, count) in &per_source {
            println!("  {:<30} {}", source, count);
        }
    }

    Ok(())
}
