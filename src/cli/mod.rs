pub mod search;
pub mod status;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use ragbase::config::{expand_tilde, EmbeddingConfig};
use ragbase::language;

const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// Files the local provider needs, as (file name, path under [`HF_BASE`]).
const ARTIFACTS: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
];

/// Fetch the local embedding model into `embedding.cache_dir`, skipping files already present.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = expand_tilde(&config.cache_dir);
    tokio::fs::create_dir_all(&cache_dir)
        .await
        .with_context(|| format!("cannot create {}", cache_dir.display()))?;

    for (file_name, remote_path) in ARTIFACTS {
        let dest = cache_dir.join(file_name);
        if dest.is_file() {
            println!("{file_name}: already present at {}", dest.display());
            continue;
        }
        println!("{file_name}: downloading...");
        fetch(&format!("{HF_BASE}/{remote_path}"), &dest).await?;
        println!("{file_name}: saved to {}", dest.display());
    }

    println!("Done. Set embedding.strategy = \"local-neural\" in config.toml to use it.");
    Ok(())
}

/// Stream `url` into `dest`. The body is written to a sibling `.part` file
/// and renamed on completion so an interrupted download never looks complete.
async fn fetch(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url}"))?;

    let progress = response
        .content_length()
        .map(ProgressBar::new)
        .unwrap_or_else(ProgressBar::new_spinner);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec}")?
            .progress_chars("=>-"),
    );

    let partial = dest.with_extension("part");
    let mut out = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("cannot create {}", partial.display()))?;

    while let Some(bytes) = response.chunk().await.context("reading response body")? {
        out.write_all(&bytes).await.context("writing download")?;
        progress.inc(bytes.len() as u64);
    }
    out.flush().await?;
    drop(out);

    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("cannot move download into {}", dest.display()))?;
    progress.finish_and_clear();
    Ok(())
}

/// Print the detected response language for `text`.
pub fn detect(text: &str) {
    let detection = language::detect(text);
    println!("{}", detection.primary);
}
