mod cli;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ragbase::config::RagConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragbase", version, about = "In-memory retrieval layer for RAG")]
struct Cli {
    /// Config file (defaults to ~/.ragbase/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve,
    /// Ingest the corpus once and print knowledge base status
    Ingest,
    /// Search the knowledge base from the terminal
    Search {
        query: String,
        /// Number of passages to return (defaults to retrieval.top_k)
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the assembled context instead of the ranked list
        #[arg(long)]
        context: bool,
    },
    /// Detect the response language of a piece of text
    Detect { text: String },
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.ragbase/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = match &cli.config {
        Some(path) => RagConfig::load_from(path)?,
        None => RagConfig::load()?,
    };

    // Log to stderr so stdout stays clean for CLI output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Ingest => cli::status::ingest(&config).await?,
        Command::Search {
            query,
            top_k,
            context,
        } => cli::search::search(&config, &query, top_k, context).await?,
        Command::Detect { text } => cli::detect(&text),
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
