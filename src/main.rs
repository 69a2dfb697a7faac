mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mnemograph::config::EngineConfig;
use mnemograph::engine::MemoryEngine;
use mnemograph::search::SearchMode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemograph", version, about = "Knowledge graph and hybrid search for AI-agent memory")]
struct Cli {
    /// Path to a config file (defaults to ~/.mnemograph/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the whole corpus into the graph store
    Sync,
    /// Search indexed documents
    Search {
        query: String,
        /// hybrid, semantic, or lexical
        #[arg(long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        /// Restrict to a corpus folder
        #[arg(long)]
        folder: Option<String>,
        /// Require these frontmatter tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show concepts related to a concept
    Context {
        concept: String,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long, default_value_t = 20)]
        max_entities: usize,
        /// Include content previews
        #[arg(long)]
        content: bool,
        #[arg(long)]
        json: bool,
    },
    /// Emit a Mermaid diagram of a concept neighborhood
    Visualize {
        concept: String,
        #[arg(long, default_value_t = 2)]
        depth: usize,
        #[arg(long, default_value_t = 30)]
        max_nodes: usize,
    },
    /// Print a document's full content (counts as deliberate access)
    Read { uri: String },
    /// Watch the corpus and sync changes incrementally
    Watch {
        /// Debounce quiet period in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// Show store statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };

    // Log to stderr so stdout stays clean for piped output
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = MemoryEngine::new(config);

    match cli.command {
        Command::Sync => cli::sync(&engine),
        Command::Search {
            query,
            mode,
            page,
            page_size,
            folder,
            tag,
            min_score,
            json,
        } => cli::search(
            &engine, &query, mode, page, page_size, folder, tag, min_score, json,
        ),
        Command::Context {
            concept,
            depth,
            max_entities,
            content,
            json,
        } => cli::context(&engine, &concept, depth, max_entities, content, json),
        Command::Visualize {
            concept,
            depth,
            max_nodes,
        } => cli::visualize(&engine, &concept, depth, max_nodes),
        Command::Read { uri } => cli::read(&engine, &uri),
        Command::Watch { debounce_ms } => cli::watch(&engine, debounce_ms),
        Command::Stats => cli::stats(&engine),
    }
}
