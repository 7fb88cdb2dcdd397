//! # DocBot CLI
//!
//! The `docbot` binary drives the whole system: fetching topic data,
//! building the vector index, answering questions, and serving the chat UI.
//!
//! ## Usage
//!
//! ```bash
//! docbot --config ./docbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docbot fetch` | Fetch articles for the configured topics into the topic store |
//! | `docbot ingest` | Build the vector index from PDFs and the topic store |
//! | `docbot ask "<question>"` | Answer a single question |
//! | `docbot chat` | Interactive question loop |
//! | `docbot serve` | Start the HTTP chat server |
//!
//! The `HF_TOKEN` environment variable must be set for every command that
//! talks to the hosted models (`ingest`, `ask`, `chat`, `serve`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docbot::{chat, config, fetch_cmd, ingest, server};

/// DocBot, a retrieval-augmented medical question-answering assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docbot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docbot",
    about = "DocBot — retrieval-augmented medical question answering",
    version,
    long_about = "DocBot ingests PDF and JSON medical content into a persisted vector index, \
    answers questions from retrieved context via a hosted LLM, and refreshes its knowledge \
    from the MedlinePlus search API when the context is insufficient."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch articles for the configured topics.
    ///
    /// Runs the general and the drug-focused search per topic against the
    /// MedlinePlus API, with a polite delay between topics, and writes the
    /// topic store JSON consumed by `ingest`.
    Fetch,

    /// Build the vector index.
    ///
    /// Normalizes every PDF page and topic-store article into documents,
    /// chunks them, embeds the chunks, and persists the index directory.
    Ingest,

    /// Answer a single question.
    ///
    /// Loads the persisted index, runs the QA pipeline once (including the
    /// knowledge-refresh loop if needed), and prints the answer with its
    /// sources.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Interactive question loop.
    ///
    /// Reads one question per line; `exit` or `quit` leaves the loop.
    Chat,

    /// Start the HTTP chat server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// chat page plus the `POST /ask` JSON endpoint.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Fetch => {
            fetch_cmd::run_fetch(&cfg).await?;
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg).await?;
        }
        Commands::Ask { question } => {
            chat::run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
