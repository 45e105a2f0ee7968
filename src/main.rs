//! # docchat CLI
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat serve` | Start the HTTP API |
//! | `docchat ask --docs <dir> <messages...>` | Index a directory and ask one or more questions in sequence |
//! | `docchat chunk <file>` | Print the chunks a file would be split into |
//! | `docchat completions <shell>` | Print shell completions |
//!
//! When the config file does not exist, an offline configuration is used
//! (hashing embedder, generation disabled).

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;

use docchat::config::{self, DEFAULT_CONFIG_PATH};
use docchat::engine::Engine;
use docchat::ingest::{default_include_globs, load_documents};
use docchat::{logging, server};
use docchat_core::chunk::chunk_document;

/// docchat: question answering over private document collections.
#[derive(Parser)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Index a directory of `.md`/`.txt` files and ask questions.
    ///
    /// Messages are asked in order within one conversation, so later
    /// messages may be follow-ups.
    Ask {
        /// Directory to index.
        #[arg(long)]
        docs: PathBuf,

        /// Tenant id to index under.
        #[arg(long, default_value = "default")]
        tenant: String,

        /// Print the score breakdown as JSON.
        #[arg(long)]
        json: bool,

        /// Messages to ask.
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Show how a file would be chunked.
    Chunk {
        file: PathBuf,

        /// Override `chunking.max_chars`.
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Print shell completions.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "docchat",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    logging::init_tracing();
    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let engine = Arc::new(Engine::from_config(cfg)?);
            server::run_server(engine).await?;
        }
        Commands::Ask {
            docs,
            tenant,
            json,
            messages,
        } => {
            let documents = load_documents(&docs, &default_include_globs(), &[])?;
            if documents.is_empty() {
                anyhow::bail!("No .md or .txt files found under {}", docs.display());
            }
            let engine = Engine::from_config(cfg)?;
            let report = engine.ingest(&tenant, documents).await?;
            println!(
                "Indexed {} documents ({} chunks, {} terms) for tenant '{}'",
                report.documents, report.chunks, report.vocabulary, tenant
            );

            for message in messages {
                let response = engine.ask(&tenant, &message).await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    continue;
                }
                println!();
                println!("> {}", message);
                if let Some(query) = response.query.as_deref().filter(|q| *q != message) {
                    println!("  (searched for: {})", query);
                }
                println!("{}", response.answer);
                println!(
                    "  [{} | confidence {:.2}{}]",
                    response.status.as_str(),
                    response.confidence,
                    response
                        .source
                        .as_deref()
                        .map(|s| format!(" | source {}", s))
                        .unwrap_or_default()
                );
                if !response.context.is_empty() {
                    println!("  context: {}", response.context);
                }
            }

            let analytics = engine.analytics(&tenant);
            println!();
            println!(
                "{} interactions, average confidence {:.2}, error rate {:.2}",
                analytics.total_interactions, analytics.average_confidence, analytics.error_rate
            );
        }
        Commands::Chunk { file, max_chars } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let max_chars = max_chars.unwrap_or(cfg.chunking.max_chars);
            if max_chars == 0 {
                anyhow::bail!("--max-chars must be > 0");
            }
            let source = file.display().to_string();
            for chunk in chunk_document(&text, &source, max_chars) {
                println!(
                    "[{}] ({} chars) {}",
                    chunk.ordinal,
                    chunk.text.chars().count(),
                    chunk.text
                );
            }
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
