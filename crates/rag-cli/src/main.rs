//! RAG CLI - Command-line interface for agentic retrieval.

mod ingest;
mod wiring;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rag_core::{CancelToken, QueryRequest, RagConfig, RefragRequest};
use rag_mcp::{RagServer, ToolResult};

use crate::ingest::{collect_files, parse_fragments, FragmentDefaults};

/// Fragments sent to the embedder per ingest call.
const INGEST_BATCH: usize = 64;

/// RAG - Agentic retrieval-augmented generation over a local fragment store
#[derive(Parser)]
#[command(name = "rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/agentic-rag/config.toml, then ./agentic-rag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the config
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Print tool results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Where to write the config
        #[arg(long, default_value = "agentic-rag.toml")]
        output: PathBuf,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Ingest a JSONL or plain-text file (or a directory of them)
    Ingest {
        /// Path to file or directory to ingest
        path: PathBuf,

        /// Recursively process directories
        #[arg(short, long)]
        recursive: bool,

        /// Document type for fragments without one
        #[arg(long)]
        doc_type: Option<String>,

        /// Language for fragments without one
        #[arg(long)]
        language: Option<String>,
    },

    /// Answer a question with planned multi-round retrieval
    Query {
        question: String,

        /// Number of fragments in the final context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        #[arg(long)]
        doc_type: Option<String>,

        #[arg(long)]
        language: Option<String>,
    },

    /// Answer a question from an over-fetched, partially compressed context
    Refrag {
        question: String,

        /// Candidates to retrieve
        #[arg(long)]
        over_fetch: Option<usize>,

        /// Candidates kept verbatim
        #[arg(long)]
        expand: Option<usize>,

        /// Tokens folded into one compressed token
        #[arg(long)]
        ratio: Option<usize>,

        #[arg(long)]
        doc_type: Option<String>,

        #[arg(long)]
        language: Option<String>,
    },

    /// Show the query plan for a question
    Plan { question: String },

    /// Show statistics
    Stats,
}

fn setup_logging(verbose: bool) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let level = if verbose { Level::DEBUG } else { Level::WARN };
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

fn load_config(cli: &Cli) -> Result<RagConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::load_default()?,
    };
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    Ok(config)
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    match cli.command {
        Commands::Init { output, force } => {
            init(&config, &output, force)?;
        }
        Commands::Ingest {
            path,
            recursive,
            doc_type,
            language,
        } => {
            let server = wiring::build_server(&config)?;
            let defaults = FragmentDefaults { doc_type, language };
            ingest(&server, &path, recursive, &defaults, cli.json).await?;
        }
        Commands::Query {
            question,
            top_k,
            doc_type,
            language,
        } => {
            let server = wiring::build_server(&config)?;
            let request = QueryRequest {
                question,
                doc_type,
                language,
                top_k,
            };
            report(server.query(request, &cancel).await, cli.json);
        }
        Commands::Refrag {
            question,
            over_fetch,
            expand,
            ratio,
            doc_type,
            language,
        } => {
            let server = wiring::build_server(&config)?;
            let request = RefragRequest {
                question,
                doc_type,
                language,
                over_fetch_k: over_fetch,
                expand_k: expand,
                compression_ratio: ratio,
            };
            report(server.refrag(request, &cancel).await, cli.json);
        }
        Commands::Plan { question } => {
            let server = wiring::build_server(&config)?;
            report(
                server.call("rag_plan", json!({ "question": question }), &cancel).await,
                cli.json,
            );
        }
        Commands::Stats => {
            let server = wiring::build_server(&config)?;
            report(server.stats().await, cli.json);
        }
    }

    Ok(())
}

fn init(config: &RagConfig, output: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if output.exists() && !force {
        println!(
            "Config already exists at: {} (use --force to overwrite)",
            output.display()
        );
    } else {
        fs::write(output, toml::to_string_pretty(config)?)?;
        println!("Wrote config to: {}", output.display());
    }

    let _store = rag_store::SqliteStore::open(&config.database.path)?;
    println!("Initialized database at: {}", config.database.path.display());
    Ok(())
}

fn report(result: ToolResult, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else if result.success {
        println!("{}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
    }

    if !result.success {
        std::process::exit(1);
    }
}

async fn ingest(
    server: &RagServer,
    path: &Path,
    recursive: bool,
    defaults: &FragmentDefaults,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = collect_files(path, recursive)?;

    if files.is_empty() {
        println!("No supported files found at: {}", path.display());
        return Ok(());
    }

    if !as_json {
        println!("Ingesting {} file(s)...", files.len());
    }

    let mut ids: Vec<i64> = Vec::new();
    let mut error_count = 0;

    for file_path in files {
        let fragments = match fs::read_to_string(&file_path)
            .map_err(rag_core::RagError::from)
            .and_then(|content| parse_fragments(&file_path, &content, defaults))
        {
            Ok(fragments) => fragments,
            Err(e) => {
                eprintln!("  {} - Error: {}", file_path.display(), e);
                error_count += 1;
                continue;
            }
        };

        let mut stored = 0;
        let mut failed = false;
        for batch in fragments.chunks(INGEST_BATCH) {
            let result = server
                .call("rag_ingest", json!({ "fragments": batch }), &CancelToken::new())
                .await;
            if !result.success {
                eprintln!("  {} - Error: {}", file_path.display(), result.message);
                failed = true;
                break;
            }
            if let Some(batch_ids) = result.data.as_ref().and_then(|d| d["ids"].as_array()) {
                ids.extend(batch_ids.iter().filter_map(|id| id.as_i64()));
                stored += batch_ids.len();
            }
        }

        if failed {
            error_count += 1;
        } else if !as_json {
            println!("  {} - {} fragments", file_path.display(), stored);
        }
    }

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "ids": ids, "failed_files": error_count }))?
        );
    } else {
        println!(
            "\nComplete: {} fragments stored, {} file(s) failed",
            ids.len(),
            error_count
        );
    }

    Ok(())
}
