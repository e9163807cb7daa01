//! # Runbook RAG CLI (`rbk`)
//!
//! Thin command-line front end over the `runbook_rag` library. The vector
//! store is in-memory, so every command indexes the configured runbook
//! source before it runs.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rbk ingest [SOURCE]` | Index runbooks and print the ingestion report |
//! | `rbk search "<text>"` | Show the runbook sections a query would retrieve |
//! | `rbk checklist --alert <file>` | Produce a checklist for an alert (JSON on stdout) |
//!
//! Logs go to stderr; set `RUST_LOG` to change the level (default `info`)
//! and `--log-json` for JSON lines.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use runbook_rag::config::{self, Config};
use runbook_rag::engine::Engine;
use runbook_rag::ingest::IngestOptions;
use runbook_rag::pipeline::ChecklistRequest;
use runbook_rag::rag_core::models::{Alert, EnrichedContext};

/// Runbook RAG: troubleshooting checklists from alerts and runbooks.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rbk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rbk",
    about = "Runbook RAG: turn infrastructure alerts into troubleshooting checklists grounded in runbooks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rbk.toml`. When the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG: &str = "./config/rbk.toml";

#[derive(Subcommand)]
enum Commands {
    /// Index runbooks from storage.
    ///
    /// SOURCE is a directory under `[storage].root`; omit it to index the
    /// whole root.
    Ingest {
        #[arg(default_value = "")]
        source: String,

        /// Re-index documents even when their content is unchanged.
        #[arg(long)]
        full: bool,
    },

    /// Show the runbook sections retrieved for a free-text query.
    Search {
        query: String,

        /// Resource shape to match applicable-target patterns against.
        #[arg(long)]
        shape: Option<String>,

        /// Number of results.
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, default_value = "")]
        source: String,
    },

    /// Produce a troubleshooting checklist for an alert.
    ///
    /// The file holds either an alert object or an enriched context
    /// (an object with an `alert` field plus `resource`, `metrics`, `logs`).
    Checklist {
        /// Path to the alert JSON file.
        #[arg(long)]
        alert: PathBuf,

        /// Number of runbook sections to ground the checklist on.
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, default_value = "")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = load(&cli.config)?;
    let engine = Engine::from_config(&cfg)?;

    match cli.command {
        Commands::Ingest { source, full } => {
            let report = engine
                .ingestion()
                .ingest_with(&source, IngestOptions { full })
                .await?;
            println!("ingest {}", display_source(&report.source));
            println!("  documents: {}", report.documents_seen);
            println!("  indexed: {}", report.documents_indexed);
            println!("  unchanged: {}", report.documents_unchanged);
            println!("  chunks stored: {}", report.chunks_stored);
            for failure in &report.failures {
                println!(
                    "  failed ({}): {}: {}",
                    failure.stage, failure.source_path, failure.error
                );
            }
            println!("ok");
        }
        Commands::Search {
            query,
            shape,
            top_k,
            source,
        } => {
            engine.ingestion().ingest(&source).await?;
            let hits = engine
                .search(&query, shape, top_k.unwrap_or(cfg.retrieval.top_k))
                .await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} / {}  (similarity {:.3}, boost {:.3})",
                    rank + 1,
                    hit.final_score,
                    hit.chunk.source_path,
                    hit.chunk.section_title,
                    hit.similarity_score,
                    hit.metadata_boost
                );
            }
        }
        Commands::Checklist {
            alert,
            top_k,
            source,
        } => {
            engine.ingestion().ingest(&source).await?;
            let request = read_request(&alert)?;
            let (result, lifecycle) = engine
                .orchestrator()
                .process_with_lifecycle(request, top_k)
                .await;
            let checklist = result.with_context(|| {
                format!("checklist failed in state {}", lifecycle.state())
            })?;
            println!("{}", serde_json::to_string_pretty(&checklist)?);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The default config path is optional; an explicit one must exist.
fn load(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        return Ok(Config::default());
    }
    config::load_config(path)
}

fn read_request(path: &Path) -> Result<ChecklistRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read alert file: {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "Alert file is not valid JSON")?;

    if value.get("alert").is_some() {
        let context: EnrichedContext =
            serde_json::from_value(value).with_context(|| "Invalid enriched context")?;
        Ok(context.into())
    } else {
        let alert: Alert = serde_json::from_value(value).with_context(|| "Invalid alert")?;
        Ok(alert.into())
    }
}

fn display_source(source: &str) -> &str {
    if source.is_empty() {
        "(root)"
    } else {
        source
    }
}
