//! CLI definition and command dispatch for docvec.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--backend`, `--storage-path`, `--collection`)
//! 2. Environment variables (`DOCVEC_BACKEND`, `DOCVEC_STORAGE_PATH`, ...)
//! 3. Config file (`~/.docvec/config.yaml` or path from `--config`/`DOCVEC_CONFIG`)
//! 4. Built-in defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use crate::ui::{format, table, ColorMode, MessageType, Style};

use docvec_core::{
    available_backends, is_backend_available, BackendKind, Document, Metadata, MetadataFilter,
    MetadataValue, VectorDatabaseManager, VectorDbConfig,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// docvec - local document vector database
#[derive(Parser, Debug)]
#[command(name = "docvec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "DOCVEC_VERBOSE")]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true, env = "DOCVEC_QUIET")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.docvec/config.yaml)
    #[arg(long, global = true, env = "DOCVEC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend to use: self_managed or managed_store
    #[arg(long, global = true, env = "DOCVEC_BACKEND")]
    pub backend: Option<String>,

    /// Root directory for collections
    #[arg(long, global = true, env = "DOCVEC_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Collection name
    #[arg(long, global = true, env = "DOCVEC_COLLECTION")]
    pub collection: Option<String>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "DOCVEC_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add documents to the collection
    #[command(after_help = r#"EXAMPLES:
    # Add a single document with metadata
    docvec add --id intro --content "Vectors in a nutshell" --meta title=Intro --meta chunk_index=0

    # Add documents from a JSON array or a JSONL file
    docvec add --file docs.jsonl

FILE FORMAT:
    Each document is an object {"id": "...", "content": "...", "metadata": {...}}.
"#)]
    Add {
        /// JSON array or JSONL file of documents
        #[arg(long, conflicts_with_all = ["id", "content", "meta"])]
        file: Option<PathBuf>,

        /// Document id
        #[arg(long, requires = "content")]
        id: Option<String>,

        /// Document text
        #[arg(long, requires = "id")]
        content: Option<String>,

        /// Metadata entry as key=value (repeatable)
        #[arg(long, value_parser = parse_key_value)]
        meta: Vec<(String, MetadataValue)>,
    },

    /// Search the collection by text similarity
    #[command(after_help = r#"EXAMPLES:
    # Top 5 matches
    docvec search "how do vectors work"

    # Only chunks of one document, at least 0.5 similar
    docvec search "setup" --filter title=Intro --min-score 0.5

    # Machine-readable output
    docvec search "setup" --top-k 3 --json
"#)]
    Search {
        /// Query text
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Metadata equality filter as key=value (repeatable, all must match)
        #[arg(long, value_parser = parse_key_value)]
        filter: Vec<(String, MetadataValue)>,

        /// Drop results scoring below this value
        #[arg(long)]
        min_score: Option<f32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete one document by id
    Delete {
        /// Document id
        id: String,
    },

    /// Show collection statistics
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove every document from the collection
    Clear,

    /// Time insertion and search on every available backend
    #[command(after_help = r#"EXAMPLES:
    # Benchmark with sample documents and one query per line
    docvec benchmark --docs sample.jsonl --queries queries.txt

NOTES:
    Each backend runs against a temporary collection under the storage path,
    removed afterwards. The active collection is not touched.
"#)]
    Benchmark {
        /// JSON array or JSONL file of sample documents
        #[arg(long)]
        docs: PathBuf,

        /// Text file with one query per line
        #[arg(long)]
        queries: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List backends compiled into this build
    Backends {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Warnings always, debug detail only with --verbose.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!(
        "docvec_core={lvl},docvec_db={lvl},docvec_model={lvl},docvec_cli={lvl}",
        lvl = log_level
    );

    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let color_mode = ColorMode::from_str(&cli.color).unwrap_or(ColorMode::Auto);
    let style = Style::new(color_mode);

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your global config at ~/.docvec/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to load configuration",
                    Some(&format!("{:#}", e)),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    debug!(
        "Resolved config: backend={}, storage={}, collection={}",
        config.backend_kind,
        config.storage_path.display(),
        config.collection_name
    );

    // Listing backends does not open a collection.
    if let Command::Backends { json } = cli.command {
        return finish(&style, handle_backends(&style, &config, json));
    }

    let manager = match VectorDatabaseManager::new(config.clone()) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to open collection",
                    Some(&e.to_string()),
                    Some(&format!(
                        "Collection '{}' under {}",
                        config.collection_name,
                        config.storage_path.display()
                    )),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let selection = manager.selection();
    if selection.fell_back {
        eprintln!(
            "{}",
            style.message(
                MessageType::Warn,
                &format!(
                    "Backend {} unavailable, using {}",
                    selection.requested, selection.effective
                )
            )
        );
        if let Some(reason) = &selection.reason {
            eprintln!("{}", style.message_detail("Reason", reason));
        }
    }

    let session = Session {
        style: &style,
        manager: &manager,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Add {
            file,
            id,
            content,
            meta,
        } => handle_add(&session, file, id, content, meta),
        Command::Search {
            query,
            top_k,
            filter,
            min_score,
            json,
        } => handle_search(&session, &query, top_k, filter, min_score, json),
        Command::Delete { id } => handle_delete(&session, &id),
        Command::Stats { json } => handle_stats(&session, json),
        Command::Clear => handle_clear(&ctx),
        Command::Benchmark {
            docs,
            queries,
            json,
        } => handle_benchmark(&session, &docs, queries.as_deref(), json),
        Command::Backends { .. } => Ok(()),
    };

    finish(&style, result)
}

fn finish(style: &Style, result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style.message(MessageType::Err, &format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Shared state handed to every collection command.
struct Session<'a> {
    style: &'a Style,
    manager: &'a VectorDatabaseManager,
    quiet: bool,
}

impl Session<'_> {
    fn info(&self, msg_type: MessageType, text: &str) {
        if !self.quiet {
            println!("{}", self.style.message(msg_type, text));
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

fn resolve_config(cli: &Cli) -> Result<VectorDbConfig> {
    let mut config = match &cli.config {
        Some(path) => VectorDbConfig::from_path(path)?,
        None => VectorDbConfig::load_default()?,
    };

    if let Some(backend) = &cli.backend {
        config = config.with_backend_kind(backend.parse::<BackendKind>()?);
    }
    if let Some(storage_path) = &cli.storage_path {
        config = config.with_storage_path(storage_path);
    }
    if let Some(collection) = &cli.collection {
        config = config.with_collection_name(collection);
    }

    Ok(config)
}

/// Parse a `key=value` argument; the value is typed with
/// [`MetadataValue::parse_scalar`].
fn parse_key_value(raw: &str) -> std::result::Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), MetadataValue::parse_scalar(value.trim())))
}

/// Read documents from a JSON array or a JSONL file.
fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if text.trim_start().starts_with('[') {
        return serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON document array in {}", path.display()));
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid document at {}:{}", path.display(), i + 1))
        })
        .collect()
}

/// Read one query per non-empty line.
fn read_queries(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

// ============================================================================
// Command Handlers
// ============================================================================

fn handle_add(
    ctx: &Session,
    file: Option<PathBuf>,
    id: Option<String>,
    content: Option<String>,
    meta: Vec<(String, MetadataValue)>,
) -> Result<()> {
    let documents = match (file, id, content) {
        (Some(path), _, _) => read_documents(&path)?,
        (None, Some(id), Some(content)) => {
            let metadata: Metadata = meta.into_iter().collect();
            vec![Document::new(id, content).with_metadata(metadata)]
        }
        _ => bail!("Nothing to add: pass --file, or --id with --content"),
    };

    if documents.is_empty() {
        ctx.info(MessageType::Info, "No documents found in input.");
        return Ok(());
    }

    ctx.manager.add_documents(&documents)?;
    ctx.info(
        MessageType::Ok,
        &format!(
            "Added {} document{} to '{}'",
            documents.len(),
            if documents.len() == 1 { "" } else { "s" },
            ctx.manager.config().collection_name
        ),
    );
    Ok(())
}

fn handle_search(
    ctx: &Session,
    query: &str,
    top_k: usize,
    filter: Vec<(String, MetadataValue)>,
    min_score: Option<f32>,
    json: bool,
) -> Result<()> {
    let filter: MetadataFilter = filter.into_iter().collect();
    let filter = (!filter.is_empty()).then_some(filter);

    let mut results = ctx.manager.search(query, top_k, filter.as_ref())?;
    if let Some(min) = min_score {
        results.retain(|r| r.score >= min);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", ctx.style.message(MessageType::Info, "No matching documents."));
        return Ok(());
    }

    println!("{}", ctx.style.section("RESULTS"));
    println!();
    println!("{}", table::render_results_table(&results));
    if let Some(best) = results.first() {
        println!();
        println!(
            "  {}",
            ctx.style.key_value(
                "Best",
                &format!("{} ({})", ctx.style.doc_id(&best.id), ctx.style.score(best.score))
            )
        );
    }
    Ok(())
}

fn handle_delete(ctx: &Session, id: &str) -> Result<()> {
    if ctx.manager.delete_document(id)? {
        ctx.info(MessageType::Ok, &format!("Deleted '{}'", id));
    } else {
        ctx.info(MessageType::Info, &format!("No document with id '{}'", id));
    }
    Ok(())
}

fn handle_stats(ctx: &Session, json: bool) -> Result<()> {
    let stats = ctx.manager.get_collection_stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let style = ctx.style;
    println!("{}", style.section("STATS"));
    println!();
    println!("  {}", style.key_value("Collection", &stats.collection_name));
    println!("  {}", style.key_value("Backend", stats.backend_kind.as_str()));
    println!(
        "  {}",
        style.key_value("Documents", &format::format_thousands(stats.total_documents as u64))
    );
    println!("  {}", style.key_value("Dimension", &stats.dimension.to_string()));
    println!("  {}", style.key_value("Metric", stats.metric.as_str()));
    println!("  {}", style.key_value("Index", stats.index_family.as_str()));
    println!("  {}", style.key_value("Model", &stats.embedding_model_id));
    println!(
        "  {}",
        style.key_value("Storage", &ctx.manager.config().storage_path.display().to_string())
    );
    Ok(())
}

fn handle_clear(ctx: &Session) -> Result<()> {
    let before = ctx.manager.get_collection_stats()?.total_documents;
    ctx.manager.clear_collection()?;
    ctx.info(
        MessageType::Ok,
        &format!(
            "Cleared '{}' ({} removed)",
            ctx.manager.config().collection_name,
            before
        ),
    );
    Ok(())
}

fn handle_benchmark(
    ctx: &Session,
    docs: &Path,
    queries: Option<&Path>,
    json: bool,
) -> Result<()> {
    let documents = read_documents(docs)?;
    if documents.is_empty() {
        bail!("No sample documents in {}", docs.display());
    }
    let queries = match queries {
        Some(path) => read_queries(path)?,
        None => Vec::new(),
    };

    debug!(
        "Benchmarking {} documents and {} queries",
        documents.len(),
        queries.len()
    );
    let report = ctx.manager.benchmark(&documents, &queries);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", ctx.style.section("BENCHMARK"));
    println!();
    if report.is_empty() {
        println!("{}", ctx.style.message(MessageType::Warn, "No backends available."));
    } else {
        println!("{}", table::render_benchmark_table(&report));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct BackendEntry {
    backend: BackendKind,
    available: bool,
    requested: bool,
}

fn handle_backends(style: &Style, config: &VectorDbConfig, json: bool) -> Result<()> {
    let available = available_backends();

    if json {
        let entries: Vec<BackendEntry> = BackendKind::ALL
            .into_iter()
            .map(|kind| BackendEntry {
                backend: kind,
                available: is_backend_available(kind),
                requested: kind == config.backend_kind,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    // The manager would fall back when the requested backend is missing.
    let active = if is_backend_available(config.backend_kind) {
        Some(config.backend_kind)
    } else {
        available.first().copied()
    };

    println!("{}", style.section("BACKENDS"));
    println!();
    println!("{}", table::render_backends_table(&available, active));
    if active != Some(config.backend_kind) {
        println!();
        println!(
            "{}",
            style.message(
                MessageType::Hint,
                &format!("{} is not compiled into this build", config.backend_kind)
            )
        );
    }
    Ok(())
}
