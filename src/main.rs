//! CodeIndex CLI - multi-language code indexing and retrieval engine.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use codeindex::cli::Commands;
use codeindex::{mcp, Config, Engine, EngineError, SearchQuery};

/// CodeIndex - code indexing and retrieval for coding assistants
#[derive(Parser)]
#[command(name = "codeindex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace root override
    #[arg(short, long, global = true)]
    workspace: Option<String>,

    /// Central index root override (default <workspace>/.indexes)
    #[arg(long, global = true)]
    index_root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // MCP_DEBUG raises verbosity like --verbose; RUST_LOG wins when set.
    let debug = cli.verbose || std::env::var("MCP_DEBUG").map(|v| v == "1").unwrap_or(false);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_code_for(&e)
        }
    }
}

/// 0 normal; 2 bad CLI (clap's own exit); 3 no index found; 4 corruption.
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if let Some(engine_error) = error.downcast_ref::<EngineError>() {
        if engine_error.is_corruption() {
            return ExitCode::from(4);
        }
        if engine_error.is_not_found() {
            return ExitCode::from(3);
        }
    }
    ExitCode::FAILURE
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::from_env();
    if let Some(ref workspace) = cli.workspace {
        config.workspace_root = Some(PathBuf::from(workspace));
    }
    if let Some(ref root) = cli.index_root {
        config.central_index_root = Some(PathBuf::from(root));
    }
    config
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = build_config(&cli);

    match cli.command {
        Commands::Index { path, no_plugins } => {
            if let Some(path) = path {
                config.workspace_root = Some(PathBuf::from(path));
            }
            let engine = if no_plugins {
                Engine::open_degraded(config).await?
            } else {
                Engine::open(config).await?
            };

            let report = engine.index_with_progress().await?;
            println!(
                "Indexed {} files ({} unreadable, {} failed) into {}",
                report.indexed,
                report.skipped_unreadable,
                report.failed.len(),
                engine.artifact_path().display()
            );
            for failure in report.failed.iter().take(10) {
                println!("  failed {} at {:?}: {}", failure.path, failure.stage, failure.reason);
            }
        }

        Commands::Search {
            query,
            limit,
            offset,
            semantic,
        } => {
            let engine = Engine::open_existing(config).await?;
            let results = engine
                .search(
                    SearchQuery::new(&query)
                        .with_limit(limit)
                        .with_offset(offset)
                        .with_semantic(semantic),
                )
                .await?;

            if results.is_empty() {
                println!("No results found.");
            } else {
                println!("Found {} results:\n", results.len());
                for (i, hit) in results.iter().enumerate() {
                    println!("{}. {}:{} (score: {:.3})", i + 1, hit.file, hit.line, hit.score);
                    println!("   {}", hit.snippet.replace('\n', " "));
                    println!();
                }
            }
        }

        Commands::Lookup { symbol } => {
            let engine = Engine::open_existing(config).await?;
            match engine.lookup(&symbol).await? {
                Some(hit) => {
                    println!("{} ({})", hit.symbol, hit.kind);
                    println!("  {}:{}", hit.defined_in, hit.line);
                    println!("  {}", hit.signature);
                    if let Some(doc) = hit.doc {
                        println!("  {}", doc.replace('\n', "\n  "));
                    }
                }
                None => println!("Symbol not found: {}", symbol),
            }
        }

        Commands::Refs { symbol } => {
            let engine = Engine::open_existing(config).await?;
            let references = engine.find_references(&symbol).await?;
            if references.is_empty() {
                println!("No references found for {}", symbol);
            } else {
                for reference in references {
                    println!(
                        "{}:{}:{} ({})",
                        reference.relative_path, reference.line, reference.column, reference.kind
                    );
                }
            }
        }

        Commands::Status => {
            let engine = Engine::open_existing(config).await?;
            let status = engine.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Export { output } => {
            let engine = Engine::open_existing(config).await?;
            let output = output
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}-index.tar.gz", engine.fingerprint())));

            let report = engine.export(&output).await?;
            println!(
                "Exported {} ({} files kept, {} dropped)",
                report.archive_path.display(),
                report.files_kept,
                report.files_dropped
            );
            println!("  sha256: {}", report.archive_sha256);
        }

        Commands::Watch => {
            let engine = Arc::new(Engine::open(config).await?);
            let report = engine.reindex(None, None).await?;
            println!("Initial index: {} files", report.indexed);

            let watcher = engine
                .start_watcher()?
                .ok_or_else(|| anyhow::anyhow!("Watcher is disabled in configuration"))?;
            println!("Watching {} (ctrl-c to stop)", engine.workspace().display());
            tokio::signal::ctrl_c().await?;
            watcher.shutdown();
        }

        Commands::Mcp => {
            let engine = Arc::new(Engine::open(config).await?);
            mcp::serve_stdio(engine).await?;
        }
    }

    Ok(())
}
