//! pubtrends - Biomedical Literature Trend Pipeline
//!
//! Aggregates the extracted-term store into dashboard artifacts and serves them.
//!
//! ## Usage
//!
//! ### Pipeline Mode
//! ```bash
//! pubtrends run --store data/term_category_backtrack.json --output data
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! pubtrends serve --data-dir data --port 5000
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pubtrends::{
    lookup,
    pipeline::{self, PipelineConfig, DEFAULT_CUTOFF_YEAR},
    server::{self, AppState},
    store::TermStore,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Biomedical Literature Trend Pipeline
#[derive(Parser)]
#[command(name = "pubtrends")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the term store and publish dashboard artifacts
    Run {
        /// Term store (JSON object of term -> record)
        #[arg(long, default_value = "data/term_category_backtrack.json")]
        store: PathBuf,

        /// Output directory for artifacts
        #[arg(short, long, default_value = "data")]
        output: PathBuf,

        /// Last year included in dashboard outputs
        #[arg(long, default_value_t = DEFAULT_CUTOFF_YEAR)]
        cutoff: i32,

        /// Ignore reference years before this one
        #[arg(long)]
        min_year: Option<i32>,

        /// Keywords kept per category
        #[arg(long, default_value = "30")]
        top_n: usize,

        /// Keywords in the flat ranking and dashboard summary
        #[arg(long, default_value = "10")]
        global_top_n: usize,

        /// Co-occurring terms kept
        #[arg(long, default_value = "50")]
        co_top_k: usize,

        /// Recent abstracts kept
        #[arg(long, default_value = "10")]
        recent_k: usize,

        /// Store partitions aggregated in parallel
        #[arg(long, default_value = "1")]
        shards: usize,
    },

    /// Run as HTTP server over published artifacts
    Serve {
        /// Directory holding published artifacts
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Port to listen on
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Last year served by year-filtered routes
        #[arg(long, default_value_t = DEFAULT_CUTOFF_YEAR)]
        cutoff: i32,
    },

    /// Print the references of one term with PubMed links
    Refs {
        /// Term to look up (exact, lower-case as extracted)
        keyword: String,

        /// Term store
        #[arg(long, default_value = "data/term_category_backtrack.json")]
        store: PathBuf,

        /// Maximum references printed
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Print a sample of terms from the store
    Inspect {
        /// Term store
        #[arg(long, default_value = "data/term_category_backtrack.json")]
        store: PathBuf,

        /// Number of terms to print
        #[arg(long, default_value = "5")]
        sample: usize,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Run {
            store,
            output,
            cutoff,
            min_year,
            top_n,
            global_top_n,
            co_top_k,
            recent_k,
            shards,
        } => {
            let config = PipelineConfig {
                cutoff_year: cutoff,
                min_year,
                category_top_n: top_n,
                global_top_n,
                cooccurrence_top_k: co_top_k,
                recent_k,
                shards,
            };
            run_pipeline(store, output, config).await
        }
        Commands::Serve {
            data_dir,
            port,
            host,
            cutoff,
        } => run_server(host, port, data_dir, cutoff).await,
        Commands::Refs {
            keyword,
            store,
            limit,
        } => print_references(store, keyword, limit).await,
        Commands::Inspect { store, sample } => print_sample(store, sample).await,
    }
}

// ============================================================================
// Pipeline
// ============================================================================

async fn run_pipeline(
    store_path: PathBuf,
    output_dir: PathBuf,
    config: PipelineConfig,
) -> Result<()> {
    let store = TermStore::new(&store_path);
    println!("Streaming terms from: {}", store_path.display());

    let manifest = pipeline::run(&store, &output_dir, &config)
        .await
        .context("Pipeline run failed, previous artifacts left untouched")?;

    println!(
        "Aggregated {} terms ({} malformed skipped) over years {:?}",
        manifest.terms_read, manifest.malformed_records, manifest.years
    );
    for artifact in &manifest.artifacts {
        println!("Saved: {}", output_dir.join(artifact).display());
    }
    println!("\n✓ Pipeline complete. Results in: {}", output_dir.display());
    Ok(())
}

// ============================================================================
// Store Queries
// ============================================================================

async fn print_references(store_path: PathBuf, keyword: String, limit: usize) -> Result<()> {
    let store = TermStore::new(store_path);
    let lookup_keyword = keyword.clone();
    let found = tokio::task::spawn_blocking(move || {
        lookup::find_references(&store, &lookup_keyword, limit)
    })
    .await
    .context("Lookup worker failed")??;

    match found {
        Some(links) if !links.is_empty() => {
            println!("References for '{}':", keyword);
            for link in links {
                let year = link.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
                println!("  {} ({}) {}", link.pmid, year, link.link);
            }
        }
        Some(_) => println!("'{}' has no references with a PMID.", keyword),
        None => println!("'{}' not found in store.", keyword),
    }
    Ok(())
}

async fn print_sample(store_path: PathBuf, sample: usize) -> Result<()> {
    let store = TermStore::new(store_path);
    let samples = tokio::task::spawn_blocking(move || lookup::sample_terms(&store, sample))
        .await
        .context("Sample worker failed")??;

    println!("Sample categorized terms with reference count:\n");
    for s in samples {
        println!("Term: {}", s.term);
        println!("  Category: {}", s.category);
        println!("  Count: {}", s.count);
        println!("  References: {}", s.references);
        println!("  Sample PMID: {}\n", s.sample_pmid.as_deref().unwrap_or("N/A"));
    }
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, data_dir: PathBuf, cutoff_year: i32) -> Result<()> {
    info!(host = %host, port = port, data_dir = %data_dir.display(), "Starting HTTP server");
    println!("Starting server at http://{}:{}", host, port);

    let app_state = Arc::new(AppState {
        data_dir,
        cutoff_year,
    });
    let app = server::router(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
