//! # pubtrends
//!
//! Biomedical Literature Trend Pipeline - streaming term aggregation
//!
//! Reads the term → category → references store produced by the extraction
//! step in one streaming pass and publishes the dashboard artifacts: the
//! category trend table, summary statistics, keyword sparklines, the
//! co-occurrence ranking, a naive forecast and the recent-abstracts feed.
//!
//! ## Modules
//!
//! - [`store`] - Streaming term store reader and shard selection
//! - [`trends`] - Category × year trend matrix
//! - [`keywords`] - Per-category keyword rankings with sparklines
//! - [`cooccurrence`] - Global co-occurrence ranking
//! - [`recent`] - Most recent abstracts
//! - [`summary`] - Dashboard statistics and forecast
//! - [`pipeline`] - Fused single-pass and sharded runs
//! - [`output`] - Atomic artifact publishing
//! - [`server`] - HTTP façade over published artifacts
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pubtrends::pipeline::{self, PipelineConfig};
//! use pubtrends::store::TermStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = TermStore::new("data/term_category_backtrack.json");
//!     let config = PipelineConfig::default();
//!     let manifest = pipeline::run(&store, std::path::Path::new("data"), &config).await?;
//!     println!("Aggregated {} terms", manifest.terms_read);
//!     Ok(())
//! }
//! ```

pub mod cooccurrence;
pub mod error;
pub mod keywords;
pub mod lookup;
pub mod output;
pub mod pipeline;
pub mod recent;
pub mod record;
pub mod server;
pub mod store;
pub mod summary;
pub mod topk;
pub mod trends;

pub use error::{Result, TrendsError};
