//! Streaming aggregation pipeline.
//!
//! The four reducers (trends, keywords, co-occurrence, recent abstracts) are
//! fused into one [`ReducerBundle`] and driven by a single pass over the term
//! store. With more than one shard, each shard gets its own bundle on a
//! blocking worker, and the partial bundles are merged once all finish.
//! Summary and forecast are then derived from the merged trend matrix.

use crate::cooccurrence::{CoOccurrenceAccumulator, CoOccurrenceRanking, CoOccurrenceTerms};
use crate::error::{Result, TrendsError};
use crate::keywords::{CategoryKeywords, KeywordAccumulator, KeywordRanking, TopTermsDocument};
use crate::output::{self, Manifest};
use crate::recent::{RecentAbstract, RecentAbstractsAccumulator};
use crate::store::{ShardSpec, StoreEntry, TermStore};
use crate::summary::{self, CategoryShare, DashboardSummary, Forecast};
use crate::trends::{CategoryYearMatrix, TrendAccumulator, TrendTable};
use futures::future::join_all;
use std::path::Path;
use tracing::{debug, info, warn};

/// Log progress every this many terms
pub const PROGRESS_EVERY: u64 = 10_000;

/// Fixed upper year for dashboard-facing derivations
pub const DEFAULT_CUTOFF_YEAR: i32 = 2024;

/// A fold over store entries whose partial states merge associatively.
///
/// `merge` must give the same result as observing both inputs in one
/// accumulator, in any order, which is what makes sharded runs equivalent
/// to a single pass.
pub trait TermReducer {
    type Output;

    fn observe(&mut self, entry: &StoreEntry);

    fn merge(&mut self, other: Self)
    where
        Self: Sized;

    fn finish(self) -> Self::Output;
}

/// Pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Last year included in dashboard-facing outputs
    pub cutoff_year: i32,
    /// References before this year are treated as having no year
    pub min_year: Option<i32>,
    /// Keywords kept per category
    pub category_top_n: usize,
    /// Keywords kept in the flat ranking and in the summary
    pub global_top_n: usize,
    /// Co-occurring terms kept
    pub cooccurrence_top_k: usize,
    /// Recent abstracts kept
    pub recent_k: usize,
    /// Number of store partitions aggregated in parallel
    pub shards: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cutoff_year: DEFAULT_CUTOFF_YEAR,
            min_year: None,
            category_top_n: 30,
            global_top_n: 10,
            cooccurrence_top_k: 50,
            recent_k: 10,
            shards: 1,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(TrendsError::Config("shards must be at least 1".to_string()));
        }
        for (name, value) in [
            ("category_top_n", self.category_top_n),
            ("global_top_n", self.global_top_n),
            ("cooccurrence_top_k", self.cooccurrence_top_k),
            ("recent_k", self.recent_k),
        ] {
            if value == 0 {
                return Err(TrendsError::Config(format!("{} must be at least 1", name)));
            }
        }
        if let Some(min) = self.min_year {
            if min > self.cutoff_year {
                return Err(TrendsError::Config(format!(
                    "min_year {} is after cutoff_year {}",
                    min, self.cutoff_year
                )));
            }
        }
        Ok(())
    }
}

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub terms_read: u64,
    pub malformed_records: u64,
}

/// All reducers fused over one stream
#[derive(Debug, Clone)]
pub struct ReducerBundle {
    trends: TrendAccumulator,
    keywords: KeywordAccumulator,
    cooccurrence: CoOccurrenceAccumulator,
    recent: RecentAbstractsAccumulator,
    stats: PassStats,
}

/// Merged reducer outputs of a full run
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    /// Full year range, not cut off
    pub matrix: CategoryYearMatrix,
    pub keywords: KeywordRanking,
    pub cooccurrence: CoOccurrenceRanking,
    pub recent: Vec<RecentAbstract>,
    pub stats: PassStats,
}

impl ReducerBundle {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            trends: TrendAccumulator::new(config.min_year),
            keywords: KeywordAccumulator::new(
                config.category_top_n,
                config.global_top_n,
                config.min_year,
            ),
            cooccurrence: CoOccurrenceAccumulator::new(config.cooccurrence_top_k),
            recent: RecentAbstractsAccumulator::new(
                config.recent_k,
                config.cutoff_year,
                config.min_year,
            ),
            stats: PassStats::default(),
        }
    }

    pub fn stats(&self) -> PassStats {
        self.stats
    }

    /// Drive the bundle over a stream.
    ///
    /// Malformed records are logged, counted and skipped; any other error
    /// aborts the pass.
    pub fn consume<I>(&mut self, stream: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<StoreEntry>>,
    {
        for item in stream {
            match item {
                Ok(entry) => {
                    self.observe(&entry);
                    if self.stats.terms_read % PROGRESS_EVERY == 0 {
                        info!(terms = self.stats.terms_read, "Processing terms");
                    }
                }
                Err(e) if e.is_recoverable() => {
                    self.stats.malformed_records += 1;
                    warn!(error = %e, "Skipping malformed record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl TermReducer for ReducerBundle {
    type Output = Aggregates;

    fn observe(&mut self, entry: &StoreEntry) {
        self.stats.terms_read += 1;
        self.trends.observe(entry);
        self.keywords.observe(entry);
        self.cooccurrence.observe(entry);
        self.recent.observe(entry);
    }

    fn merge(&mut self, other: Self) {
        self.trends.merge(other.trends);
        self.keywords.merge(other.keywords);
        self.cooccurrence.merge(other.cooccurrence);
        self.recent.merge(other.recent);
        self.stats.terms_read += other.stats.terms_read;
        self.stats.malformed_records += other.stats.malformed_records;
    }

    fn finish(self) -> Aggregates {
        Aggregates {
            matrix: self.trends.finish(),
            keywords: self.keywords.finish(),
            cooccurrence: self.cooccurrence.finish(),
            recent: self.recent.finish(),
            stats: self.stats,
        }
    }
}

/// Aggregate one shard of the store in a single pass.
pub fn aggregate_shard(
    store: &TermStore,
    config: &PipelineConfig,
    shard: ShardSpec,
) -> Result<ReducerBundle> {
    let mut bundle = ReducerBundle::new(config);
    bundle.consume(store.open_shard(shard)?)?;
    debug!(
        shard = shard.index(),
        of = shard.count(),
        terms = bundle.stats.terms_read,
        malformed = bundle.stats.malformed_records,
        "Shard aggregated"
    );
    Ok(bundle)
}

/// Aggregate the whole store in one pass on the current thread.
pub fn aggregate(store: &TermStore, config: &PipelineConfig) -> Result<Aggregates> {
    config.validate()?;
    Ok(aggregate_shard(store, config, ShardSpec::whole())?.finish())
}

/// Aggregate the store with `config.shards` blocking workers and merge.
pub async fn aggregate_sharded(store: &TermStore, config: &PipelineConfig) -> Result<Aggregates> {
    config.validate()?;
    info!(
        store = %store.path().display(),
        shards = config.shards,
        "Starting term aggregation"
    );

    let mut handles = Vec::with_capacity(config.shards);
    for index in 0..config.shards {
        let shard = ShardSpec::new(index, config.shards)?;
        let store = store.clone();
        let config = config.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            aggregate_shard(&store, &config, shard)
        }));
    }

    let mut merged: Option<ReducerBundle> = None;
    for joined in join_all(handles).await {
        let bundle = joined.map_err(|e| TrendsError::Worker(e.to_string()))??;
        match merged.as_mut() {
            Some(acc) => acc.merge(bundle),
            None => merged = Some(bundle),
        }
    }
    let merged = merged.unwrap_or_else(|| ReducerBundle::new(config));

    let stats = merged.stats();
    info!(
        terms = stats.terms_read,
        malformed = stats.malformed_records,
        "Term aggregation complete"
    );
    Ok(merged.finish())
}

/// Everything a run publishes
#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub trend_table: TrendTable,
    /// `None` when no category has data up to the cutoff
    pub summary: Option<DashboardSummary>,
    /// `None` when no year has data up to the cutoff
    pub forecast: Option<Forecast>,
    pub keywords: Vec<CategoryKeywords>,
    pub top_terms: TopTermsDocument,
    pub cooccurrence: CoOccurrenceTerms,
    pub recent: Vec<RecentAbstract>,
    pub distribution: Vec<CategoryShare>,
    pub manifest: Manifest,
}

/// Turn reducer outputs into publishable artifacts.
pub fn derive_artifacts(
    aggregates: &Aggregates,
    config: &PipelineConfig,
    store: &TermStore,
) -> Artifacts {
    let dashboard = aggregates.matrix.restrict_to(config.cutoff_year);
    let axis = dashboard.years();

    let summary = unavailable_as_none(
        "dashboard summary",
        summary::build_summary(&dashboard, &aggregates.keywords, config.global_top_n),
    );
    let forecast = unavailable_as_none("forecast", summary::build_forecast(&dashboard));

    Artifacts {
        trend_table: aggregates.matrix.to_table(),
        summary,
        forecast,
        keywords: aggregates.keywords.sparklines(&axis),
        top_terms: aggregates.keywords.top_terms(),
        cooccurrence: aggregates.cooccurrence.to_terms(),
        recent: aggregates.recent.clone(),
        distribution: summary::category_distribution(&dashboard),
        manifest: Manifest {
            generated_at: chrono::Utc::now().to_rfc3339(),
            store: store.path().to_path_buf(),
            terms_read: aggregates.stats.terms_read,
            malformed_records: aggregates.stats.malformed_records,
            shards: config.shards,
            cutoff_year: config.cutoff_year,
            years: axis,
            artifacts: Vec::new(),
        },
    }
}

fn unavailable_as_none<T>(what: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(artifact = what, error = %e, "Artifact unavailable");
            None
        }
    }
}

/// Full run: aggregate, derive, publish.
///
/// Nothing is written unless the whole aggregation succeeds.
pub async fn run(
    store: &TermStore,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<Manifest> {
    let aggregates = aggregate_sharded(store, config).await?;
    let artifacts = derive_artifacts(&aggregates, config, store);
    output::publish(output_dir, &artifacts)
}
