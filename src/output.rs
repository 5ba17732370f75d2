//! Artifact publishing.
//!
//! Every artifact is written to a temporary file in the output directory and
//! then renamed over its final name, so readers only ever see a complete
//! previous or a complete new version. A run stages all of its artifacts
//! before renaming any of them. The manifest is written last.

use crate::error::{Result, TrendsError};
use crate::pipeline::Artifacts;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const TRENDS_CSV: &str = "category_trends.csv";
pub const DASHBOARD_STATS: &str = "dashboard_stats.json";
pub const FORECAST_DATA: &str = "forecast_data.json";
pub const TOP_KEYWORDS: &str = "top_keywords_sparklines.json";
pub const TOP_TERMS: &str = "top_terms.json";
pub const CO_OCCURRENCE: &str = "keyword_co_occurrence.json";
pub const RECENT_ABSTRACTS: &str = "recent_abstracts.json";
pub const CATEGORY_DISTRIBUTION: &str = "category_distribution.json";
pub const MANIFEST: &str = "manifest.json";

/// Record of one completed run, `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// RFC 3339 timestamp of the run
    pub generated_at: String,
    pub store: PathBuf,
    pub terms_read: u64,
    pub malformed_records: u64,
    pub shards: usize,
    pub cutoff_year: i32,
    pub years: Vec<i32>,
    /// Artifacts written by this run
    pub artifacts: Vec<String>,
}

/// An artifact written to a temp file in the output directory, not yet visible
/// under its final name. Dropping it deletes the temp file.
pub struct StagedArtifact {
    name: String,
    temp: NamedTempFile,
}

impl StagedArtifact {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the temp file over `dir/name`.
    pub fn commit(self, dir: &Path) -> Result<PathBuf> {
        let target = dir.join(&self.name);
        self.temp.persist(&target).map_err(|e| e.error)?;
        debug!(path = %target.display(), "Published artifact");
        Ok(target)
    }
}

/// Write `contents` to a temp file in `dir`, to be committed as `name`.
pub fn stage<F>(dir: &Path, name: &str, contents: F) -> Result<StagedArtifact>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        contents(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    Ok(StagedArtifact {
        name: name.to_string(),
        temp,
    })
}

/// Stage `value` as pretty JSON.
pub fn stage_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<StagedArtifact> {
    stage(dir, name, |w| {
        serde_json::to_writer_pretty(&mut *w, value)?;
        w.write_all(b"\n")?;
        Ok(())
    })
}

/// Write `contents` to `dir/name` via a temp file and rename.
pub fn write_atomic<F>(dir: &Path, name: &str, contents: F) -> Result<PathBuf>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    stage(dir, name, contents)?.commit(dir)
}

/// Serialize `value` as pretty JSON to `dir/name` atomically.
pub fn write_json_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    stage_json(dir, name, value)?.commit(dir)
}

/// Publish all artifacts of a run into `dir`.
///
/// Every artifact is staged first; none replaces its previous version until
/// all are written and every target name is known to be replaceable.
/// Derivations that had no data (`None`) remove any artifact a previous run
/// left under that name, so the serving layer reports them as unavailable.
pub fn publish(dir: &Path, artifacts: &Artifacts) -> Result<Manifest> {
    std::fs::create_dir_all(dir)?;

    let mut staged = vec![stage(dir, TRENDS_CSV, |w| artifacts.trend_table.write_csv(w))?];
    let mut stale = Vec::new();
    match &artifacts.summary {
        Some(summary) => staged.push(stage_json(dir, DASHBOARD_STATS, summary)?),
        None => stale.push(DASHBOARD_STATS),
    }
    match &artifacts.forecast {
        Some(forecast) => staged.push(stage_json(dir, FORECAST_DATA, forecast)?),
        None => stale.push(FORECAST_DATA),
    }
    staged.push(stage_json(dir, TOP_KEYWORDS, &artifacts.keywords)?);
    staged.push(stage_json(dir, TOP_TERMS, &artifacts.top_terms)?);
    staged.push(stage_json(dir, CO_OCCURRENCE, &artifacts.cooccurrence)?);
    staged.push(stage_json(dir, RECENT_ABSTRACTS, &artifacts.recent)?);
    staged.push(stage_json(dir, CATEGORY_DISTRIBUTION, &artifacts.distribution)?);

    for name in staged.iter().map(StagedArtifact::name).chain(stale.iter().copied()) {
        ensure_replaceable(&dir.join(name))?;
    }
    ensure_replaceable(&dir.join(MANIFEST))?;

    let mut written = Vec::with_capacity(staged.len());
    for artifact in staged {
        written.push(artifact.name().to_string());
        artifact.commit(dir)?;
    }
    for name in stale {
        remove_stale(dir, name)?;
    }

    let manifest = Manifest {
        artifacts: written,
        ..artifacts.manifest.clone()
    };
    write_json_atomic(dir, MANIFEST, &manifest)?;

    info!(
        dir = %dir.display(),
        artifacts = manifest.artifacts.len(),
        "Published dashboard artifacts"
    );
    Ok(manifest)
}

/// A rename can replace a file or nothing, never a directory.
fn ensure_replaceable(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(TrendsError::Validation(format!(
            "artifact path {} is a directory",
            path.display()
        ))),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_stale(dir: &Path, name: &str) -> Result<()> {
    let path = dir.join(name);
    if path.exists() {
        warn!(path = %path.display(), "No data for artifact, removing previous version");
        std::fs::remove_file(&path)?;
    }
    Ok(())
}
