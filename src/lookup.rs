//! Ad-hoc queries against the term store.
//!
//! These stream the store the same way the pipeline does and stop as soon
//! as they have their answer.

use crate::error::Result;
use crate::store::TermStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A reference of a term, with its PubMed link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLink {
    #[serde(rename = "PMID")]
    pub pmid: String,
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    pub link: String,
}

/// Summary line for one term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSample {
    pub term: String,
    pub category: String,
    pub count: u64,
    pub references: usize,
    pub sample_pmid: Option<String>,
}

/// Up to `limit` PMID-bearing references of `keyword`.
///
/// Returns `None` when the store has no such term.
pub fn find_references(
    store: &TermStore,
    keyword: &str,
    limit: usize,
) -> Result<Option<Vec<ReferenceLink>>> {
    let keyword = keyword.trim();
    for item in store.open()? {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Skipping malformed record");
                continue;
            }
            Err(e) => return Err(e),
        };
        if entry.term != keyword {
            continue;
        }
        debug!(term = keyword, ordinal = entry.ordinal, "Found term");
        let links = entry
            .record
            .references
            .iter()
            .filter_map(|r| {
                Some(ReferenceLink {
                    pmid: r.pmid.clone()?,
                    year: r.year,
                    link: r.link()?,
                })
            })
            .take(limit)
            .collect();
        return Ok(Some(links));
    }
    Ok(None)
}

/// The first `n` terms that have at least one reference, in store order.
pub fn sample_terms(store: &TermStore, n: usize) -> Result<Vec<TermSample>> {
    let mut samples = Vec::with_capacity(n);
    if n == 0 {
        return Ok(samples);
    }
    for item in store.open()? {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) if e.is_recoverable() => continue,
            Err(e) => return Err(e),
        };
        if entry.record.references.is_empty() {
            continue;
        }
        samples.push(TermSample {
            sample_pmid: entry.record.references[0].pmid.clone(),
            references: entry.record.references.len(),
            term: entry.term,
            category: entry.record.category,
            count: entry.record.count,
        });
        if samples.len() == n {
            break;
        }
    }
    Ok(samples)
}
