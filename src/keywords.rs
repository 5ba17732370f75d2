//! Keyword/Sparkline Aggregator.
//!
//! Ranks terms by `count` within each category and across the whole store,
//! keeping only the configured top-N per ranking. Ties fall back to store
//! order (earlier entry first), so output is reproducible for a given store
//! and identical whether the store is read in one pass or in shards.
//!
//! Year counts are kept sparse during the pass; sparklines are materialised
//! afterwards against the year axis of the trend matrix.
//!
//! The published `top_terms.json` holds both rankings, so a category filter
//! is answered from that category's own list (up to `category_top_n` terms)
//! and never from the truncated flat ranking.

use crate::pipeline::TermReducer;
use crate::record::Reference;
use crate::store::StoreEntry;
use crate::topk::{Ranked, TopK};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// References carried per ranked term
pub const TERM_REFERENCE_LIMIT: usize = 10;

/// Ranking key: higher count first, then earlier store position
type RankKey = (u64, Reverse<u64>);

type RankedTerm = Ranked<RankKey, KeywordCandidate>;

/// A term retained by a ranking, with its sparse per-year counts
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordCandidate {
    pub term: String,
    pub category: String,
    pub count: u64,
    pub ordinal: u64,
    pub year_counts: BTreeMap<i32, u64>,
    /// First [`TERM_REFERENCE_LIMIT`] references in store order
    pub references: Vec<Reference>,
}

impl KeywordCandidate {
    /// Per-year counts aligned to `axis`, 0 where the term has no references.
    pub fn sparkline(&self, axis: &[i32]) -> Vec<u64> {
        axis.iter()
            .map(|year| self.year_counts.get(year).copied().unwrap_or(0))
            .collect()
    }

    fn to_top_term(&self) -> TopTerm {
        TopTerm {
            term: self.term.clone(),
            count: self.count,
            category: self.category.clone(),
            references: self.references.clone(),
        }
    }
}

/// Keyword with its sparkline, as published per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub term: String,
    pub count: u64,
    pub sparkline: Vec<u64>,
}

/// Top keywords of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub category: String,
    pub keywords: Vec<KeywordEntry>,
}

/// Ranked term as served by `/top_terms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopTerm {
    pub term: String,
    pub count: u64,
    pub category: String,
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// Ranked terms of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTopTerms {
    pub category: String,
    pub terms: Vec<TopTerm>,
}

/// `top_terms.json` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopTermsDocument {
    /// Flat ranking ignoring category, `global_top_n` long
    pub global: Vec<TopTerm>,
    /// Per-category rankings, `category_top_n` long each
    pub categories: Vec<CategoryTopTerms>,
}

impl TopTermsDocument {
    /// Ranking for `category`, or the flat ranking when no category is given.
    ///
    /// An unknown category has no terms.
    pub fn ranking(&self, category: Option<&str>) -> &[TopTerm] {
        match category {
            None => &self.global,
            Some(name) => self
                .categories
                .iter()
                .find(|c| c.category == name)
                .map(|c| c.terms.as_slice())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
struct CategoryBucket {
    first_ordinal: u64,
    top: TopK<RankedTerm>,
}

/// Reducer ranking terms per category and globally
#[derive(Debug, Clone)]
pub struct KeywordAccumulator {
    category_top_n: usize,
    min_year: Option<i32>,
    buckets: HashMap<String, CategoryBucket>,
    global: TopK<RankedTerm>,
}

impl KeywordAccumulator {
    pub fn new(category_top_n: usize, global_top_n: usize, min_year: Option<i32>) -> Self {
        Self {
            category_top_n,
            min_year,
            buckets: HashMap::new(),
            global: TopK::new(global_top_n),
        }
    }
}

impl TermReducer for KeywordAccumulator {
    type Output = KeywordRanking;

    fn observe(&mut self, entry: &StoreEntry) {
        let record = &entry.record;
        if record.count == 0 || record.references.is_empty() {
            return;
        }

        let mut year_counts = BTreeMap::new();
        for year in record
            .references
            .iter()
            .filter_map(|r| r.valid_year(self.min_year))
        {
            *year_counts.entry(year).or_insert(0u64) += 1;
        }

        let candidate = KeywordCandidate {
            term: entry.term.clone(),
            category: record.category.clone(),
            count: record.count,
            ordinal: entry.ordinal,
            year_counts,
            references: record
                .references
                .iter()
                .take(TERM_REFERENCE_LIMIT)
                .cloned()
                .collect(),
        };
        let key = (record.count, Reverse(entry.ordinal));

        self.global.push(Ranked::new(key, candidate.clone()));

        let top_n = self.category_top_n;
        let bucket = self
            .buckets
            .entry(record.category.clone())
            .or_insert_with(|| CategoryBucket {
                first_ordinal: entry.ordinal,
                top: TopK::new(top_n),
            });
        bucket.first_ordinal = bucket.first_ordinal.min(entry.ordinal);
        bucket.top.push(Ranked::new(key, candidate));
    }

    fn merge(&mut self, other: Self) {
        self.global.merge(other.global);
        for (category, theirs) in other.buckets {
            match self.buckets.get_mut(&category) {
                Some(ours) => {
                    ours.first_ordinal = ours.first_ordinal.min(theirs.first_ordinal);
                    ours.top.merge(theirs.top);
                }
                None => {
                    self.buckets.insert(category, theirs);
                }
            }
        }
    }

    fn finish(self) -> KeywordRanking {
        let mut buckets: Vec<(String, CategoryBucket)> = self.buckets.into_iter().collect();
        buckets.sort_by_key(|(_, bucket)| bucket.first_ordinal);

        let categories = buckets
            .into_iter()
            .map(|(category, bucket)| {
                let terms = bucket
                    .top
                    .into_sorted_vec()
                    .into_iter()
                    .map(|ranked| ranked.value)
                    .collect();
                (category, terms)
            })
            .collect();

        let global = self
            .global
            .into_sorted_vec()
            .into_iter()
            .map(|ranked| ranked.value)
            .collect();

        KeywordRanking { categories, global }
    }
}

/// Finished keyword rankings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordRanking {
    /// Categories in order of first appearance, each with its ranked terms
    pub categories: Vec<(String, Vec<KeywordCandidate>)>,
    /// Flat ranking ignoring category
    pub global: Vec<KeywordCandidate>,
}

impl KeywordRanking {
    /// Ranked terms of one category
    pub fn category(&self, name: &str) -> Option<&[KeywordCandidate]> {
        self.categories
            .iter()
            .find(|(category, _)| category == name)
            .map(|(_, terms)| terms.as_slice())
    }

    /// Per-category keyword lists with sparklines aligned to `axis`.
    pub fn sparklines(&self, axis: &[i32]) -> Vec<CategoryKeywords> {
        self.categories
            .iter()
            .map(|(category, terms)| CategoryKeywords {
                category: category.clone(),
                keywords: terms
                    .iter()
                    .map(|c| KeywordEntry {
                        term: c.term.clone(),
                        count: c.count,
                        sparkline: c.sparkline(axis),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Both rankings in published form
    pub fn top_terms(&self) -> TopTermsDocument {
        TopTermsDocument {
            global: self.global.iter().map(KeywordCandidate::to_top_term).collect(),
            categories: self
                .categories
                .iter()
                .map(|(category, terms)| CategoryTopTerms {
                    category: category.clone(),
                    terms: terms.iter().map(KeywordCandidate::to_top_term).collect(),
                })
                .collect(),
        }
    }
}
