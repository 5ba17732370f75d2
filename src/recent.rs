//! Recent-Abstracts Selector.
//!
//! Keeps the K most recent references (by year, ≤ cutoff) that carry a PMID.
//! Equal years keep store encounter order. Only K candidates are ever
//! retained, however many references the store holds.

use crate::pipeline::TermReducer;
use crate::store::StoreEntry;
use crate::topk::{Ranked, TopK};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Ranking key: later year first, then earlier (entry ordinal, reference index)
type RecencyKey = (i32, Reverse<(u64, usize)>);

/// One row of `recent_abstracts.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAbstract {
    pub title: String,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "PMID")]
    pub pmid: String,
}

/// Reducer selecting the most recent references
#[derive(Debug, Clone)]
pub struct RecentAbstractsAccumulator {
    cutoff_year: i32,
    min_year: Option<i32>,
    top: TopK<Ranked<RecencyKey, RecentAbstract>>,
}

impl RecentAbstractsAccumulator {
    pub fn new(k: usize, cutoff_year: i32, min_year: Option<i32>) -> Self {
        Self {
            cutoff_year,
            min_year,
            top: TopK::new(k),
        }
    }

    fn admits(&self, key: &RecencyKey) -> bool {
        if !self.top.is_full() {
            return self.top.capacity() > 0;
        }
        self.top.peek_min().map(|min| *key > min.key).unwrap_or(false)
    }
}

impl TermReducer for RecentAbstractsAccumulator {
    type Output = Vec<RecentAbstract>;

    fn observe(&mut self, entry: &StoreEntry) {
        for (idx, reference) in entry.record.references.iter().enumerate() {
            let (Some(pmid), Some(year)) = (&reference.pmid, reference.valid_year(self.min_year))
            else {
                continue;
            };
            if year > self.cutoff_year {
                continue;
            }
            let key = (year, Reverse((entry.ordinal, idx)));
            if !self.admits(&key) {
                continue;
            }
            let title = reference
                .title
                .clone()
                .unwrap_or_else(|| entry.term.clone());
            self.top.push(Ranked::new(
                key,
                RecentAbstract {
                    title,
                    year,
                    pmid: pmid.clone(),
                },
            ));
        }
    }

    fn merge(&mut self, other: Self) {
        self.top.merge(other.top);
    }

    fn finish(self) -> Vec<RecentAbstract> {
        self.top
            .into_sorted_vec()
            .into_iter()
            .map(|r| r.value)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Reference, TermRecord};

    fn reference(pmid: Option<&str>, year: Option<i32>) -> Reference {
        Reference {
            pmid: pmid.map(str::to_string),
            year,
            ..Default::default()
        }
    }

    fn entry(ordinal: u64, term: &str, references: Vec<Reference>) -> StoreEntry {
        StoreEntry {
            ordinal,
            term: term.to_string(),
            record: TermRecord {
                count: references.len() as u64,
                references,
                ..Default::default()
            },
        }
    }

    fn select(k: usize, entries: &[StoreEntry]) -> Vec<RecentAbstract> {
        let mut acc = RecentAbstractsAccumulator::new(k, 2024, None);
        for e in entries {
            acc.observe(e);
        }
        acc.finish()
    }

    #[test]
    fn test_picks_most_recent_first() {
        let entries = vec![entry(
            0,
            "gene",
            vec![
                reference(Some("P1"), Some(2014)),
                reference(Some("P2"), Some(2020)),
                reference(Some("P3"), Some(2017)),
            ],
        )];
        let picked = select(2, &entries);
        let pmids: Vec<&str> = picked.iter().map(|r| r.pmid.as_str()).collect();
        assert_eq!(pmids, vec!["P2", "P3"]);
        assert_eq!(picked[0].title, "gene");
    }

    #[test]
    fn test_filters_missing_pmid_year_and_cutoff() {
        let entries = vec![entry(
            0,
            "crispr",
            vec![
                reference(None, Some(2023)),
                reference(Some("P1"), None),
                reference(Some("P2"), Some(2025)),
                reference(Some("P3"), Some(2016)),
            ],
        )];
        let picked = select(10, &entries);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].pmid, "P3");
    }

    #[test]
    fn test_equal_years_keep_encounter_order() {
        let entries = vec![
            entry(0, "a", vec![reference(Some("1"), Some(2020))]),
            entry(1, "b", vec![reference(Some("2"), Some(2021)), reference(Some("3"), Some(2021))]),
            entry(2, "c", vec![reference(Some("4"), Some(2021))]),
        ];
        let pmids: Vec<String> = select(3, &entries).into_iter().map(|r| r.pmid).collect();
        assert_eq!(pmids, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_title_carried_through() {
        let mut with_title = reference(Some("9"), Some(2022));
        with_title.title = Some("Deep learning for ECG".to_string());
        let picked = select(1, &[entry(0, "ecg", vec![with_title])]);
        assert_eq!(picked[0].title, "Deep learning for ECG");
    }

    #[test]
    fn test_empty_title_is_kept() -> serde_json::Result<()> {
        let blank: Reference = serde_json::from_str(r#"{"PMID": "9", "Year": 2022, "title": ""}"#)?;
        let picked = select(1, &[entry(0, "ecg", vec![blank])]);
        assert_eq!(picked[0].title, "");
        Ok(())
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let entries: Vec<StoreEntry> = (0..30u64)
            .map(|i| {
                entry(
                    i,
                    &format!("t{}", i),
                    vec![reference(Some(&i.to_string()), Some(2015 + (i % 7) as i32))],
                )
            })
            .collect();
        let whole = select(5, &entries);

        let mut left = RecentAbstractsAccumulator::new(5, 2024, None);
        let mut right = RecentAbstractsAccumulator::new(5, 2024, None);
        for e in &entries {
            if e.ordinal % 2 == 0 {
                left.observe(e);
            } else {
                right.observe(e);
            }
        }
        left.merge(right);
        assert_eq!(left.finish(), whole);
    }
}
