//! Co-occurrence Ranker.
//!
//! Counts every string listed in any term's `co_occurrence` (duplicates add
//! weight, self-pairs are not filtered) and ranks them by frequency, earlier
//! first appearance winning ties.

use crate::pipeline::TermReducer;
use crate::store::StoreEntry;
use crate::topk::{Ranked, TopK};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Store position of a co-term's first appearance: (entry ordinal, list index)
type FirstSeen = (u64, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CoTermStats {
    count: u64,
    first_seen: FirstSeen,
}

/// Reducer accumulating the global co-occurrence multiset
#[derive(Debug, Clone, Default)]
pub struct CoOccurrenceAccumulator {
    top_k: usize,
    stats: HashMap<String, CoTermStats>,
}

impl CoOccurrenceAccumulator {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            stats: HashMap::new(),
        }
    }

    /// Number of distinct co-terms seen so far
    pub fn distinct(&self) -> usize {
        self.stats.len()
    }
}

impl TermReducer for CoOccurrenceAccumulator {
    type Output = CoOccurrenceRanking;

    fn observe(&mut self, entry: &StoreEntry) {
        for (idx, co_term) in entry.record.co_occurrence.iter().enumerate() {
            let seen = (entry.ordinal, idx);
            match self.stats.get_mut(co_term) {
                Some(stats) => {
                    stats.count += 1;
                    stats.first_seen = stats.first_seen.min(seen);
                }
                None => {
                    self.stats.insert(
                        co_term.clone(),
                        CoTermStats {
                            count: 1,
                            first_seen: seen,
                        },
                    );
                }
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (co_term, theirs) in other.stats {
            self.stats
                .entry(co_term)
                .and_modify(|ours| {
                    ours.count += theirs.count;
                    ours.first_seen = ours.first_seen.min(theirs.first_seen);
                })
                .or_insert(theirs);
        }
    }

    fn finish(self) -> CoOccurrenceRanking {
        let mut top = TopK::new(self.top_k);
        for (co_term, stats) in self.stats {
            top.push(Ranked::new(
                (stats.count, Reverse(stats.first_seen)),
                co_term,
            ));
        }
        let ranked = top
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.value, r.key.0))
            .collect();
        CoOccurrenceRanking { ranked }
    }
}

/// Co-terms with their frequencies, most frequent first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoOccurrenceRanking {
    pub ranked: Vec<(String, u64)>,
}

impl CoOccurrenceRanking {
    /// Published form: the ranked term strings only
    pub fn to_terms(&self) -> CoOccurrenceTerms {
        CoOccurrenceTerms {
            terms: self.ranked.iter().map(|(t, _)| t.clone()).collect(),
        }
    }
}

/// `keyword_co_occurrence.json` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoOccurrenceTerms {
    pub terms: Vec<String>,
}
