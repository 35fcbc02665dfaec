//! Co-occurrence of misbehaving metrics within the same point.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::timeline::TimelineEntry;

/// Number of pairs reported in `most_common`.
pub const TOP_PAIRS: usize = 5;

/// Unordered metric pair, stored in lexicographic order so (A,B) == (B,A).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricPair(String, String);

impl MetricPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }
}

impl std::fmt::Display for MetricPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.0, self.1)
    }
}

impl Serialize for MetricPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairCount {
    pub pair: MetricPair,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CooccurrenceStats {
    pub pairs: IndexMap<MetricPair, usize>,
    /// Top pairs by count; ties keep first-seen order.
    pub most_common: Vec<PairCount>,
    pub total_distinct_pairs: usize,
}

pub fn analyze_cooccurrence(timeline: &[TimelineEntry]) -> CooccurrenceStats {
    let mut pairs: IndexMap<MetricPair, usize> = IndexMap::new();

    for entry in timeline {
        let metrics = entry.distinct_metrics();
        for (i, a) in metrics.iter().enumerate() {
            for b in &metrics[i + 1..] {
                *pairs.entry(MetricPair::new(*a, *b)).or_default() += 1;
            }
        }
    }

    let mut most_common: Vec<PairCount> = pairs
        .iter()
        .map(|(pair, &count)| PairCount {
            pair: pair.clone(),
            count,
        })
        .collect();
    // Stable sort keeps insertion order among equal counts.
    most_common.sort_by(|a, b| b.count.cmp(&a.count));
    most_common.truncate(TOP_PAIRS);

    CooccurrenceStats {
        total_distinct_pairs: pairs.len(),
        pairs,
        most_common,
    }
}
