//! Which metrics misbehave most often, and how badly.

use indexmap::IndexMap;
use serde::Serialize;

use super::timeline::TimelineEntry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCount {
    pub metric: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrequencyStats {
    /// Findings per metric, in order of first appearance.
    pub counts: IndexMap<String, usize>,
    /// Mean severity level per metric.
    pub severity_average: IndexMap<String, f64>,
    /// Highest count; the earliest-seen metric wins ties.
    pub most_frequent: Option<MetricCount>,
}

pub fn analyze_frequency(timeline: &[TimelineEntry]) -> FrequencyStats {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    let mut severity_sums: IndexMap<String, u32> = IndexMap::new();

    for finding in timeline.iter().flat_map(|e| &e.findings) {
        *counts.entry(finding.metric.clone()).or_default() += 1;
        *severity_sums.entry(finding.metric.clone()).or_default() += u32::from(finding.severity.level());
    }

    let severity_average = severity_sums
        .iter()
        .map(|(metric, sum)| (metric.clone(), f64::from(*sum) / counts[metric] as f64))
        .collect();

    let mut most_frequent: Option<MetricCount> = None;
    for (metric, &count) in &counts {
        if most_frequent.as_ref().map_or(true, |best| count > best.count) {
            most_frequent = Some(MetricCount {
                metric: metric.clone(),
                count,
            });
        }
    }

    FrequencyStats {
        counts,
        severity_average,
        most_frequent,
    }
}
