//! Pattern analysis over a timeline of evaluated points.
//!
//! Three independent passes (frequency, hour-of-day, co-occurrence) are run over
//! the same timeline and combined into a [`PatternReport`].

pub mod correlation;
pub mod frequency;
pub mod render;
pub mod temporal;
pub mod timeline;

use serde::Serialize;
use tracing::info;

use self::correlation::{analyze_cooccurrence, CooccurrenceStats};
use self::frequency::{analyze_frequency, FrequencyStats};
use self::temporal::{analyze_temporal, TemporalStats};
use self::timeline::TimelineEntry;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternReport {
    pub frequency: FrequencyStats,
    pub temporal: TemporalStats,
    pub cooccurrence: CooccurrenceStats,
    pub total_points: usize,
}

/// Run all pattern passes. An empty timeline yields an empty report.
pub fn analyze_patterns(timeline: &[TimelineEntry]) -> PatternReport {
    let report = PatternReport {
        frequency: analyze_frequency(timeline),
        temporal: analyze_temporal(timeline),
        cooccurrence: analyze_cooccurrence(timeline),
        total_points: timeline.len(),
    };

    info!(
        points = report.total_points,
        metrics = report.frequency.counts.len(),
        pairs = report.cooccurrence.total_distinct_pairs,
        problematic_hours = report.temporal.problematic_hours.len(),
        "pattern analysis complete"
    );
    report
}
