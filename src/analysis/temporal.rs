//! Hour-of-day distribution of anomaly counts.

use chrono::{DateTime, NaiveDateTime, Timelike};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::timeline::TimelineEntry;
use crate::detect::DetectError;

/// Hours whose average exceeds this multiple of the mean hourly average are flagged.
pub const PROBLEMATIC_FACTOR: f64 = 1.5;

/// ISO-8601 forms RFC 3339 rejects: minute precision or a space separator, with an offset or `Z`.
const OFFSET_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M%#z", "%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M%#z"];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourAverage {
    pub hour: u32,
    pub average: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemporalStats {
    /// Mean anomaly count per hour of day, ordered by hour.
    pub hourly_average: IndexMap<u32, f64>,
    /// Ascending.
    pub problematic_hours: Vec<u32>,
    pub peak_hour: Option<HourAverage>,
    /// Entries left out because their timestamp was missing or unparsable.
    pub skipped_entries: usize,
}

/// Hour of day as written in the timestamp; the UTC offset is kept, not normalised.
pub fn hour_of_day(timestamp: &str) -> Result<u32, DetectError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Ok(dt.hour());
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(timestamp, fmt).ok())
    {
        return Ok(dt.hour());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        .map(|dt| dt.hour())
        .ok_or_else(|| DetectError::UnparsableTimestamp {
            timestamp: timestamp.to_string(),
        })
}

pub fn analyze_temporal(timeline: &[TimelineEntry]) -> TemporalStats {
    let mut buckets: IndexMap<u32, Vec<usize>> = IndexMap::new();
    let mut skipped_entries = 0;

    for entry in timeline {
        let hour = match entry.timestamp.as_deref().map(hour_of_day) {
            Some(Ok(hour)) => hour,
            Some(Err(e)) => {
                debug!(error = %e, "skipping entry in temporal pass");
                skipped_entries += 1;
                continue;
            }
            None => {
                skipped_entries += 1;
                continue;
            }
        };
        buckets.entry(hour).or_default().push(entry.total_count);
    }

    let mut hourly_average: IndexMap<u32, f64> = buckets
        .iter()
        .map(|(hour, counts)| (*hour, counts.iter().sum::<usize>() as f64 / counts.len() as f64))
        .collect();

    let mut peak_hour: Option<HourAverage> = None;
    for (&hour, &average) in &hourly_average {
        if peak_hour.as_ref().map_or(true, |peak| average > peak.average) {
            peak_hour = Some(HourAverage { hour, average });
        }
    }

    let mut problematic_hours = Vec::new();
    if !hourly_average.is_empty() {
        let overall = hourly_average.values().sum::<f64>() / hourly_average.len() as f64;
        let threshold = overall * PROBLEMATIC_FACTOR;
        problematic_hours = hourly_average
            .iter()
            .filter(|(_, avg)| **avg > threshold)
            .map(|(&hour, _)| hour)
            .collect();
        problematic_hours.sort_unstable();
    }

    hourly_average.sort_keys();

    TemporalStats {
        hourly_average,
        problematic_hours,
        peak_hour,
        skipped_entries,
    }
}
