//! Timeline construction: one evaluated record per historical point.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::detect::catalog::MetricCatalog;
use crate::detect::evaluator::AnomalyEvaluator;
use crate::detect::{AnomalyResult, Finding};
use crate::telemetry::TelemetryPoint;

/// Detached snapshot of one point's evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub timestamp: Option<String>,
    pub findings: Vec<Finding>,
    pub has_issues: bool,
    pub total_count: usize,
}

impl TimelineEntry {
    pub fn new(timestamp: Option<String>, findings: Vec<Finding>) -> Self {
        let total_count = findings.len();
        Self {
            timestamp,
            findings,
            has_issues: total_count > 0,
            total_count,
        }
    }

    pub fn from_result(timestamp: Option<&str>, result: &AnomalyResult) -> Self {
        Self::new(timestamp.map(str::to_string), result.findings.clone())
    }

    /// Distinct metrics with a finding, in order of first appearance.
    pub fn distinct_metrics(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.findings.len());
        for finding in &self.findings {
            if !seen.contains(&finding.metric.as_str()) {
                seen.push(&finding.metric);
            }
        }
        seen
    }
}

/// Build a timeline on a fresh evaluator, leaving any live history untouched.
pub fn build_timeline(catalog: Arc<MetricCatalog>, points: &[TelemetryPoint]) -> Vec<TimelineEntry> {
    AnomalyEvaluator::new(catalog).replay(points)
}

impl AnomalyEvaluator {
    /// Evaluate `points` in order on this evaluator.
    ///
    /// The rolling history carries over between points and remains updated
    /// afterwards; use [`build_timeline`] for an isolated replay.
    pub fn replay(&self, points: &[TelemetryPoint]) -> Vec<TimelineEntry> {
        let timeline: Vec<TimelineEntry> = points
            .iter()
            .map(|point| TimelineEntry::from_result(point.timestamp(), &self.evaluate(point)))
            .collect();

        let with_issues = timeline.iter().filter(|e| e.has_issues).count();
        info!(points = timeline.len(), with_issues, "timeline built");
        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn metrics(ts: &str, cpu: u32, memory: u32, latency: u32, gateway: &str) -> TelemetryPoint {
        TelemetryPoint::try_from(json!({
            "timestamp": ts,
            "cpu_usage": cpu,
            "memory_usage": memory,
            "latency_ms": latency,
            "disk_usage": 70,
            "network_in_kbps": 500,
            "network_out_kbps": 400,
            "io_wait": 2,
            "thread_count": 50,
            "active_connections": 80,
            "error_rate": 0.01,
            "uptime_seconds": 7200,
            "temperature_celsius": 65,
            "power_consumption_watts": 250,
            "service_status": {"database": "online", "api_gateway": gateway, "cache": "online"}
        }))
        .unwrap()
    }

    #[test]
    fn test_build_timeline_per_point() {
        let points = vec![
            metrics("2024-01-01T10:00:00Z", 95, 85, 100, "online"),
            metrics("2024-01-01T11:00:00Z", 75, 90, 600, "degraded"),
            metrics("2024-01-01T12:00:00Z", 70, 75, 150, "online"),
        ];

        let timeline = build_timeline(Arc::new(MetricCatalog::default()), &points);
        assert_eq!(timeline.len(), 3);

        assert_eq!(timeline[0].timestamp.as_deref(), Some("2024-01-01T10:00:00Z"));
        assert!(timeline[0].has_issues);
        assert_eq!(timeline[0].total_count, 2);

        assert!(timeline[1].has_issues);
        assert_eq!(timeline[1].total_count, 3);

        assert!(!timeline[2].has_issues);
        assert_eq!(timeline[2].total_count, 0);
    }

    #[test]
    fn test_isolated_build_does_not_touch_live_history() {
        let live = AnomalyEvaluator::default();
        let points: Vec<TelemetryPoint> = (0..4)
            .map(|i| metrics(&format!("2024-01-01T1{i}:00:00Z"), 50, 50, 100, "online"))
            .collect();

        build_timeline(Arc::new(live.catalog().clone()), &points);
        assert_eq!(live.history_summary()["network_in_kbps"].count, 0);
    }

    #[test]
    fn test_shared_replay_contaminates_live_history() {
        let live = AnomalyEvaluator::default();
        let points: Vec<TelemetryPoint> = (0..3)
            .map(|i| metrics(&format!("2024-01-01T1{i}:00:00Z"), 50, 50, 100, "online"))
            .collect();
        live.replay(&points);
        assert_eq!(live.history_summary()["network_in_kbps"].count, 3);

        // The replayed baseline of 500 now judges live traffic.
        let mut live_point = metrics("2024-01-01T13:00:00Z", 50, 50, 100, "online");
        live_point.insert("network_in_kbps", json!(1200));
        let result = live.evaluate(&live_point);
        assert!(result.findings.iter().any(|f| f.metric == "network_in_kbps"));

        // An isolated evaluator has no baseline for the same point.
        let isolated = live.fork();
        let result = isolated.evaluate(&live_point);
        assert!(result.findings.iter().all(|f| f.metric != "network_in_kbps"));
    }

    #[test]
    fn test_entries_are_detached_copies() {
        let evaluator = AnomalyEvaluator::default();
        let point = metrics("2024-01-01T10:00:00Z", 95, 50, 100, "online");
        let mut result = evaluator.evaluate(&point);
        let entry = TimelineEntry::from_result(point.timestamp(), &result);
        result.findings[0].value = Value::Null;
        assert_eq!(entry.findings[0].value, json!(95));
    }

    #[test]
    fn test_distinct_metrics_dedupes() {
        let evaluator = AnomalyEvaluator::default();
        let result = evaluator.evaluate(&TelemetryPoint::try_from(json!({
            "cpu_usage": 95, "latency_ms": 600
        })).unwrap());
        let mut entry = TimelineEntry::from_result(None, &result);
        entry.findings.push(entry.findings[0].clone());
        assert_eq!(entry.distinct_metrics(), vec!["cpu_usage", "latency_ms"]);
    }
}
