//! Plain-text rendering of evaluation output.
//!
//! The recommendation generator downstream consumes these blocks verbatim, so
//! the layout is stable: one `- name: value` line per item.

use serde_json::Value;

use super::PatternReport;
use crate::detect::catalog::SERVICE_STATUS_FIELD;
use crate::detect::history::{HistorySummary, HISTORY_CAPACITY};
use crate::detect::AnomalyResult;
use crate::telemetry::TelemetryPoint;

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_point(point: &TelemetryPoint) -> String {
    let mut lines = Vec::new();
    for (field, value) in point.fields() {
        match (field, value) {
            (SERVICE_STATUS_FIELD, Value::Object(services)) => {
                let services: Vec<String> = services
                    .iter()
                    .map(|(name, status)| format!("{name}:{}", plain(status)))
                    .collect();
                lines.push(format!("- {field}: {}", services.join(", ")));
            }
            _ => lines.push(format!("- {field}: {}", plain(value))),
        }
    }
    lines.join("\n")
}

pub fn render_anomalies(result: &AnomalyResult) -> String {
    if !result.has_anomalies {
        return "No anomalies detected".to_string();
    }

    let mut lines = vec![format!("Summary: {}", result.summary), String::new()];
    for finding in &result.findings {
        lines.push(format!(
            "- {}: {} (severity: {}, type: {})",
            finding.metric,
            plain(&finding.value),
            finding.severity.level(),
            finding.category
        ));
        lines.push(format!("  Message: {}", finding.message));
    }
    lines.join("\n")
}

pub fn render_history(summary: &HistorySummary) -> String {
    if summary.is_empty() {
        return "No historical data available".to_string();
    }

    let mut lines = vec![format!("Historical data (last {HISTORY_CAPACITY} values):")];
    for (metric, window) in summary {
        let Some(average) = window.average else {
            continue;
        };
        let recent: Vec<String> = window.values.iter().map(|v| v.to_string()).collect();
        lines.push(format!("- {metric}: avg={average:.1}, recent=[{}]", recent.join(", ")));
    }
    lines.join("\n")
}

pub fn render_patterns(report: &PatternReport) -> String {
    if report.total_points == 0 {
        return "No historical points analyzed".to_string();
    }

    let mut lines = vec![format!("Analyzed points: {}", report.total_points)];

    lines.push("Anomaly frequency by metric:".to_string());
    if report.frequency.counts.is_empty() {
        lines.push("- none".to_string());
    }
    for (metric, count) in &report.frequency.counts {
        let severity = report.frequency.severity_average.get(metric).copied().unwrap_or_default();
        lines.push(format!("- {metric}: {count} occurrences (avg severity {severity:.1})"));
    }

    lines.push("Hourly distribution:".to_string());
    for (hour, average) in &report.temporal.hourly_average {
        lines.push(format!("- {hour:02}h: avg {average:.2} anomalies"));
    }
    if let Some(peak) = &report.temporal.peak_hour {
        lines.push(format!("Peak hour: {:02}h ({:.2})", peak.hour, peak.average));
    }
    if !report.temporal.problematic_hours.is_empty() {
        let hours: Vec<String> = report
            .temporal
            .problematic_hours
            .iter()
            .map(|h| format!("{h:02}h"))
            .collect();
        lines.push(format!("Problematic hours: {}", hours.join(", ")));
    }

    lines.push("Most common co-occurrences:".to_string());
    if report.cooccurrence.most_common.is_empty() {
        lines.push("- none".to_string());
    }
    for pair in &report.cooccurrence.most_common {
        lines.push(format!(
            "- {} & {}: {} times",
            pair.pair.first(),
            pair.pair.second(),
            pair.count
        ));
    }

    lines.join("\n")
}
