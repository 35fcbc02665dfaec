//! Anomaly detection: metric catalog, rolling history and the per-point evaluator.

pub mod catalog;
pub mod evaluator;
pub mod history;

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("field `{field}` has the wrong type: expected {expected}")]
    TypeMismatch { field: String, expected: &'static str },

    #[error("unparsable timestamp: {timestamp:?}")]
    UnparsableTimestamp { timestamp: String },

    #[error("invalid thresholds for `{metric}`: {reason}")]
    InvalidThresholds { metric: String, reason: String },

    #[error("no rule defined for metric `{metric}`")]
    UnknownMetric { metric: String },
}

impl Serialize for DetectError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Severity of a finding. Only two levels exist; serialized as 3 or 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn level(&self) -> u8 {
        match self {
            Severity::Warning => 3,
            Severity::Critical => 5,
        }
    }

    /// Anything at level 4 or above counts as critical in summaries.
    pub fn is_critical(&self) -> bool {
        self.level() >= 4
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

/// Category a metric's anomalies are filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyCategory {
    Performance,
    Capacity,
    Health,
    Stability,
}

impl std::fmt::Display for AnomalyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AnomalyCategory::Performance => "performance",
            AnomalyCategory::Capacity => "capacity",
            AnomalyCategory::Health => "health",
            AnomalyCategory::Stability => "stability",
        };
        f.write_str(name)
    }
}

/// The threshold a finding was judged against.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    /// Fixed constant (absolute rules, uptime).
    Value(f64),
    /// Multiple of the rolling average at evaluation time.
    Relative { factor: f64, average: f64 },
    /// Expected status string (service checks).
    Status(String),
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Threshold::Value(v) => write!(f, "{v}"),
            Threshold::Relative { factor, average } => write!(f, "{factor:?}x avg ({average:.1})"),
            Threshold::Status(s) => f.write_str(s),
        }
    }
}

impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Threshold::Value(v) => serializer.serialize_f64(*v),
            other => serializer.collect_str(other),
        }
    }
}

/// One threshold breach for one metric on one telemetry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub metric: String,
    pub value: Value,
    pub threshold: Threshold,
    pub severity: Severity,
    pub category: AnomalyCategory,
    pub message: String,
}

/// Outcome of evaluating a single telemetry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyResult {
    pub has_anomalies: bool,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub total_count: usize,
    /// Fields that could not be evaluated; they never count as findings.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<DetectError>,
}

impl AnomalyResult {
    pub fn new(findings: Vec<Finding>, skipped: Vec<DetectError>) -> Self {
        let total_count = findings.len();
        let summary = if total_count == 0 {
            "No anomalies detected".to_string()
        } else {
            let critical = findings.iter().filter(|f| f.severity.is_critical()).count();
            format!(
                "{total_count} anomalies detected ({critical} critical, {} warning)",
                total_count - critical
            )
        };

        Self {
            has_anomalies: total_count > 0,
            findings,
            summary,
            total_count,
            skipped,
        }
    }

    pub fn critical_count(&self) -> usize {
        self.findings.iter().filter(|f| f.severity.is_critical()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.total_count - self.critical_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding(metric: &str, severity: Severity) -> Finding {
        Finding {
            metric: metric.to_string(),
            value: json!(1),
            threshold: Threshold::Value(0.0),
            severity,
            category: AnomalyCategory::Performance,
            message: String::new(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let result = AnomalyResult::new(
            vec![
                finding("cpu_usage", Severity::Critical),
                finding("latency_ms", Severity::Warning),
                finding("disk_usage", Severity::Critical),
            ],
            Vec::new(),
        );
        assert!(result.has_anomalies);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.summary, "3 anomalies detected (2 critical, 1 warning)");
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_empty_summary() {
        let result = AnomalyResult::new(Vec::new(), Vec::new());
        assert!(!result.has_anomalies);
        assert_eq!(result.summary, "No anomalies detected");
    }

    #[test]
    fn test_threshold_rendering() {
        let relative = Threshold::Relative { factor: 1.5, average: 950.0 };
        assert_eq!(relative.to_string(), "1.5x avg (950.0)");
        let doubled = Threshold::Relative { factor: 2.0, average: 1000.0 / 3.0 };
        assert_eq!(doubled.to_string(), "2.0x avg (333.3)");
        assert_eq!(serde_json::to_value(Threshold::Value(90.0)).unwrap(), json!(90.0));
        assert_eq!(serde_json::to_value(Severity::Critical).unwrap(), json!(5));
    }
}
