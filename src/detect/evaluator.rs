//! Per-point anomaly evaluation.
//!
//! The evaluator owns one [`RollingHistory`]. Each `evaluate` call takes the
//! history lock once, judges every field, then appends the relative-rule
//! metrics, so concurrent callers never see a half-applied update.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use super::catalog::{
    AbsoluteRule, FieldKind, MetricCatalog, RelativeRule, SERVICE_STATUS_FIELD, UPTIME_FIELD,
    UPTIME_WARNING_SECS,
};
use super::history::{HistorySummary, RollingHistory};
use super::{AnomalyCategory, AnomalyResult, DetectError, Finding, Severity, Threshold};
use crate::telemetry::{ServiceState, TelemetryPoint};

/// Fewer prior samples than this and a relative rule cannot fire yet.
const MIN_HISTORY_SAMPLES: usize = 2;

pub struct AnomalyEvaluator {
    catalog: Arc<MetricCatalog>,
    history: Mutex<RollingHistory>,
}

impl Default for AnomalyEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(MetricCatalog::default()))
    }
}

impl AnomalyEvaluator {
    pub fn new(catalog: Arc<MetricCatalog>) -> Self {
        let history = RollingHistory::new(catalog.relative_metrics());
        Self {
            catalog,
            history: Mutex::new(history),
        }
    }

    /// A new evaluator over the same catalog with an empty history.
    pub fn fork(&self) -> Self {
        Self::new(Arc::clone(&self.catalog))
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn history_summary(&self) -> HistorySummary {
        self.lock_history().summary()
    }

    /// Judge one point against the catalog and record its relative metrics.
    ///
    /// A field with an unexpected shape is reported in `skipped` and does not
    /// stop the remaining fields from being evaluated.
    pub fn evaluate(&self, point: &TelemetryPoint) -> AnomalyResult {
        let mut history = self.lock_history();
        let mut findings = Vec::new();
        let mut skipped = Vec::new();

        for (field, value) in point.fields() {
            let outcome: Result<Vec<Finding>, DetectError> = match self.catalog.classify(field) {
                FieldKind::Absolute(rule) => check_absolute(field, value, &rule).map(Vec::from_iter),
                FieldKind::Relative(rule) => {
                    check_relative(field, value, &rule, &history).map(Vec::from_iter)
                }
                FieldKind::ServiceStatus => check_service_status(value, &mut skipped),
                FieldKind::Uptime => check_uptime(value).map(Vec::from_iter),
                FieldKind::Unrecognized => Ok(Vec::new()),
            };

            match outcome {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    warn!(field = %field, error = %e, "skipping field");
                    skipped.push(e);
                }
            }
        }

        let tracked: Vec<String> = history.tracked().map(str::to_string).collect();
        for metric in tracked {
            if let Some(value) = point.number(&metric) {
                history.append(&metric, value);
            }
        }
        drop(history);

        let result = AnomalyResult::new(findings, skipped);
        debug!(
            timestamp = point.timestamp().unwrap_or("-"),
            total = result.total_count,
            critical = result.critical_count(),
            "evaluation complete"
        );
        result
    }

    fn lock_history(&self) -> MutexGuard<'_, RollingHistory> {
        // The history holds plain numbers; a panic elsewhere cannot leave it torn.
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn as_number(field: &str, value: &Value) -> Result<f64, DetectError> {
    value.as_f64().ok_or_else(|| DetectError::TypeMismatch {
        field: field.to_string(),
        expected: "number",
    })
}

fn check_absolute(metric: &str, value: &Value, rule: &AbsoluteRule) -> Result<Option<Finding>, DetectError> {
    let observed = as_number(metric, value)?;

    let (severity, limit, label) = if observed >= rule.critical {
        (Severity::Critical, rule.critical, "critically high")
    } else if observed >= rule.warning {
        (Severity::Warning, rule.warning, "high")
    } else {
        return Ok(None);
    };

    Ok(Some(Finding {
        metric: metric.to_string(),
        value: value.clone(),
        threshold: Threshold::Value(limit),
        severity,
        category: rule.category,
        message: format!("{metric} is {label}: {value} >= {limit}"),
    }))
}

fn check_relative(
    metric: &str,
    value: &Value,
    rule: &RelativeRule,
    history: &RollingHistory,
) -> Result<Option<Finding>, DetectError> {
    let observed = as_number(metric, value)?;

    if history.sample_count(metric) < MIN_HISTORY_SAMPLES {
        return Ok(None);
    }
    let Some(average) = history.average(metric) else {
        return Ok(None);
    };

    let (severity, factor, label) = if observed >= average * rule.critical_factor {
        (Severity::Critical, rule.critical_factor, "critically high")
    } else if observed >= average * rule.warning_factor {
        (Severity::Warning, rule.warning_factor, "high")
    } else {
        return Ok(None);
    };

    Ok(Some(Finding {
        metric: metric.to_string(),
        value: value.clone(),
        threshold: Threshold::Relative { factor, average },
        severity,
        category: rule.category,
        message: format!("{metric} is {label}: {value} >= {factor:?}x historical average"),
    }))
}

/// Services are judged one by one; a malformed entry is recorded in `skipped`
/// without hiding findings for its siblings.
fn check_service_status(value: &Value, skipped: &mut Vec<DetectError>) -> Result<Vec<Finding>, DetectError> {
    let services = value.as_object().ok_or_else(|| DetectError::TypeMismatch {
        field: SERVICE_STATUS_FIELD.to_string(),
        expected: "object",
    })?;

    let mut findings = Vec::new();
    for (service, status) in services {
        let metric = format!("{SERVICE_STATUS_FIELD}.{service}");
        let Some(status) = status.as_str() else {
            warn!(field = %metric, "service status is not a string");
            skipped.push(DetectError::TypeMismatch {
                field: metric,
                expected: "string",
            });
            continue;
        };

        let (severity, state) = match ServiceState::parse(status) {
            Some(ServiceState::Offline) => (Severity::Critical, "offline"),
            Some(ServiceState::Degraded) => (Severity::Warning, "degraded"),
            Some(ServiceState::Online) | None => continue,
        };

        findings.push(Finding {
            metric,
            value: Value::String(status.to_string()),
            threshold: Threshold::Status(ServiceState::Online.to_string()),
            severity,
            category: AnomalyCategory::Stability,
            message: format!("Service {service} is {state}"),
        });
    }
    Ok(findings)
}

fn check_uptime(value: &Value) -> Result<Option<Finding>, DetectError> {
    let uptime = as_number(UPTIME_FIELD, value)?;
    if uptime >= UPTIME_WARNING_SECS {
        return Ok(None);
    }

    Ok(Some(Finding {
        metric: UPTIME_FIELD.to_string(),
        value: value.clone(),
        threshold: Threshold::Value(UPTIME_WARNING_SECS),
        severity: Severity::Warning,
        category: AnomalyCategory::Stability,
        message: format!("System recently restarted: uptime {value}s < 1 hour"),
    }))
}
