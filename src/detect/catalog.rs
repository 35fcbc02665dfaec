//! Metric catalog: which rule applies to which telemetry field.
//!
//! The catalog is built once at startup and is read-only afterwards. Besides the
//! rule table it keeps a dispatch table mapping every recognised field name to a
//! [`FieldKind`], so the evaluator classifies each incoming field with a single
//! lookup.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{AnomalyCategory, DetectError};

/// Nested per-service status map.
pub const SERVICE_STATUS_FIELD: &str = "service_status";
/// Seconds since the host last booted.
pub const UPTIME_FIELD: &str = "uptime_seconds";
/// Uptime below this many seconds means the host restarted recently.
pub const UPTIME_WARNING_SECS: f64 = 3600.0;

/// Fixed warning/critical thresholds compared directly against the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbsoluteRule {
    pub warning: f64,
    pub critical: f64,
    pub category: AnomalyCategory,
}

/// Thresholds expressed as multiples of the metric's rolling average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelativeRule {
    pub warning_factor: f64,
    pub critical_factor: f64,
    pub category: AnomalyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricRule {
    Absolute(AbsoluteRule),
    Relative(RelativeRule),
}

impl MetricRule {
    pub fn category(&self) -> AnomalyCategory {
        match self {
            MetricRule::Absolute(r) => r.category,
            MetricRule::Relative(r) => r.category,
        }
    }

    fn validate(&self, metric: &str) -> Result<(), DetectError> {
        let (low, high, what) = match self {
            MetricRule::Absolute(r) => (r.warning, r.critical, "warning"),
            MetricRule::Relative(r) => (r.warning_factor, r.critical_factor, "warning_factor"),
        };
        if !low.is_finite() || !high.is_finite() {
            return Err(DetectError::InvalidThresholds {
                metric: metric.to_string(),
                reason: "thresholds must be finite numbers".to_string(),
            });
        }
        if low >= high {
            return Err(DetectError::InvalidThresholds {
                metric: metric.to_string(),
                reason: format!("{what} ({low}) must be below its critical counterpart ({high})"),
            });
        }
        Ok(())
    }
}

/// How the evaluator treats a field, resolved once per field name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Absolute(AbsoluteRule),
    Relative(RelativeRule),
    ServiceStatus,
    Uptime,
    Unrecognized,
}

/// Partial threshold override, as read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdOverride {
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    pub warning_factor: Option<f64>,
    pub critical_factor: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MetricCatalog {
    rules: IndexMap<String, MetricRule>,
    dispatch: HashMap<String, FieldKind>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::from_rules(default_rules())
    }
}

impl MetricCatalog {
    /// Build a catalog from an explicit rule table.
    pub fn new(rules: IndexMap<String, MetricRule>) -> Result<Self, DetectError> {
        for (metric, rule) in &rules {
            rule.validate(metric)?;
        }
        Ok(Self::from_rules(rules))
    }

    /// Default catalog with configuration overrides applied.
    pub fn with_overrides(overrides: &IndexMap<String, ThresholdOverride>) -> Result<Self, DetectError> {
        let mut rules = default_rules();
        for (metric, patch) in overrides {
            let rule = rules.get_mut(metric).ok_or_else(|| DetectError::UnknownMetric {
                metric: metric.clone(),
            })?;
            apply_override(metric, rule, patch)?;
        }
        Self::new(rules)
    }

    fn from_rules(rules: IndexMap<String, MetricRule>) -> Self {
        let mut dispatch: HashMap<String, FieldKind> = rules
            .iter()
            .map(|(metric, rule)| {
                let kind = match *rule {
                    MetricRule::Absolute(r) => FieldKind::Absolute(r),
                    MetricRule::Relative(r) => FieldKind::Relative(r),
                };
                (metric.clone(), kind)
            })
            .collect();
        dispatch.insert(SERVICE_STATUS_FIELD.to_string(), FieldKind::ServiceStatus);
        dispatch.insert(UPTIME_FIELD.to_string(), FieldKind::Uptime);

        Self { rules, dispatch }
    }

    pub fn classify(&self, field: &str) -> FieldKind {
        self.dispatch.get(field).copied().unwrap_or(FieldKind::Unrecognized)
    }

    pub fn rule(&self, metric: &str) -> Option<&MetricRule> {
        self.rules.get(metric)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &MetricRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Metrics judged against their rolling average, in catalog order.
    pub fn relative_metrics(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|(_, rule)| matches!(rule, MetricRule::Relative(_)))
            .map(|(metric, _)| metric.as_str())
    }
}

fn apply_override(metric: &str, rule: &mut MetricRule, patch: &ThresholdOverride) -> Result<(), DetectError> {
    let mismatch = |reason: &str| DetectError::InvalidThresholds {
        metric: metric.to_string(),
        reason: reason.to_string(),
    };

    match rule {
        MetricRule::Absolute(r) => {
            if patch.warning_factor.is_some() || patch.critical_factor.is_some() {
                return Err(mismatch("factor keys apply only to relative rules"));
            }
            if let Some(v) = patch.warning {
                r.warning = v;
            }
            if let Some(v) = patch.critical {
                r.critical = v;
            }
        }
        MetricRule::Relative(r) => {
            if patch.warning.is_some() || patch.critical.is_some() {
                return Err(mismatch("use warning_factor/critical_factor for relative rules"));
            }
            if let Some(v) = patch.warning_factor {
                r.warning_factor = v;
            }
            if let Some(v) = patch.critical_factor {
                r.critical_factor = v;
            }
        }
    }
    Ok(())
}

fn default_rules() -> IndexMap<String, MetricRule> {
    use AnomalyCategory::*;

    let absolute = [
        ("cpu_usage", 80.0, 90.0, Performance),
        ("memory_usage", 80.0, 85.0, Performance),
        ("latency_ms", 200.0, 500.0, Performance),
        ("disk_usage", 80.0, 90.0, Capacity),
        ("io_wait", 5.0, 10.0, Performance),
        ("error_rate", 0.02, 0.05, Capacity),
        ("temperature_celsius", 70.0, 80.0, Health),
        ("power_consumption_watts", 300.0, 400.0, Health),
        ("active_connections", 100.0, 150.0, Capacity),
    ];
    let relative = ["network_in_kbps", "network_out_kbps", "thread_count"];

    let mut rules = IndexMap::new();
    for (metric, warning, critical, category) in absolute {
        rules.insert(
            metric.to_string(),
            MetricRule::Absolute(AbsoluteRule { warning, critical, category }),
        );
    }
    for metric in relative {
        rules.insert(
            metric.to_string(),
            MetricRule::Relative(RelativeRule {
                warning_factor: 1.5,
                critical_factor: 2.0,
                category: Capacity,
            }),
        );
    }
    rules
}
