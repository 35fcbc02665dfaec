//! Ingest-time validation of raw telemetry payloads.
//!
//! Every violation is collected rather than stopping at the first, so a client
//! can fix a payload in one round trip.

use serde::Serialize;
use serde_json::Value;

use super::{ServiceState, TelemetryPoint, TIMESTAMP_FIELD};
use crate::detect::catalog::SERVICE_STATUS_FIELD;

/// Services every point must report.
pub const REQUIRED_SERVICES: [&str; 3] = ["database", "api_gateway", "cache"];

#[derive(Debug, Clone, Copy)]
enum Kind {
    Integer,
    Number,
}

struct FieldRule {
    name: &'static str,
    kind: Kind,
    min: f64,
    /// The minimum itself is rejected.
    exclusive_min: bool,
    max: Option<f64>,
}

const fn rule(name: &'static str, kind: Kind, min: f64, max: Option<f64>) -> FieldRule {
    FieldRule { name, kind, min, exclusive_min: false, max }
}

/// Strictly positive integer. Zero would seed a rolling mean of 0.
const fn positive(name: &'static str) -> FieldRule {
    FieldRule { name, kind: Kind::Integer, min: 0.0, exclusive_min: true, max: None }
}

const NUMERIC_FIELDS: [FieldRule; 13] = [
    rule("cpu_usage", Kind::Integer, 0.0, Some(100.0)),
    rule("memory_usage", Kind::Integer, 0.0, Some(100.0)),
    positive("latency_ms"),
    rule("disk_usage", Kind::Integer, 0.0, Some(100.0)),
    positive("network_in_kbps"),
    positive("network_out_kbps"),
    rule("io_wait", Kind::Integer, 0.0, Some(100.0)),
    positive("thread_count"),
    rule("active_connections", Kind::Integer, 0.0, None),
    rule("error_rate", Kind::Number, 0.0, Some(1.0)),
    positive("uptime_seconds"),
    rule("temperature_celsius", Kind::Integer, 0.0, Some(200.0)),
    positive("power_consumption_watts"),
];

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a raw payload and turn it into a [`TelemetryPoint`].
pub fn validate_point(payload: &Value) -> Result<TelemetryPoint, Vec<ValidationIssue>> {
    let Some(fields) = payload.as_object() else {
        return Err(vec![ValidationIssue::new("root", "payload must be a JSON object")]);
    };

    let mut issues = Vec::new();

    match fields.get(TIMESTAMP_FIELD) {
        None => issues.push(missing(TIMESTAMP_FIELD)),
        Some(Value::String(_)) => {}
        Some(_) => issues.push(ValidationIssue::new(
            TIMESTAMP_FIELD,
            "field 'timestamp' must be a string",
        )),
    }

    for rule in &NUMERIC_FIELDS {
        match fields.get(rule.name) {
            None => issues.push(missing(rule.name)),
            Some(value) => check_numeric(rule, value, &mut issues),
        }
    }

    match fields.get(SERVICE_STATUS_FIELD) {
        None => issues.push(missing(SERVICE_STATUS_FIELD)),
        Some(value) => check_services(value, &mut issues),
    }

    if issues.is_empty() {
        Ok(TelemetryPoint::new(fields.clone()))
    } else {
        Err(issues)
    }
}

fn missing(field: &str) -> ValidationIssue {
    ValidationIssue::new(field, format!("required field '{field}' is missing"))
}

fn check_numeric(rule: &FieldRule, value: &Value, issues: &mut Vec<ValidationIssue>) {
    let number = match rule.kind {
        Kind::Integer if value.is_i64() || value.is_u64() => value.as_f64(),
        Kind::Number => value.as_f64(),
        _ => None,
    };
    let Some(number) = number else {
        let expected = match rule.kind {
            Kind::Integer => "integer",
            Kind::Number => "number",
        };
        issues.push(ValidationIssue::new(
            rule.name,
            format!("field '{}' must be of type {expected}", rule.name),
        ));
        return;
    };

    if rule.exclusive_min && number <= rule.min {
        issues.push(ValidationIssue::new(
            rule.name,
            format!("field '{}' must be > {}", rule.name, rule.min),
        ));
    } else if number < rule.min {
        issues.push(ValidationIssue::new(
            rule.name,
            format!("field '{}' must be >= {}", rule.name, rule.min),
        ));
    }
    if let Some(max) = rule.max {
        if number > max {
            issues.push(ValidationIssue::new(
                rule.name,
                format!("field '{}' must be <= {max}", rule.name),
            ));
        }
    }
}

fn check_services(value: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(services) = value.as_object() else {
        issues.push(ValidationIssue::new(
            SERVICE_STATUS_FIELD,
            "service status must be an object",
        ));
        return;
    };

    for service in REQUIRED_SERVICES {
        let field = format!("{SERVICE_STATUS_FIELD}.{service}");
        match services.get(service) {
            None => issues.push(ValidationIssue::new(
                field,
                format!("required service '{service}' is missing"),
            )),
            Some(status) => {
                if status.as_str().and_then(ServiceState::parse).is_none() {
                    let allowed: Vec<&str> = ServiceState::ALL.iter().map(|s| s.as_str()).collect();
                    issues.push(ValidationIssue::new(
                        field,
                        format!("service status must be one of {}", allowed.join(", ")),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "timestamp": "2024-01-01T10:00:00Z",
            "cpu_usage": 50,
            "memory_usage": 60,
            "latency_ms": 100,
            "disk_usage": 70,
            "network_in_kbps": 1000,
            "network_out_kbps": 800,
            "io_wait": 3,
            "thread_count": 100,
            "active_connections": 50,
            "error_rate": 0.01,
            "uptime_seconds": 7200,
            "temperature_celsius": 65,
            "power_consumption_watts": 250,
            "service_status": {"database": "online", "api_gateway": "online", "cache": "online"}
        })
    }

    #[test]
    fn test_accepts_complete_point() {
        let point = validate_point(&valid_payload()).unwrap();
        assert_eq!(point.timestamp(), Some("2024-01-01T10:00:00Z"));
        assert_eq!(point.fields().count(), 15);
    }

    #[test]
    fn test_reports_every_issue() {
        let mut payload = valid_payload();
        payload["cpu_usage"] = json!(150);
        payload["latency_ms"] = json!("slow");
        payload.as_object_mut().unwrap().remove("disk_usage");
        payload["service_status"]["cache"] = json!("rebooting");

        let issues = validate_point(&payload).unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["cpu_usage", "latency_ms", "disk_usage", "service_status.cache"]
        );
        assert!(issues[0].message.contains("<= 100"));
    }

    #[test]
    fn test_integer_fields_reject_floats() {
        let mut payload = valid_payload();
        payload["thread_count"] = json!(10.5);
        let issues = validate_point(&payload).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("integer"));
    }

    #[test]
    fn test_counters_must_be_positive() {
        let mut payload = valid_payload();
        payload["network_in_kbps"] = json!(0);
        payload["uptime_seconds"] = json!(0);
        payload["cpu_usage"] = json!(0);

        let issues = validate_point(&payload).unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["network_in_kbps", "uptime_seconds"]);
        assert_eq!(issues[0].message, "field 'network_in_kbps' must be > 0");
    }

    #[test]
    fn test_all_zero_counters_rejected() {
        let mut payload = valid_payload();
        for field in [
            "latency_ms",
            "network_in_kbps",
            "network_out_kbps",
            "thread_count",
            "uptime_seconds",
            "power_consumption_watts",
        ] {
            payload[field] = json!(0);
        }
        assert_eq!(validate_point(&payload).unwrap_err().len(), 6);
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let issues = validate_point(&json!("nope")).unwrap_err();
        assert_eq!(issues[0].field, "root");
    }
}
