//! Telemetry points as they arrive from the ingestion boundary.
//!
//! A point is an insertion-ordered JSON object: scalar metrics keyed by name,
//! a nested `service_status` map and an ISO-8601 `timestamp` string. Field order
//! is preserved so evaluation reports findings in arrival order.

pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::detect::DetectError;

/// Name of the timestamp field carried by every point.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One periodic telemetry sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryPoint {
    fields: Map<String, Value>,
}

impl TelemetryPoint {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// ISO-8601 timestamp of the sample, if the point carries one.
    pub fn timestamp(&self) -> Option<&str> {
        self.fields.get(TIMESTAMP_FIELD).and_then(Value::as_str)
    }

    /// Numeric value of `field`, `None` when absent or not a number.
    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    /// Iterate fields in arrival order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set or replace a field, keeping its original position when it already exists.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }
}

impl TryFrom<Value> for TelemetryPoint {
    type Error = DetectError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(DetectError::TypeMismatch {
                field: "<point>".to_string(),
                expected: "object",
            }),
        }
    }
}

impl From<TelemetryPoint> for Value {
    fn from(point: TelemetryPoint) -> Self {
        Value::Object(point.fields)
    }
}

/// Reported state of one downstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Online,
    Degraded,
    Offline,
}

impl ServiceState {
    pub const ALL: [ServiceState; 3] = [Self::Online, Self::Degraded, Self::Offline];

    /// Parse a status string. Unknown statuses yield `None`.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "online" => Some(Self::Online),
            "degraded" => Some(Self::Degraded),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
