// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed metric samples and their JSON wire shape.
//!
//! A [`Metric`] always carries a value whose variant matches its kind, so
//! anything past the [`MetricPayload`] conversion boundary can rely on it.
//! The wire shape is looser on purpose: it mirrors what clients send,
//!
//! ```text
//! {"id": "cpu_load", "type": "gauge", "value": 42.5}
//! {"id": "requests", "type": "counter", "delta": 10}
//! ```
//!
//! and every way it can be malformed maps to a [`ValidationError`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Value of a sample: a point-in-time reading for gauges, an increment for
/// counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub const fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub const fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Checks the invariants the type system cannot: the id must be non-empty
    /// and a gauge must be finite, since JSON has no encoding for NaN or
    /// infinities.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        if let MetricValue::Gauge(v) = self.value {
            if !v.is_finite() {
                return Err(ValidationError::NonFiniteValue {
                    id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Builds a metric from the three path segments of the plain-text update
    /// route, e.g. `("counter", "requests", "10")`.
    pub fn parse(kind: &str, id: &str, raw_value: &str) -> Result<Self, ValidationError> {
        let kind = MetricKind::from_str(kind)?;
        if id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        let invalid = || ValidationError::InvalidValue {
            raw: raw_value.to_string(),
            kind,
        };
        let value = match kind {
            MetricKind::Gauge => MetricValue::Gauge(raw_value.parse().map_err(|_| invalid())?),
            MetricKind::Counter => MetricValue::Counter(raw_value.parse().map_err(|_| invalid())?),
        };
        let metric = Self {
            id: id.to_string(),
            value,
        };
        metric.validate()?;
        Ok(metric)
    }
}

/// JSON representation of a metric as exchanged between agent and server and
/// as stored in snapshot files.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricPayload {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricPayload {
    /// Payload naming a metric without a value, as used by lookups.
    pub fn query(kind: MetricKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mtype: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> Result<MetricKind, ValidationError> {
        MetricKind::from_str(&self.mtype)
    }
}

impl TryFrom<MetricPayload> for Metric {
    type Error = ValidationError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        if payload.id.is_empty() {
            return Err(ValidationError::MissingId);
        }
        let kind = payload.kind()?;
        let value = match (kind, payload.value, payload.delta) {
            (_, None, None) => return Err(ValidationError::MissingValue { id: payload.id }),
            (MetricKind::Gauge, Some(value), _) => MetricValue::Gauge(value),
            (MetricKind::Counter, _, Some(delta)) => MetricValue::Counter(delta),
            (kind, _, _) => {
                return Err(ValidationError::TypeMismatch {
                    id: payload.id,
                    kind,
                })
            }
        };
        let metric = Metric {
            id: payload.id,
            value,
        };
        metric.validate()?;
        Ok(metric)
    }
}

impl From<&Metric> for MetricPayload {
    fn from(metric: &Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        Self {
            id: metric.id.clone(),
            mtype: metric.kind().to_string(),
            delta,
            value,
        }
    }
}

impl From<Metric> for MetricPayload {
    fn from(metric: Metric) -> Self {
        MetricPayload::from(&metric)
    }
}

/// Validates every payload of a batch, failing on the first bad element so
/// that nothing of an invalid batch is ever applied.
pub fn metrics_from_payloads(
    payloads: Vec<MetricPayload>,
) -> Result<Vec<Metric>, ValidationError> {
    payloads.into_iter().map(Metric::try_from).collect()
}
