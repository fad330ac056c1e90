// src/zone/raw.rs
//! Raw Electricity Maps payloads, kept close to the wire.

use serde_json::Value;

use crate::config::BreakdownKind;
use crate::error::DataError;

/// Body of `carbon-intensity/latest`. Both fields may be absent or null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawIntensity {
    pub carbon_intensity: Option<f64>,
    pub datetime: Option<String>,
}

impl RawIntensity {
    pub fn new(carbon_intensity: f64, datetime: impl Into<String>) -> Self {
        Self {
            carbon_intensity: Some(carbon_intensity),
            datetime: Some(datetime.into()),
        }
    }

    /// Absent and `null` fields are `None`; a present field of the wrong type is
    /// reported under its own name.
    pub fn from_json(zone: &str, v: Value) -> Result<Self, DataError> {
        let invalid = |field: &'static str, reason: String| DataError::InvalidField {
            zone: zone.to_string(),
            field,
            reason,
        };
        if !v.is_object() {
            return Err(invalid("payload", format!("expected a JSON object, got {v}")));
        }

        let carbon_intensity = match v.get("carbonIntensity") {
            None | Some(Value::Null) => None,
            Some(x) => match x.as_f64() {
                Some(ci) => Some(ci),
                None => {
                    return Err(invalid("carbonIntensity", format!("expected a number, got {x}")))
                }
            },
        };
        let datetime = match v.get("datetime") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(x) => return Err(invalid("datetime", format!("expected a string, got {x}"))),
        };
        Ok(Self {
            carbon_intensity,
            datetime,
        })
    }
}

/// Source → power mapping in payload order, plus the optional reported total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBreakdown {
    pub sources: Vec<(String, Option<f64>)>,
    pub total: Option<f64>,
}

impl RawBreakdown {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            sources: pairs
                .into_iter()
                .map(|(name, v)| (name.into(), Some(v)))
                .collect(),
            total: None,
        }
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    /// Pick the configured breakdown out of a `power-breakdown/latest` body,
    /// falling back to the other flavour when the preferred one is absent.
    pub fn from_json(zone: &str, v: &Value, kind: BreakdownKind) -> Result<Self, DataError> {
        let (preferred, fallback) = match kind {
            BreakdownKind::Consumption => (CONSUMPTION, PRODUCTION),
            BreakdownKind::Production => (PRODUCTION, CONSUMPTION),
        };

        for (map_key, total_key) in [preferred, fallback] {
            let Some(map) = v.get(map_key).and_then(Value::as_object) else {
                continue;
            };
            // serde_json is built with `preserve_order`, so this walks payload order.
            let sources = map
                .iter()
                .map(|(name, val)| (name.clone(), val.as_f64()))
                .collect();
            let total = v.get(total_key).and_then(Value::as_f64);
            return Ok(Self { sources, total });
        }

        Err(DataError::MissingField {
            zone: zone.to_string(),
            field: preferred.0,
        })
    }
}

const CONSUMPTION: (&str, &str) = ("powerConsumptionBreakdown", "powerConsumptionTotal");
const PRODUCTION: (&str, &str) = ("powerProductionBreakdown", "powerProductionTotal");
