// src/zone/mod.rs
//! Canonical per-zone record and the normalizer that builds it from raw payloads.

pub mod provider;
pub mod raw;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::DataError;
pub use provider::{ElectricityMapsClient, ZoneMetricsProvider};
pub use raw::{RawBreakdown, RawIntensity};

/// Categories never shown in the top-sources list nor counted in its denominator.
pub const EXCLUDED_SOURCES: [&str; 3] = ["unknown", "battery discharge", "hydro discharge"];

pub const TOP_SOURCES_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceShare {
    pub name: String,
    /// 0..=100
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneMetrics {
    pub zone_id: String,
    /// g CO2eq/kWh, never negative.
    pub carbon_intensity: f64,
    /// At most three entries, descending by percentage.
    pub top_sources: Vec<SourceShare>,
    pub timestamp: DateTime<Utc>,
}

pub fn is_excluded(source: &str) -> bool {
    EXCLUDED_SOURCES
        .iter()
        .any(|ex| ex.eq_ignore_ascii_case(source.trim()))
}

/// Build a [`ZoneMetrics`] from already fetched payloads.
///
/// Fails only when intensity or timestamp is unusable; an all-zero breakdown
/// yields an empty `top_sources`.
pub fn normalize(
    zone_id: &str,
    intensity: &RawIntensity,
    breakdown: &RawBreakdown,
) -> Result<ZoneMetrics, DataError> {
    let carbon_intensity = intensity
        .carbon_intensity
        .ok_or_else(|| DataError::MissingField {
            zone: zone_id.to_string(),
            field: "carbonIntensity",
        })?;
    if !carbon_intensity.is_finite() || carbon_intensity < 0.0 {
        return Err(DataError::InvalidField {
            zone: zone_id.to_string(),
            field: "carbonIntensity",
            reason: format!("expected a non-negative number, got {carbon_intensity}"),
        });
    }

    let raw_ts = intensity
        .datetime
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| DataError::MissingField {
            zone: zone_id.to_string(),
            field: "datetime",
        })?;
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| DataError::InvalidField {
        zone: zone_id.to_string(),
        field: "datetime",
        reason: format!("not an ISO 8601 timestamp: {raw_ts}"),
    })?;

    Ok(ZoneMetrics {
        zone_id: zone_id.to_string(),
        carbon_intensity,
        top_sources: rank_sources(breakdown),
        timestamp,
    })
}

/// Top three non-excluded, positive sources as shares of the total.
///
/// The reported total is trusted only when it covers the counted sources;
/// otherwise the shares would sum past 100.
pub fn rank_sources(breakdown: &RawBreakdown) -> Vec<SourceShare> {
    let counted: Vec<(&str, f64)> = breakdown
        .sources
        .iter()
        .filter_map(|(name, v)| v.map(|v| (name.as_str(), v)))
        .filter(|(name, v)| v.is_finite() && *v > 0.0 && !is_excluded(name))
        .collect();

    let computed: f64 = counted.iter().map(|(_, v)| v).sum();
    let total = match breakdown.total {
        Some(t) if t.is_finite() && t > 0.0 && t >= computed => t,
        _ => computed,
    };
    if total <= 0.0 {
        return Vec::new();
    }

    let mut shares: Vec<SourceShare> = counted
        .into_iter()
        .map(|(name, v)| SourceShare {
            name: name.to_string(),
            percentage: 100.0 * v / total,
        })
        .collect();

    // sort_by is stable: equal shares keep payload order.
    shares.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(Ordering::Equal)
    });
    shares.truncate(TOP_SOURCES_LEN);
    shares
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
