// src/zone/provider.rs
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{normalize, RawBreakdown, RawIntensity, ZoneMetrics};
use crate::config::{BreakdownKind, DataConfig};
use crate::error::DataError;

/// Source of normalized zone records. The bot only ever talks to this seam.
#[async_trait]
pub trait ZoneMetricsProvider: Send + Sync {
    async fn fetch_zone_metrics(&self, zone_id: &str) -> Result<ZoneMetrics, DataError>;
    fn name(&self) -> &'static str;
}

/// Electricity Maps v3 client (`carbon-intensity/latest` + `power-breakdown/latest`).
#[derive(Clone)]
pub struct ElectricityMapsClient {
    http: Client,
    base_url: String,
    health_url: String,
    token: String,
    breakdown: BreakdownKind,
}

impl ElectricityMapsClient {
    pub fn new(cfg: &DataConfig, token: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("grid-carbon-bot/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("building Electricity Maps http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            health_url: cfg.health_url.clone(),
            token,
            breakdown: cfg.breakdown,
        })
    }

    async fn get_json(&self, zone: &str, endpoint: &str) -> Result<Value, DataError> {
        let fetch_err = |reason: String| DataError::Fetch {
            zone: zone.to_string(),
            reason,
        };

        let rsp = self
            .http
            .get(format!("{}/{endpoint}", self.base_url))
            .query(&[("zone", zone)])
            .header("auth-token", &self.token)
            .send()
            .await
            .map_err(|e| fetch_err(format!("{endpoint}: {e}")))?;

        let rsp = rsp
            .error_for_status()
            .map_err(|e| fetch_err(format!("{endpoint}: {e}")))?;

        rsp.json::<Value>()
            .await
            .map_err(|e| fetch_err(format!("{endpoint}: invalid JSON: {e}")))
    }

    /// Both payloads for one zone, requested concurrently.
    pub async fn fetch_raw(&self, zone: &str) -> Result<(RawIntensity, RawBreakdown), DataError> {
        let (intensity, breakdown) = tokio::try_join!(
            self.get_json(zone, "carbon-intensity/latest"),
            self.get_json(zone, "power-breakdown/latest"),
        )?;
        tracing::debug!(zone, ?intensity, ?breakdown, "raw zone payloads");

        let intensity = RawIntensity::from_json(zone, intensity)?;
        let breakdown = RawBreakdown::from_json(zone, &breakdown, self.breakdown)?;
        Ok((intensity, breakdown))
    }

    /// `true` when the API reports itself healthy. Never fails; errors log and return `false`.
    pub async fn check_health(&self) -> bool {
        let rsp = match self
            .http
            .get(&self.health_url)
            .header("auth-token", &self.token)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "electricity maps health check failed");
                return false;
            }
        };
        match rsp.json::<Value>().await {
            Ok(body) => health_ok(&body),
            Err(e) => {
                tracing::warn!(error = %e, "electricity maps health body unreadable");
                false
            }
        }
    }
}

fn health_ok(body: &Value) -> bool {
    let status_ok = body.get("status").and_then(Value::as_str) == Some("ok");
    let monitors_ok = body
        .pointer("/monitors/state")
        .and_then(Value::as_str)
        .map_or(true, |s| s == "ok");
    status_ok && monitors_ok
}

#[async_trait]
impl ZoneMetricsProvider for ElectricityMapsClient {
    async fn fetch_zone_metrics(&self, zone_id: &str) -> Result<ZoneMetrics, DataError> {
        let (intensity, breakdown) = self.fetch_raw(zone_id).await?;
        normalize(zone_id, &intensity, &breakdown)
    }

    fn name(&self) -> &'static str {
        "electricity-maps"
    }
}
