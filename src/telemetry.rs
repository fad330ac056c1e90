// src/telemetry.rs
//! Logging setup, metric descriptions and the optional status/metrics server.

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::publish::{SessionStatus, SessionStatusHandle};

pub const ENV_LOG_FORMAT: &str = "GRID_BOT_LOG_FORMAT";
const DEFAULT_LOG_FILTER: &str = "grid_carbon_bot=info,warn";

/// Install the global tracing subscriber. `RUST_LOG` wins over the default filter;
/// `GRID_BOT_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(false)).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("grid_bot_cycles_total", "Posting cycles started.");
        describe_counter!(
            "grid_bot_cycle_failures_total",
            "Scopes that failed within a cycle, by stage."
        );
        describe_counter!("grid_bot_posts_total", "Posts published.");
        describe_counter!("grid_bot_login_attempts_total", "Login requests sent.");
        describe_counter!(
            "grid_bot_login_backoffs_total",
            "Rate-limited logins followed by a backoff sleep."
        );
        describe_counter!(
            "grid_bot_zone_fetch_errors_total",
            "Zone fetches that failed and excluded the zone."
        );
        describe_gauge!(
            "grid_bot_zone_carbon_intensity",
            "Latest carbon intensity per zone, g CO2/kWh."
        );
        describe_gauge!("grid_bot_last_post_ts", "Unix ts of the last published post.");
    });
}

/// Install the global Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing prometheus recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

#[derive(Clone)]
struct TelemetryState {
    metrics: PrometheusHandle,
    session: SessionStatusHandle,
}

/// `/health`, `/status` (session JSON) and `/metrics` (Prometheus text).
pub fn router(metrics: PrometheusHandle, session: SessionStatusHandle) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status))
        .route("/metrics", get(render_metrics))
        .with_state(TelemetryState { metrics, session })
}

async fn status(State(st): State<TelemetryState>) -> Json<SessionStatus> {
    Json(st.session.snapshot())
}

async fn render_metrics(State(st): State<TelemetryState>) -> String {
    st.metrics.render()
}

/// Serve `router` on `addr` until the process exits.
pub async fn serve(addr: &str, router: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding telemetry server on {addr}"))?;
    tracing::info!(%addr, "telemetry server listening");
    axum::serve(listener, router)
        .await
        .context("telemetry server stopped")
}
