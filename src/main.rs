//! Grid carbon matchup bot: binary entrypoint.
//! Loads config and secrets, wires the Electricity Maps and Bluesky clients into
//! the bot loop, and serves `/health` + `/status` + `/metrics` when configured.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

use grid_carbon_bot::config::{self, Credentials};
use grid_carbon_bot::publish::{BlueskyClient, PostLog, PublishSession, RetryPolicy, TokioSleeper};
use grid_carbon_bot::telemetry;
use grid_carbon_bot::zone::ElectricityMapsClient;
use grid_carbon_bot::GridBot;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default()?;
    cfg.validate().context("invalid bot config")?;
    let creds = Credentials::from_env()?;
    tracing::info!(
        mode = ?cfg.matchup.mode,
        zones = cfg.matchup.zones.len(),
        divisions = cfg.matchup.divisions.len(),
        dry_run = cfg.dry_run,
        run_once = cfg.run_once,
        handle = %creds.bluesky_handle,
        "starting grid carbon bot"
    );

    let provider = ElectricityMapsClient::new(&cfg.data, creds.electricity_maps_token.clone())?;
    if provider.check_health().await {
        tracing::info!("electricity maps API healthy");
    } else {
        tracing::warn!("electricity maps API reports unhealthy, continuing anyway");
    }

    let backend = BlueskyClient::new(&cfg.publish)?;
    let mut session = PublishSession::new(
        Arc::new(backend),
        Arc::new(TokioSleeper),
        creds.bluesky_handle.clone(),
        creds.bluesky_password.clone(),
        RetryPolicy::from(&cfg.publish),
    );
    if cfg.save_posts {
        tracing::info!(path = %cfg.posts_log_path.display(), "saving published posts");
        session = session.with_post_log(PostLog::new(cfg.posts_log_path.clone()));
    }
    let session = Arc::new(session);

    if let Some(addr) = cfg.metrics_addr.clone() {
        let handle = telemetry::install_recorder()?;
        let router = telemetry::router(handle, session.status_handle());
        tokio::spawn(async move {
            if let Err(e) = telemetry::serve(&addr, router).await {
                tracing::error!("telemetry server: {e:#}");
            }
        });
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested, finishing current cycle");
        let _ = tx.send(true);
    });

    let bot = GridBot::new(cfg, Arc::new(provider), Arc::clone(&session));
    bot.run(rx).await;

    session.logout();
    tracing::info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
