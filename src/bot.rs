// src/bot.rs
//! Posting cycle orchestration and the scheduling loop.
//!
//! One cycle = one matchup per scope: select, fetch both zones concurrently,
//! compose, publish. A zone whose fetch fails is excluded and the scope is
//! re-drawn, bounded by `matchup.max_selection_attempts`.
//!
//! Each scope keeps its own due time: `post_interval` after it posts,
//! `recovery_interval` after it fails. The loop only runs scopes that are due.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::compose::{compose, ComposedPost};
use crate::config::BotConfig;
use crate::error::{CycleError, DataError};
use crate::matchup::{select_in_scope, Matchup, Scope, SelectionMode};
use crate::publish::{PostHandle, PublishSession};
use crate::telemetry::ensure_metrics_described;
use crate::zone::{ZoneMetrics, ZoneMetricsProvider};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScopeResult {
    Published { post: PostHandle },
    /// Composed but not sent (`dry_run`).
    DryRun { post: ComposedPost },
    Failed { stage: &'static str, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeOutcome {
    pub scope: String,
    /// Last matchup drawn, if selection got that far.
    pub matchup: Option<Matchup>,
    pub result: ScopeResult,
}

impl ScopeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.result, ScopeResult::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub scopes: Vec<ScopeOutcome>,
}

impl CycleReport {
    /// `true` when no scope failed.
    pub fn is_success(&self) -> bool {
        !self.scopes.iter().any(ScopeOutcome::is_failure)
    }

    pub fn published(&self) -> impl Iterator<Item = &PostHandle> {
        self.scopes.iter().filter_map(|s| match &s.result {
            ScopeResult::Published { post } => Some(post),
            _ => None,
        })
    }
}

pub struct GridBot {
    cfg: BotConfig,
    provider: Arc<dyn ZoneMetricsProvider>,
    session: Arc<PublishSession>,
    rng: Mutex<StdRng>,
    /// Scope name → next time it may run. Absent means due now.
    due: Mutex<HashMap<String, Instant>>,
}

impl GridBot {
    pub fn new(
        cfg: BotConfig,
        provider: Arc<dyn ZoneMetricsProvider>,
        session: Arc<PublishSession>,
    ) -> Self {
        ensure_metrics_described();
        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            cfg,
            provider,
            session,
            rng: Mutex::new(rng),
            due: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.cfg
    }

    pub fn session(&self) -> &Arc<PublishSession> {
        &self.session
    }

    /// One cycle over every configured scope, due or not. Failures are recorded,
    /// never returned.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_scopes(self.cfg.matchup.scopes()).await
    }

    /// One cycle over the scopes whose due time has passed.
    pub async fn run_due(&self) -> CycleReport {
        let now = Instant::now();
        let due: Vec<Scope> = {
            let times = self.due.lock().expect("schedule mutex poisoned");
            self.cfg
                .matchup
                .scopes()
                .into_iter()
                .filter(|s| times.get(&s.name).map_or(true, |t| *t <= now))
                .collect()
        };
        self.run_scopes(due).await
    }

    async fn run_scopes(&self, scopes: Vec<Scope>) -> CycleReport {
        counter!("grid_bot_cycles_total").increment(1);
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            let outcome = self.run_scope(scope).await;
            self.reschedule(&outcome);
            outcomes.push(outcome);
        }
        let report = CycleReport {
            started_at,
            scopes: outcomes,
        };
        tracing::info!(
            scopes = report.scopes.len(),
            published = report.published().count(),
            success = report.is_success(),
            "cycle finished"
        );
        report
    }

    fn reschedule(&self, outcome: &ScopeOutcome) {
        let wait = if outcome.is_failure() {
            self.cfg.recovery_interval()
        } else {
            self.cfg.post_interval()
        };
        self.due
            .lock()
            .expect("schedule mutex poisoned")
            .insert(outcome.scope.clone(), deadline_after(wait));
    }

    /// Earliest due time over the configured scopes.
    pub fn next_due(&self) -> Instant {
        let now = Instant::now();
        let times = self.due.lock().expect("schedule mutex poisoned");
        self.cfg
            .matchup
            .scopes()
            .iter()
            .map(|s| times.get(&s.name).copied().unwrap_or(now))
            .min()
            .unwrap_or_else(|| deadline_after(self.cfg.post_interval()))
    }

    pub async fn run_scope(&self, scope: &Scope) -> ScopeOutcome {
        let mut matchup = None;
        let result = match self.try_scope(scope, &mut matchup).await {
            Ok(r) => r,
            Err(e) => {
                let stage = e.stage();
                counter!("grid_bot_cycle_failures_total", "stage" => stage).increment(1);
                tracing::error!(
                    scope = %scope.name,
                    zone_a = matchup.as_ref().map(|m: &Matchup| m.zone_a.as_str()),
                    zone_b = matchup.as_ref().map(|m: &Matchup| m.zone_b.as_str()),
                    stage,
                    "cycle failed: {e:#}"
                );
                ScopeResult::Failed {
                    stage,
                    error: e.to_string(),
                }
            }
        };
        ScopeOutcome {
            scope: scope.name.clone(),
            matchup,
            result,
        }
    }

    async fn try_scope(
        &self,
        scope: &Scope,
        drawn: &mut Option<Matchup>,
    ) -> Result<ScopeResult, CycleError> {
        let anchor = match &scope.mode {
            SelectionMode::Anchor(a) => Some(a.as_str()),
            _ => None,
        };
        let attempts = self.cfg.matchup.max_selection_attempts.max(1);
        let mut excluded: HashSet<String> = HashSet::new();
        let mut fetched: HashMap<String, ZoneMetrics> = HashMap::new();
        let mut last_err: Option<DataError> = None;

        for attempt in 1..=attempts {
            let m = {
                let mut rng = self.rng.lock().expect("rng mutex poisoned");
                select_in_scope(scope, &excluded, &self.cfg.matchup.weights, &mut *rng)?
            };
            tracing::info!(
                scope = %scope.name,
                zone_a = %m.zone_a,
                zone_b = %m.zone_b,
                attempt,
                "matchup selected"
            );
            *drawn = Some(m.clone());

            let (a, b) = tokio::join!(
                self.fetch(&fetched, &m.zone_a),
                self.fetch(&fetched, &m.zone_b)
            );
            match (a, b) {
                (Ok(a), Ok(b)) => return self.compose_and_publish(scope, &a, &b).await,
                (a, b) => {
                    for (zone, res) in [(&m.zone_a, a), (&m.zone_b, b)] {
                        match res {
                            Ok(metrics) => {
                                fetched.insert(zone.clone(), metrics);
                            }
                            Err(e) => {
                                if anchor == Some(zone.as_str()) {
                                    return Err(e.into());
                                }
                                excluded.insert(zone.clone());
                                last_err = Some(e);
                            }
                        }
                    }
                }
            }
        }

        let err = last_err.unwrap_or_else(|| DataError::Fetch {
            zone: scope.name.clone(),
            reason: "no usable matchup".to_string(),
        });
        tracing::warn!(scope = %scope.name, attempts, "selection attempts exhausted");
        Err(err.into())
    }

    async fn fetch(
        &self,
        fetched: &HashMap<String, ZoneMetrics>,
        zone: &str,
    ) -> Result<ZoneMetrics, DataError> {
        if let Some(m) = fetched.get(zone) {
            return Ok(m.clone());
        }
        match self.provider.fetch_zone_metrics(zone).await {
            Ok(m) => {
                gauge!("grid_bot_zone_carbon_intensity", "zone" => zone.to_string())
                    .set(m.carbon_intensity);
                tracing::debug!(
                    zone,
                    carbon_intensity = m.carbon_intensity,
                    sources = m.top_sources.len(),
                    "zone metrics fetched"
                );
                Ok(m)
            }
            Err(e) => {
                counter!("grid_bot_zone_fetch_errors_total").increment(1);
                tracing::warn!(zone, provider = self.provider.name(), "zone excluded: {e}");
                Err(e)
            }
        }
    }

    async fn compose_and_publish(
        &self,
        scope: &Scope,
        a: &ZoneMetrics,
        b: &ZoneMetrics,
    ) -> Result<ScopeResult, CycleError> {
        let post = compose(a, b, &self.cfg.post)?;

        if self.cfg.dry_run {
            tracing::info!(
                scope = %scope.name,
                chars = post.char_len(),
                facets = post.facets.len(),
                "dry run, not publishing:\n{}",
                post.text
            );
            return Ok(ScopeResult::DryRun { post });
        }

        let handle = self.session.publish_with_reauth(&post).await?;
        counter!("grid_bot_posts_total").increment(1);
        gauge!("grid_bot_last_post_ts").set(Utc::now().timestamp() as f64);
        Ok(ScopeResult::Published { post: handle })
    }

    /// Run due scopes until `shutdown` flips to `true` (or its sender goes away).
    ///
    /// Between cycles the loop sleeps until the earliest scope is due again. A
    /// cycle in progress is never interrupted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_due().await;
            if self.cfg.run_once {
                tracing::info!("run_once set, exiting after one cycle");
                break;
            }

            let wake = self.next_due();
            let wait = wake.saturating_duration_since(Instant::now());
            tracing::info!(wait_secs = wait.as_secs(), "next cycle scheduled");
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("bot loop stopped");
    }
}

/// `now + wait`, clamped to roughly 30 years so `Instant` never overflows.
fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
