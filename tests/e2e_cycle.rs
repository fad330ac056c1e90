// tests/e2e_cycle.rs
//
// Full cycles through GridBot with fake provider + backend: selection,
// concurrent fetch, normalization, composition and publish.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{fr_raw, pl_raw, FakeBackend, FakeProvider, RecordingSleeper};
use grid_carbon_bot::config::{BotConfig, MatchupMode};
use grid_carbon_bot::publish::{PublishSession, RetryPolicy};
use grid_carbon_bot::{GridBot, ScopeResult};
use tokio::sync::watch;

fn anchor_cfg() -> BotConfig {
    let mut cfg = BotConfig::default();
    cfg.rng_seed = Some(7);
    cfg.matchup.mode = MatchupMode::Anchor;
    cfg.matchup.anchor = Some("FR".into());
    cfg.matchup.zones = vec!["FR".into(), "PL".into()];
    cfg.post.display_names.insert("FR".into(), "France".into());
    cfg.post.display_names.insert("PL".into(), "Poland".into());
    cfg
}

fn bot(cfg: BotConfig, provider: FakeProvider, backend: &Arc<FakeBackend>) -> GridBot {
    let session = PublishSession::new(
        backend.clone(),
        Arc::new(RecordingSleeper::default()),
        "bot.bsky.social",
        "pw",
        RetryPolicy::default(),
    );
    GridBot::new(cfg, Arc::new(provider), Arc::new(session))
}

fn fr_pl() -> FakeProvider {
    FakeProvider::new().with_zone("FR", fr_raw()).with_zone("PL", pl_raw())
}

#[tokio::test]
async fn france_vs_poland_is_published() {
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(anchor_cfg(), fr_pl(), &backend);

    let report = bot.run_cycle().await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.published().count(), 1);

    let texts = backend.sent_texts();
    assert_eq!(texts.len(), 1);
    let text = &texts[0];
    let expected = "\u{1F1EB}\u{1F1F7} France: 42g CO2/kWh \u{1F7E2}\n\
                    83% Nuclear\n10% Gas\n6% Wind\n\n\
                    \u{1F1F5}\u{1F1F1} Poland: 650g CO2/kWh \u{1F534}\n\
                    89% Coal\n11% Wind\n\n\
                    Data: @electricitymaps.bsky.social (13:00 UTC)";
    assert_eq!(text, expected);
    assert!(text.chars().count() <= 300);
    assert!(!text.contains("Unknown"));

    let (_, sent) = backend.sent.lock().unwrap()[0].clone();
    assert_eq!(sent.facets.len(), 1);
    assert_eq!(
        sent.facets[0].anchor_in(&sent.text),
        Some("@electricitymaps.bsky.social")
    );
}

#[tokio::test]
async fn shorter_max_length_truncates_with_ellipsis() {
    let mut cfg = anchor_cfg();
    cfg.post.max_length = 60;
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(cfg, fr_pl(), &backend);

    assert!(bot.run_cycle().await.is_success());
    let (_, sent) = backend.sent.lock().unwrap()[0].clone();
    assert_eq!(sent.text.chars().count(), 60);
    assert!(sent.text.ends_with("..."));
    // Attribution was cut off, so no facet may point past the text.
    assert!(sent.facets.is_empty());
}

#[tokio::test]
async fn dry_run_composes_without_publishing() {
    let mut cfg = anchor_cfg();
    cfg.dry_run = true;
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(cfg, fr_pl(), &backend);

    let report = bot.run_cycle().await;
    assert!(report.is_success());
    match &report.scopes[0].result {
        ScopeResult::DryRun { post } => assert!(post.text.contains("France")),
        other => panic!("expected dry run, got {other:?}"),
    }
    assert_eq!(backend.login_count(), 0);
    assert!(backend.sent_texts().is_empty());
}

#[tokio::test]
async fn failing_zone_is_excluded_and_reselected() {
    let mut cfg = anchor_cfg();
    cfg.matchup.zones = vec!["FR".into(), "DE".into(), "PL".into()];
    let provider = fr_pl().failing("DE");
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(cfg, provider, &backend);

    // Whatever the seed draws first, the posted matchup must be FR vs PL.
    let report = bot.run_cycle().await;
    assert!(report.is_success(), "{report:?}");
    let m = report.scopes[0].matchup.clone().unwrap();
    assert_eq!((m.zone_a.as_str(), m.zone_b.as_str()), ("FR", "PL"));
    assert_eq!(backend.sent_texts().len(), 1);
}

#[tokio::test]
async fn failing_anchor_aborts_the_scope() {
    let provider = FakeProvider::new().with_zone("PL", pl_raw()).failing("FR");
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(anchor_cfg(), provider, &backend);

    let report = bot.run_cycle().await;
    assert!(!report.is_success());
    match &report.scopes[0].result {
        ScopeResult::Failed { stage, error } => {
            assert_eq!(*stage, "fetch");
            assert!(error.contains("FR"), "{error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(backend.sent_texts().is_empty());
}

#[tokio::test]
async fn too_few_usable_zones_is_a_selection_failure() {
    let mut cfg = BotConfig::default();
    cfg.rng_seed = Some(1);
    cfg.matchup.zones = vec!["FR".into(), "DE".into()];
    let provider = FakeProvider::new().with_zone("FR", fr_raw()).failing("DE");
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(cfg, provider, &backend);

    let report = bot.run_cycle().await;
    match &report.scopes[0].result {
        ScopeResult::Failed { stage, .. } => assert_eq!(*stage, "select"),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn successful_fetches_are_reused_across_reselection() {
    let mut cfg = BotConfig::default();
    cfg.rng_seed = Some(3);
    cfg.matchup.zones = vec!["FR".into(), "DE".into(), "PL".into()];
    let provider = Arc::new(fr_pl().failing("DE"));
    let backend = Arc::new(FakeBackend::new());
    let session = PublishSession::new(
        backend.clone(),
        Arc::new(RecordingSleeper::default()),
        "bot.bsky.social",
        "pw",
        RetryPolicy::default(),
    );
    let bot = GridBot::new(cfg, provider.clone(), Arc::new(session));

    assert!(bot.run_cycle().await.is_success());
    let calls = provider.calls();
    for zone in ["FR", "DE", "PL"] {
        assert!(calls.iter().filter(|c| *c == zone).count() <= 1, "{calls:?}");
    }
}

#[tokio::test]
async fn weighted_divisions_post_once_each() {
    let mut cfg = BotConfig::default();
    cfg.rng_seed = Some(11);
    cfg.matchup.mode = MatchupMode::WeightedDivision;
    cfg.matchup.divisions = BTreeMap::from([
        ("east".to_string(), vec!["PL".to_string(), "FR".to_string()]),
        ("west".to_string(), vec!["FR".to_string(), "PL".to_string()]),
    ]);
    cfg.matchup.weights.insert("FR".into(), 1.0);
    cfg.matchup.weights.insert("PL".into(), 1.0);
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(cfg, fr_pl(), &backend);

    let report = bot.run_cycle().await;
    assert!(report.is_success(), "{report:?}");
    let names: Vec<&str> = report.scopes.iter().map(|s| s.scope.as_str()).collect();
    assert_eq!(names, ["east", "west"]);
    assert_eq!(backend.sent_texts().len(), 2);
    // One login serves both divisions.
    assert_eq!(backend.login_count(), 1);
}

#[tokio::test]
async fn run_once_returns_after_a_single_cycle() {
    let mut cfg = anchor_cfg();
    cfg.run_once = true;
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(cfg, fr_pl(), &backend);

    let (_tx, rx) = watch::channel(false);
    tokio::time::timeout(Duration::from_secs(5), bot.run(rx))
        .await
        .expect("run_once must not wait for the next interval");
    assert_eq!(backend.sent_texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_the_interval_sleep() {
    let backend = Arc::new(FakeBackend::new());
    let bot = Arc::new(bot(anchor_cfg(), fr_pl(), &backend));

    let (tx, rx) = watch::channel(false);
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run(rx).await })
    };

    // Let the first cycle finish and the loop start sleeping for 6h.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.sent_texts().len(), 1);

    tx.send(true).unwrap();
    runner.await.unwrap();
    assert_eq!(backend.sent_texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_division_does_not_repost_healthy_ones() {
    let mut cfg = BotConfig::default();
    cfg.rng_seed = Some(5);
    cfg.matchup.mode = MatchupMode::WeightedDivision;
    cfg.matchup.divisions = BTreeMap::from([
        ("bad".to_string(), vec!["DE".to_string(), "ES".to_string()]),
        ("good".to_string(), vec!["FR".to_string(), "PL".to_string()]),
    ]);
    for zone in ["FR", "PL", "DE", "ES"] {
        cfg.matchup.weights.insert(zone.into(), 1.0);
    }
    let provider = Arc::new(fr_pl().failing("DE").failing("ES"));
    let backend = Arc::new(FakeBackend::new());
    let session = PublishSession::new(
        backend.clone(),
        Arc::new(RecordingSleeper::default()),
        "bot.bsky.social",
        "pw",
        RetryPolicy::default(),
    );
    let bot = Arc::new(GridBot::new(cfg, provider.clone(), Arc::new(session)));

    let (tx, rx) = watch::channel(false);
    let runner = {
        let bot = bot.clone();
        tokio::spawn(async move { bot.run(rx).await })
    };

    // 1h covers many 300s recovery windows but no 6h post interval.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    tx.send(true).unwrap();
    runner.await.unwrap();

    assert_eq!(backend.sent_texts().len(), 1);
    let retries = provider.calls().iter().filter(|z| *z == "DE").count();
    assert!(retries >= 10, "bad division retried only {retries} times");
}

#[tokio::test]
async fn run_due_skips_scopes_that_already_posted() {
    let backend = Arc::new(FakeBackend::new());
    let bot = bot(anchor_cfg(), fr_pl(), &backend);

    assert_eq!(bot.run_due().await.scopes.len(), 1);
    assert!(bot.run_due().await.scopes.is_empty());
    assert_eq!(backend.sent_texts().len(), 1);
}
