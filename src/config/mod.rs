// src/config/mod.rs
//! Bot configuration: one file (TOML or JSON) for behaviour, env for secrets.
//!
//! Lookup order for the file:
//! 1) `$GRID_BOT_CONFIG_PATH`
//! 2) `config/bot.toml`
//! 3) `config/bot.json`

pub mod matchup;
pub mod post;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use matchup::{MatchupConfig, MatchupMode};
pub use post::{FacetKind, IntensityTier, PostConfig, SourceLayout, TierConfig, TierGlyphs};

pub const ENV_CONFIG_PATH: &str = "GRID_BOT_CONFIG_PATH";
pub const ENV_RUN_ONCE: &str = "GRID_BOT_RUN_ONCE";
pub const ENV_DRY_RUN: &str = "GRID_BOT_DRY_RUN";
pub const ENV_SAVE_POSTS: &str = "SAVE_POSTS";

const DEFAULT_TOML_PATH: &str = "config/bot.toml";
const DEFAULT_JSON_PATH: &str = "config/bot.json";

/// One year.
pub const MAX_POST_INTERVAL_HOURS: u64 = 24 * 365;
/// One day.
pub const MAX_RECOVERY_INTERVAL_SECS: u64 = 24 * 3600;

fn default_post_interval_hours() -> u64 {
    6
}
fn default_recovery_interval_secs() -> u64 {
    300
}
fn default_posts_log_path() -> PathBuf {
    PathBuf::from("posts.log")
}
fn default_data_base_url() -> String {
    "https://api.electricitymap.org/v3".to_string()
}
fn default_data_health_url() -> String {
    "https://api.electricitymap.org/health".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_service_url() -> String {
    "https://bsky.social".to_string()
}
fn default_initial_backoff_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    5
}

/// Which Electricity Maps breakdown feeds the top-sources list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownKind {
    #[default]
    Consumption,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_base_url")]
    pub base_url: String,
    #[serde(default = "default_data_health_url")]
    pub health_url: String,
    #[serde(default)]
    pub breakdown: BreakdownKind,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: default_data_base_url(),
            health_url: default_data_health_url(),
            breakdown: BreakdownKind::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// First login backoff; doubles on every rate-limited attempt.
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// BCP-47 tags attached to each post record.
    #[serde(default)]
    pub langs: Vec<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            langs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_post_interval_hours")]
    pub post_interval_hours: u64,
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
    #[serde(default)]
    pub save_posts: bool,
    #[serde(default = "default_posts_log_path")]
    pub posts_log_path: PathBuf,
    /// Compose and log, never publish.
    #[serde(default)]
    pub dry_run: bool,
    /// Run a single cycle and exit.
    #[serde(default)]
    pub run_once: bool,
    /// Fixed seed for matchup draws; random when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// `host:port` for `/health`, `/status` and `/metrics`. Disabled when absent.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default)]
    pub matchup: MatchupConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub post: PostConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            post_interval_hours: default_post_interval_hours(),
            recovery_interval_secs: default_recovery_interval_secs(),
            save_posts: false,
            posts_log_path: default_posts_log_path(),
            dry_run: false,
            run_once: false,
            rng_seed: None,
            metrics_addr: None,
            matchup: MatchupConfig::default(),
            data: DataConfig::default(),
            post: PostConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn post_interval(&self) -> Duration {
        Duration::from_secs(self.post_interval_hours.saturating_mul(3600))
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    /// Env flags win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_flag(ENV_RUN_ONCE) {
            self.run_once = v;
        }
        if let Some(v) = env_flag(ENV_DRY_RUN) {
            self.dry_run = v;
        }
        if let Some(v) = env_flag(ENV_SAVE_POSTS) {
            self.save_posts = v;
        }
    }

    /// Reject configurations that would fail every cycle.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_POST_INTERVAL_HOURS).contains(&self.post_interval_hours) {
            bail!(
                "post_interval_hours must be in 1..={MAX_POST_INTERVAL_HOURS}, got {}",
                self.post_interval_hours
            );
        }
        if !(1..=MAX_RECOVERY_INTERVAL_SECS).contains(&self.recovery_interval_secs) {
            bail!(
                "recovery_interval_secs must be in 1..={MAX_RECOVERY_INTERVAL_SECS}, got {}",
                self.recovery_interval_secs
            );
        }
        if self.publish.initial_backoff_secs == 0 {
            bail!("publish.initial_backoff_secs must be > 0");
        }

        let post = &self.post;
        if post.max_length < 4 {
            bail!("post.max_length must be at least 4, got {}", post.max_length);
        }
        if !post.tiers.is_ordered() {
            bail!(
                "post.tiers must satisfy very_low < low < medium (got {} / {} / {})",
                post.tiers.very_low,
                post.tiers.low,
                post.tiers.medium
            );
        }
        if !post.timestamp_format_is_valid() {
            bail!(
                "post.timestamp_format `{}` is not a valid strftime pattern",
                post.timestamp_format
            );
        }
        match post.facet_kind {
            FacetKind::Mention if post.mention_handle.trim_start_matches('@').is_empty() => {
                bail!("post.mention_handle is empty but facet_kind = \"mention\"")
            }
            FacetKind::Link if post.link_label.is_empty() || post.link_uri.is_empty() => {
                bail!("post.link_label and post.link_uri are required for facet_kind = \"link\"")
            }
            _ => {}
        }

        for (zone, w) in &self.matchup.weights {
            if !w.is_finite() || *w < 0.0 {
                bail!("matchup.weights.{zone} must be a finite, non-negative number");
            }
        }

        let m = &self.matchup;
        match m.mode {
            MatchupMode::Uniform => {
                require_pair("matchup.zones", &m.zones)?;
            }
            MatchupMode::Anchor => {
                let anchor = m
                    .anchor
                    .as_deref()
                    .ok_or_else(|| anyhow!("matchup.anchor is required for mode = \"anchor\""))?;
                if !m.zones.iter().any(|z| z == anchor) {
                    bail!("matchup.anchor `{anchor}` is not listed in matchup.zones");
                }
                require_pair("matchup.zones", &m.zones)?;
            }
            MatchupMode::WeightedDivision => {
                if m.divisions.is_empty() {
                    bail!("matchup.divisions is empty but mode = \"weighted_division\"");
                }
                for (name, zones) in &m.divisions {
                    require_pair(&format!("matchup.divisions.{name}"), zones)?;
                }
            }
        }
        Ok(())
    }
}

fn require_pair(what: &str, zones: &[String]) -> Result<()> {
    let distinct: HashSet<&str> = zones.iter().map(String::as_str).collect();
    if distinct.len() < 2 {
        bail!("{what} needs at least 2 distinct zones, got {}", distinct.len());
    }
    Ok(())
}

fn env_flag(name: &str) -> Option<bool> {
    let v = std::env::var(name).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load a config from an explicit path. TOML unless the extension says `json`.
pub fn load_from(path: &Path) -> Result<BotConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading bot config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, &ext).with_context(|| format!("parsing {}", path.display()))
}

/// Load using env var + fallbacks, then apply env overrides.
pub fn load_default() -> Result<BotConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        load_from(&pb)?
    } else if Path::new(DEFAULT_TOML_PATH).exists() {
        load_from(Path::new(DEFAULT_TOML_PATH))?
    } else if Path::new(DEFAULT_JSON_PATH).exists() {
        load_from(Path::new(DEFAULT_JSON_PATH))?
    } else {
        bail!(
            "no bot config found (set {ENV_CONFIG_PATH} or create {} / {})",
            DEFAULT_TOML_PATH,
            DEFAULT_JSON_PATH
        );
    };
    cfg.apply_env_overrides();
    Ok(cfg)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<BotConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("invalid JSON bot config");
    }
    toml::from_str(s).context("invalid TOML bot config")
}

/// Secrets, env only.
#[derive(Clone)]
pub struct Credentials {
    pub bluesky_handle: String,
    pub bluesky_password: String,
    pub electricity_maps_token: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let read = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let handle = read("BLUESKY_HANDLE");
        let password = read("BLUESKY_PASSWORD");
        let token = read("ELECTRICITY_MAPS_TOKEN");

        let (Some(bluesky_handle), Some(bluesky_password)) = (handle, password) else {
            bail!("missing Bluesky credentials: set BLUESKY_HANDLE and BLUESKY_PASSWORD in .env");
        };
        let Some(electricity_maps_token) = token else {
            bail!(
                "missing ELECTRICITY_MAPS_TOKEN (sign up at https://api-portal.electricitymaps.com)"
            );
        };
        Ok(Self {
            bluesky_handle,
            bluesky_password,
            electricity_maps_token,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bluesky_handle", &self.bluesky_handle)
            .field("bluesky_password", &"<redacted>")
            .field("electricity_maps_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor_cfg() -> BotConfig {
        let mut cfg = BotConfig::default();
        cfg.matchup.mode = MatchupMode::Anchor;
        cfg.matchup.anchor = Some("FR".into());
        cfg.matchup.zones = vec!["FR".into(), "DE".into(), "PL".into()];
        cfg
    }

    #[test]
    fn anchor_config_validates() {
        anchor_cfg().validate().unwrap();
    }

    #[test]
    fn anchor_outside_zone_list_is_rejected() {
        let mut cfg = anchor_cfg();
        cfg.matchup.anchor = Some("ES".into());
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("not listed"), "{err}");
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        let mut cfg = anchor_cfg();
        cfg.post.tiers.low = 50.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn single_zone_division_is_rejected() {
        let mut cfg = BotConfig::default();
        cfg.matchup.mode = MatchupMode::WeightedDivision;
        cfg.matchup
            .divisions
            .insert("north".into(), vec!["SE".into(), "SE".into()]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("divisions.north"), "{err}");
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let c = Credentials {
            bluesky_handle: "bot.bsky.social".into(),
            bluesky_password: "hunter2".into(),
            electricity_maps_token: "tok".into(),
        };
        let s = format!("{c:?}");
        assert!(!s.contains("hunter2"));
        assert!(!s.contains("tok\""));
    }
}
