// src/config/matchup.rs
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn default_max_selection_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchupMode {
    #[default]
    Uniform,
    Anchor,
    WeightedDivision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchupConfig {
    #[serde(default)]
    pub mode: MatchupMode,
    /// Fixed first zone in `anchor` mode.
    #[serde(default)]
    pub anchor: Option<String>,
    /// Eligible zones for `uniform` and `anchor` modes.
    #[serde(default)]
    pub zones: Vec<String>,
    /// Division name → member zones, used by `weighted_division`.
    #[serde(default)]
    pub divisions: BTreeMap<String, Vec<String>>,
    /// Zone → draw weight. Missing entries weigh 0.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// How many zones a scope may lose to data errors before it gives up.
    #[serde(default = "default_max_selection_attempts")]
    pub max_selection_attempts: u32,
}

impl Default for MatchupConfig {
    fn default() -> Self {
        Self {
            mode: MatchupMode::default(),
            anchor: None,
            zones: Vec::new(),
            divisions: BTreeMap::new(),
            weights: HashMap::new(),
            max_selection_attempts: default_max_selection_attempts(),
        }
    }
}
