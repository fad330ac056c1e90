// src/matchup.rs
//! Picks the two zones a post compares.
//!
//! All draws are without replacement and take the RNG as a parameter, so a
//! seeded `StdRng` makes every selection reproducible.

use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::{MatchupConfig, MatchupMode};
use crate::error::SelectionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matchup {
    pub zone_a: String,
    pub zone_b: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    Uniform,
    /// The anchor is always `zone_a`.
    Anchor(String),
    Weighted,
}

/// A zone set one matchup is drawn from: everything, or a single division.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub name: String,
    pub zones: Vec<String>,
    pub mode: SelectionMode,
}

pub const ALL_ZONES_SCOPE: &str = "all";

impl MatchupConfig {
    /// Scopes processed in one cycle: one per division in weighted mode, else one.
    pub fn scopes(&self) -> Vec<Scope> {
        match self.mode {
            MatchupMode::Uniform => vec![Scope {
                name: ALL_ZONES_SCOPE.to_string(),
                zones: self.zones.clone(),
                mode: SelectionMode::Uniform,
            }],
            MatchupMode::Anchor => vec![Scope {
                name: ALL_ZONES_SCOPE.to_string(),
                zones: self.zones.clone(),
                mode: SelectionMode::Anchor(self.anchor.clone().unwrap_or_default()),
            }],
            MatchupMode::WeightedDivision => self
                .divisions
                .iter()
                .map(|(name, zones)| Scope {
                    name: name.clone(),
                    zones: zones.clone(),
                    mode: SelectionMode::Weighted,
                })
                .collect(),
        }
    }

    pub fn scope(&self, division: &str) -> Result<Scope, SelectionError> {
        self.scopes()
            .into_iter()
            .find(|s| s.name == division)
            .ok_or_else(|| SelectionError::UnknownDivision(division.to_string()))
    }
}

/// Draw a matchup from `scope`, ignoring zones in `excluded`.
pub fn select_in_scope<R: Rng + ?Sized>(
    scope: &Scope,
    excluded: &HashSet<String>,
    weights: &HashMap<String, f64>,
    rng: &mut R,
) -> Result<Matchup, SelectionError> {
    let zones: Vec<String> = scope
        .zones
        .iter()
        .filter(|z| !excluded.contains(*z))
        .cloned()
        .collect();
    select(&scope.name, &zones, &scope.mode, weights, rng)
}

pub fn select<R: Rng + ?Sized>(
    scope: &str,
    zones: &[String],
    mode: &SelectionMode,
    weights: &HashMap<String, f64>,
    rng: &mut R,
) -> Result<Matchup, SelectionError> {
    let zones = dedup(zones);
    let insufficient = |available: usize| SelectionError::InsufficientZones {
        scope: scope.to_string(),
        available,
    };

    match mode {
        SelectionMode::Uniform => {
            if zones.len() < 2 {
                return Err(insufficient(zones.len()));
            }
            let mut pool = zones;
            let a = pool.swap_remove(rng.random_range(0..pool.len()));
            let b = pool.swap_remove(rng.random_range(0..pool.len()));
            Ok(Matchup {
                zone_a: a.to_string(),
                zone_b: b.to_string(),
            })
        }
        SelectionMode::Anchor(anchor) => {
            if !zones.contains(&anchor.as_str()) {
                return Err(SelectionError::AnchorNotEligible {
                    anchor: anchor.clone(),
                    scope: scope.to_string(),
                });
            }
            let others: Vec<&str> = zones.iter().copied().filter(|z| z != anchor).collect();
            if others.is_empty() {
                return Err(insufficient(zones.len()));
            }
            let b = others[rng.random_range(0..others.len())];
            Ok(Matchup {
                zone_a: anchor.clone(),
                zone_b: b.to_string(),
            })
        }
        SelectionMode::Weighted => {
            if zones.len() < 2 {
                return Err(insufficient(zones.len()));
            }
            let mut pool: Vec<(&str, f64)> = zones
                .iter()
                .map(|z| (*z, sanitize_weight(weights.get(*z).copied())))
                .collect();
            let a = draw_weighted(&mut pool, rng);
            let b = draw_weighted(&mut pool, rng);
            Ok(Matchup {
                zone_a: a.to_string(),
                zone_b: b.to_string(),
            })
        }
    }
}

/// Remove and return one entry, chosen with probability proportional to its
/// weight. A pool whose weights sum to zero is drawn uniformly.
///
/// `pool` must not be empty.
fn draw_weighted<'a, R: Rng + ?Sized>(pool: &mut Vec<(&'a str, f64)>, rng: &mut R) -> &'a str {
    let total: f64 = pool.iter().map(|(_, w)| w).sum();
    let idx = if total > 0.0 {
        let target = rng.random::<f64>() * total;
        let mut acc = 0.0;
        let mut chosen = None;
        for (i, (_, w)) in pool.iter().enumerate() {
            acc += w;
            if *w > 0.0 && target < acc {
                chosen = Some(i);
                break;
            }
        }
        // Rounding can leave `target` just past the last bucket.
        chosen.unwrap_or_else(|| {
            pool.iter()
                .rposition(|(_, w)| *w > 0.0)
                .unwrap_or(pool.len() - 1)
        })
    } else {
        rng.random_range(0..pool.len())
    };
    pool.remove(idx).0
}

fn sanitize_weight(w: Option<f64>) -> f64 {
    match w {
        Some(w) if w.is_finite() && w > 0.0 => w,
        _ => 0.0,
    }
}

fn dedup(zones: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    zones
        .iter()
        .map(String::as_str)
        .filter(|z| seen.insert(*z))
        .collect()
}
