// src/config/post.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_MAX_POST_LENGTH: usize = 300;

fn default_max_length() -> usize {
    DEFAULT_MAX_POST_LENGTH
}
fn default_timestamp_format() -> String {
    "%H:%M UTC".to_string()
}
fn default_mention_handle() -> String {
    "electricitymaps.bsky.social".to_string()
}
fn default_link_label() -> String {
    "Electricity Maps".to_string()
}
fn default_link_uri() -> String {
    "https://app.electricitymaps.com".to_string()
}

/// How the top-3 sources of a zone are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayout {
    /// One source per line below the zone header.
    #[default]
    Newline,
    /// Appended to the header: `... using 83% Nuclear, 10% Gas, 6% Wind`.
    Comma,
}

/// Which rich-text annotation the attribution line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    #[default]
    Mention,
    Link,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityTier {
    VeryLow,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierGlyphs {
    pub very_low: String,
    pub low: String,
    pub medium: String,
    pub high: String,
}

impl Default for TierGlyphs {
    fn default() -> Self {
        Self {
            very_low: "\u{1F7E2}".to_string(),
            low: "\u{1F7E1}".to_string(),
            medium: "\u{1F7E0}".to_string(),
            high: "\u{1F534}".to_string(),
        }
    }
}

impl TierGlyphs {
    pub fn glyph(&self, tier: IntensityTier) -> &str {
        match tier {
            IntensityTier::VeryLow => &self.very_low,
            IntensityTier::Low => &self.low,
            IntensityTier::Medium => &self.medium,
            IntensityTier::High => &self.high,
        }
    }
}

/// Intensity thresholds in g CO2/kWh; each is an exclusive upper bound.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierConfig {
    pub very_low: f64,
    pub low: f64,
    pub medium: f64,
    pub glyphs: TierGlyphs,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            very_low: 100.0,
            low: 200.0,
            medium: 400.0,
            glyphs: TierGlyphs::default(),
        }
    }
}

impl TierConfig {
    pub fn tier_for(&self, intensity: f64) -> IntensityTier {
        if intensity < self.very_low {
            IntensityTier::VeryLow
        } else if intensity < self.low {
            IntensityTier::Low
        } else if intensity < self.medium {
            IntensityTier::Medium
        } else {
            IntensityTier::High
        }
    }

    pub fn glyph_for(&self, intensity: f64) -> &str {
        self.glyphs.glyph(self.tier_for(intensity))
    }

    pub fn is_ordered(&self) -> bool {
        self.very_low < self.low && self.low < self.medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostConfig {
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub source_layout: SourceLayout,
    /// chrono `strftime` pattern, rendered in UTC.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default)]
    pub facet_kind: FacetKind,
    /// Handle without the leading `@`.
    #[serde(default = "default_mention_handle")]
    pub mention_handle: String,
    #[serde(default = "default_link_label")]
    pub link_label: String,
    #[serde(default = "default_link_uri")]
    pub link_uri: String,
    /// Zone code → display name. Unlisted zones show their code.
    #[serde(default)]
    pub display_names: HashMap<String, String>,
    /// Source category → glyph prefixed to its line.
    #[serde(default)]
    pub source_glyphs: HashMap<String, String>,
    #[serde(default)]
    pub tiers: TierConfig,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            source_layout: SourceLayout::default(),
            timestamp_format: default_timestamp_format(),
            facet_kind: FacetKind::default(),
            mention_handle: default_mention_handle(),
            link_label: default_link_label(),
            link_uri: default_link_uri(),
            display_names: HashMap::new(),
            source_glyphs: HashMap::new(),
            tiers: TierConfig::default(),
        }
    }
}

impl PostConfig {
    pub fn display_name<'a>(&'a self, zone_id: &'a str) -> &'a str {
        self.display_names
            .get(zone_id)
            .map(String::as_str)
            .unwrap_or(zone_id)
    }

    pub fn timestamp_format_is_valid(&self) -> bool {
        use chrono::format::{Item, StrftimeItems};
        !StrftimeItems::new(&self.timestamp_format).any(|i| matches!(i, Item::Error))
    }

    pub fn source_glyph(&self, source: &str) -> Option<&str> {
        self.source_glyphs
            .get(source)
            .map(String::as_str)
            .filter(|g| !g.is_empty())
    }
}
