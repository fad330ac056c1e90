// src/compose/mod.rs
//! Renders two zone records into one post with attribution facets.

pub mod facets;
pub mod format;

use serde::Serialize;

use crate::config::{FacetKind, PostConfig, SourceLayout};
use crate::error::CompositionError;
use crate::zone::ZoneMetrics;
pub use facets::{facet_for, locate_anchor, Annotation, Facet};
use format::{flag_glyph, format_source, format_timestamp, join_inline, truncate_chars};

pub const NO_BREAKDOWN_TEXT: &str = "No power generation data available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedPost {
    pub text: String,
    pub facets: Vec<Facet>,
}

impl ComposedPost {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Compose the comparison post. `primary` comes first and supplies the data timestamp.
pub fn compose(
    primary: &ZoneMetrics,
    secondary: &ZoneMetrics,
    cfg: &PostConfig,
) -> Result<ComposedPost, CompositionError> {
    if cfg.max_length < 4 {
        return Err(CompositionError::InvalidMaxLength(cfg.max_length));
    }
    let attribution = Attribution::from_config(cfg)?;

    let stamp = format_timestamp(&primary.timestamp, &cfg.timestamp_format);
    let closing = match &attribution {
        Some(a) => format!("Data: {} ({stamp})", a.anchor),
        None => format!("Data: {stamp}"),
    };

    let text = [zone_block(primary, cfg), zone_block(secondary, cfg), closing].join("\n\n");

    let mut facets: Vec<Facet> = attribution
        .and_then(|a| facet_for(&text, &a.anchor, a.annotation))
        .into_iter()
        .collect();

    match truncate_chars(&text, cfg.max_length) {
        Some((short, kept_bytes)) => {
            let before = facets.len();
            facets.retain(|f| f.byte_end <= kept_bytes);
            if facets.len() != before {
                tracing::debug!(
                    dropped = before - facets.len(),
                    "facets fell outside truncated post"
                );
            }
            tracing::warn!(
                max_length = cfg.max_length,
                original = text.chars().count(),
                "post truncated"
            );
            Ok(ComposedPost {
                text: short,
                facets,
            })
        }
        None => Ok(ComposedPost { text, facets }),
    }
}

struct Attribution {
    anchor: String,
    annotation: Annotation,
}

impl Attribution {
    fn from_config(cfg: &PostConfig) -> Result<Option<Self>, CompositionError> {
        match cfg.facet_kind {
            FacetKind::None => Ok(None),
            FacetKind::Mention => {
                let handle = cfg.mention_handle.trim().trim_start_matches('@');
                if handle.is_empty() {
                    return Err(CompositionError::EmptyAnchor("mention"));
                }
                Ok(Some(Self {
                    anchor: format!("@{handle}"),
                    annotation: Annotation::Mention {
                        handle: handle.to_string(),
                    },
                }))
            }
            FacetKind::Link => {
                if cfg.link_label.trim().is_empty() || cfg.link_uri.trim().is_empty() {
                    return Err(CompositionError::EmptyAnchor("link"));
                }
                Ok(Some(Self {
                    anchor: cfg.link_label.clone(),
                    annotation: Annotation::Link {
                        uri: cfg.link_uri.clone(),
                    },
                }))
            }
        }
    }
}

fn zone_block(m: &ZoneMetrics, cfg: &PostConfig) -> String {
    let mut header = String::new();
    if let Some(flag) = flag_glyph(&m.zone_id) {
        header.push_str(&flag);
        header.push(' ');
    }
    header.push_str(&format!(
        "{}: {}g CO2/kWh {}",
        cfg.display_name(&m.zone_id),
        m.carbon_intensity.round() as i64,
        cfg.tiers.glyph_for(m.carbon_intensity)
    ));

    if m.top_sources.is_empty() {
        return format!("{header}\n{NO_BREAKDOWN_TEXT}");
    }

    let sources: Vec<String> = m
        .top_sources
        .iter()
        .map(|s| format_source(s, cfg.source_glyph(&s.name)))
        .collect();

    match cfg.source_layout {
        SourceLayout::Newline => format!("{header}\n{}", sources.join("\n")),
        SourceLayout::Comma => format!("{header} using {}", join_inline(&sources)),
    }
}
