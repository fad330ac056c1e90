// tests/compose_post.rs
//
// Length limit and facet offsets across many zone/length combinations.

use chrono::{TimeZone, Utc};

use grid_carbon_bot::compose::{compose, Annotation};
use grid_carbon_bot::config::{FacetKind, PostConfig, SourceLayout};
use grid_carbon_bot::zone::{SourceShare, ZoneMetrics};

fn metrics(zone: &str, ci: f64, sources: &[(&str, f64)]) -> ZoneMetrics {
    ZoneMetrics {
        zone_id: zone.to_string(),
        carbon_intensity: ci,
        top_sources: sources
            .iter()
            .map(|(n, p)| SourceShare {
                name: n.to_string(),
                percentage: *p,
            })
            .collect(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap(),
    }
}

fn pair() -> (ZoneMetrics, ZoneMetrics) {
    (
        metrics("US-CAL-CISO", 210.4, &[("gas", 45.0), ("solar", 30.0), ("wind", 10.0)]),
        metrics("DK-DK1", 80.0, &[("wind", 70.0), ("biomass", 20.0), ("coal", 5.0)]),
    )
}

#[test]
fn every_max_length_is_respected() {
    let (a, b) = pair();
    for layout in [SourceLayout::Newline, SourceLayout::Comma] {
        let full = compose(&a, &b, &PostConfig { source_layout: layout, ..PostConfig::default() })
            .unwrap()
            .char_len();
        for max in 4..=full + 5 {
            let cfg = PostConfig {
                max_length: max,
                source_layout: layout,
                ..PostConfig::default()
            };
            let post = compose(&a, &b, &cfg).unwrap();
            if full > max {
                assert_eq!(post.char_len(), max, "max={max}");
                assert!(post.text.ends_with("..."));
            } else {
                assert_eq!(post.char_len(), full);
            }
            for f in &post.facets {
                assert!(f.byte_end <= post.text.len());
                assert_eq!(f.anchor_in(&post.text), Some("@electricitymaps.bsky.social"));
            }
        }
    }
}

#[test]
fn facet_bytes_decode_to_anchor_after_multibyte_glyphs() {
    let (a, b) = pair();
    for (kind, anchor) in [
        (FacetKind::Mention, "@electricitymaps.bsky.social"),
        (FacetKind::Link, "Electricity Maps"),
    ] {
        let mut cfg = PostConfig {
            facet_kind: kind,
            ..PostConfig::default()
        };
        cfg.source_glyphs.insert("wind".into(), "\u{1F4A8}".into());
        let post = compose(&a, &b, &cfg).unwrap();
        assert_eq!(post.facets.len(), 1);
        let f = &post.facets[0];
        let bytes = &post.text.as_bytes()[f.byte_start..f.byte_end];
        assert_eq!(std::str::from_utf8(bytes).unwrap(), anchor);
        let first = anchor.chars().next().unwrap();
        let char_pos = post.text.chars().position(|c| c == first).unwrap();
        assert!(f.byte_start > char_pos);
    }
}

#[test]
fn mention_handle_with_at_sign_is_normalized() {
    let (a, b) = pair();
    let cfg = PostConfig {
        mention_handle: "@grid.example".into(),
        ..PostConfig::default()
    };
    let post = compose(&a, &b, &cfg).unwrap();
    assert!(post.text.ends_with("Data: @grid.example (13:00 UTC)"));
    assert_eq!(
        post.facets[0].annotation,
        Annotation::Mention {
            handle: "grid.example".into()
        }
    );
}

#[test]
fn custom_timestamp_format_is_used() {
    let (a, b) = pair();
    let cfg = PostConfig {
        timestamp_format: "%d/%m/%y %H:%M".into(),
        facet_kind: FacetKind::None,
        ..PostConfig::default()
    };
    let post = compose(&a, &b, &cfg).unwrap();
    assert!(post.text.ends_with("Data: 01/05/24 13:00"));
}
