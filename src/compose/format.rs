// src/compose/format.rs
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

use crate::zone::SourceShare;

pub const ELLIPSIS: &str = "...";
pub const FALLBACK_TIMESTAMP_FORMAT: &str = "%H:%M UTC";

const REGIONAL_INDICATOR_A: u32 = 0x1F1E6;

/// Flag emoji for the two-letter country prefix of a zone code (`FR`, `US-CAL-CISO`).
pub fn flag_glyph(zone_id: &str) -> Option<String> {
    let country = zone_id.split('-').next().unwrap_or_default();
    if country.len() != 2 || !country.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    country
        .bytes()
        .map(|b| char::from_u32(REGIONAL_INDICATOR_A + u32::from(b.to_ascii_uppercase() - b'A')))
        .collect()
}

/// `"hydro_storage"` → `"Hydro storage"`.
pub fn display_source_name(source: &str) -> String {
    let spaced = source.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub fn format_source(share: &SourceShare, glyph: Option<&str>) -> String {
    let body = format!(
        "{:.0}% {}",
        share.percentage,
        display_source_name(&share.name)
    );
    match glyph {
        Some(g) => format!("{g} {body}"),
        None => body,
    }
}

/// `"a"`, `"a and b"`, `"a, b and c"`.
pub fn join_inline(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Renders with `pattern`; an invalid pattern falls back instead of panicking.
pub fn format_timestamp(ts: &DateTime<Utc>, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", ts.format(pattern)).is_err() {
        out.clear();
        let _ = write!(out, "{}", ts.format(FALLBACK_TIMESTAMP_FORMAT));
    }
    out
}

/// If `text` is longer than `max_chars`, keep `max_chars - 3` chars and append
/// `...`. Returns the new text and the byte length of the kept prefix.
pub fn truncate_chars(text: &str, max_chars: usize) -> Option<(String, usize)> {
    if text.chars().count() <= max_chars {
        return None;
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let prefix_bytes = text
        .char_indices()
        .nth(keep)
        .map_or(text.len(), |(i, _)| i);
    let mut out = String::with_capacity(prefix_bytes + ELLIPSIS.len());
    out.push_str(&text[..prefix_bytes]);
    out.push_str(ELLIPSIS);
    Some((out, prefix_bytes))
}
