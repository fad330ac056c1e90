// src/compose/facets.rs
//! Byte-range rich-text annotations.
//!
//! Offsets are positions in the UTF-8 encoding of the post text, which is what
//! the AT Protocol facet index expects. Flags and tier glyphs are multi-byte, so
//! char indices would be wrong for anything after them.

use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// Handle without `@`; the backend resolves it to a DID.
    Mention { handle: String },
    Link { uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub byte_start: usize,
    pub byte_end: usize,
    pub annotation: Annotation,
}

impl Facet {
    pub fn range(&self) -> Range<usize> {
        self.byte_start..self.byte_end
    }

    /// Slice of `text` the facet covers, if the range is valid for it.
    pub fn anchor_in<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.range())
    }
}

/// Last occurrence of `anchor` in `text`, as a byte range.
///
/// The attribution line closes the post, so the last match is the one to annotate.
/// Returns `None` for an empty anchor or when it does not occur.
pub fn locate_anchor(text: &str, anchor: &str) -> Option<Range<usize>> {
    let hay = text.as_bytes();
    let needle = anchor.as_bytes();
    if needle.is_empty() || needle.len() > hay.len() {
        return None;
    }
    hay.windows(needle.len())
        .rposition(|w| w == needle)
        .map(|start| start..start + needle.len())
}

/// Facet for `anchor`, or nothing when the anchor is not in `text`.
pub fn facet_for(text: &str, anchor: &str, annotation: Annotation) -> Option<Facet> {
    locate_anchor(text, anchor).map(|r| Facet {
        byte_start: r.start,
        byte_end: r.end,
        annotation,
    })
}
