//! Entity preservation primitives.
//!
//! Positions entities within document text, computes the offsets at which a
//! chunk boundary may safely fall, and detects relationships between
//! entities from the text connecting them.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::types::{Entity, EntityReference, EntityRelationship};

/// Characters of surrounding text captured on each side of an entity.
const CONTEXT_RADIUS: usize = 20;

/// Maximum characters between two entities for relationship scanning.
const RELATION_WINDOW: usize = 150;

lazy_static! {
    /// Pinned relation-phrase vocabulary, normalized name per phrase.
    static ref RELATION_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?i)\bmitigated\s+by\b").unwrap(), "mitigated_by"),
        (Regex::new(r"(?i)\bmitigates\b").unwrap(), "mitigates"),
        (Regex::new(r"(?i)\bmaps\s+to\b").unwrap(), "maps_to"),
        (Regex::new(r"(?i)\bimplements\b").unwrap(), "implements"),
        (Regex::new(r"(?i)\baddresses\b").unwrap(), "addresses"),
        (Regex::new(r"(?i)\breferences\b").unwrap(), "references"),
        (Regex::new(r"(?i)\bderived\s+from\b").unwrap(), "derived_from"),
        (Regex::new(r"(?i)\bsupersedes\b").unwrap(), "supersedes"),
    ];
}

/// Entity positioning and boundary-safety analysis.
pub struct EntityPreserver;

impl EntityPreserver {
    /// Build document-level entity references, sorted by start position.
    ///
    /// Each reference carries a context snippet of up to [`CONTEXT_RADIUS`]
    /// characters on either side, clipped to valid text bounds.
    pub fn analyze_entities(text: &str, entities: &[Entity]) -> Vec<EntityReference> {
        let mut refs: Vec<EntityReference> = entities
            .iter()
            .filter(|e| !e.is_empty() && e.end <= text.len())
            .map(|e| {
                let start = floor_char_boundary(text, e.start);
                let end = floor_char_boundary(text, e.end);
                EntityReference {
                    entity_type: e.entity_type.clone(),
                    entity_id: e.id.clone(),
                    start_pos: start,
                    end_pos: end,
                    is_partial: false,
                    context_snippet: context_snippet(text, start, end),
                }
            })
            .collect();

        refs.sort_by(|a, b| (a.start_pos, a.end_pos).cmp(&(b.start_pos, b.end_pos)));
        refs
    }

    /// Ordered character offsets that lie outside every entity span.
    ///
    /// These are the only positions at which a chunk boundary may fall when
    /// entity-awareness is enabled. Offsets at a span's start or end are
    /// boundaries, not interior positions, and are included. Overlapping
    /// spans are merged before the scan; the entity with the earliest start
    /// position is authoritative for the merged region. Returns an empty
    /// sequence when there are no entities.
    pub fn find_entity_gaps(entity_refs: &[EntityReference], text: &str) -> Vec<usize> {
        if entity_refs.is_empty() {
            return Vec::new();
        }

        let spans = merge_spans(entity_refs);
        let mut gaps = Vec::new();
        let mut span_idx = 0;

        for offset in 0..=text.len() {
            if offset < text.len() && !text.is_char_boundary(offset) {
                continue;
            }
            while span_idx < spans.len() && spans[span_idx].1 <= offset {
                span_idx += 1;
            }
            let inside = span_idx < spans.len()
                && spans[span_idx].0 < offset
                && offset < spans[span_idx].1;
            if !inside {
                gaps.push(offset);
            }
        }

        debug!(
            entities = entity_refs.len(),
            merged_spans = spans.len(),
            gaps = gaps.len(),
            "computed entity gaps"
        );
        gaps
    }

    /// Detect relationships between entities from the text connecting them.
    ///
    /// Scans the text strictly between each adjacent pair of entity spans
    /// for the relation vocabulary, within a bounded window. The preceding
    /// entity becomes the subject, the following one the object. Results
    /// are deduplicated and deterministically ordered.
    pub fn detect_entity_relationships(
        text: &str,
        entity_refs: &[EntityReference],
    ) -> Vec<EntityRelationship> {
        let mut found = BTreeSet::new();

        for pair in entity_refs.windows(2) {
            let (subject, object) = (&pair[0], &pair[1]);
            if object.start_pos < subject.end_pos {
                // Overlapping spans have no connecting text to scan.
                continue;
            }
            let lo = floor_char_boundary(text, subject.end_pos.min(text.len()));
            let hi = floor_char_boundary(text, object.start_pos.min(text.len()));
            if lo >= hi {
                continue;
            }
            let between = &text[lo..hi];
            if between.chars().count() > RELATION_WINDOW {
                continue;
            }
            for (pattern, relation) in RELATION_PATTERNS.iter() {
                if pattern.is_match(between) {
                    found.insert(EntityRelationship {
                        subject_id: subject.entity_id.clone(),
                        relation: (*relation).to_string(),
                        object_id: object.entity_id.clone(),
                    });
                }
            }
        }

        found.into_iter().collect()
    }
}

/// Merge entity spans into non-overlapping (start, end) ranges.
///
/// Input must be sorted by start position. When spans overlap, the earliest
/// start wins and the merged range extends to the furthest end.
fn merge_spans(entity_refs: &[EntityReference]) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(entity_refs.len());
    for r in entity_refs {
        match spans.last_mut() {
            Some(last) if r.start_pos < last.1 => {
                last.1 = last.1.max(r.end_pos);
            }
            _ => spans.push((r.start_pos, r.end_pos)),
        }
    }
    spans
}

/// Surrounding text for an entity span, clipped to valid bounds.
pub(crate) fn context_snippet(text: &str, start: usize, end: usize) -> String {
    let lo = step_chars_back(text, start, CONTEXT_RADIUS);
    let hi = step_chars_forward(text, end, CONTEXT_RADIUS);
    text[lo..hi].to_string()
}

/// Walk `count` characters backward from `offset`, staying on boundaries.
fn step_chars_back(text: &str, offset: usize, count: usize) -> usize {
    let offset = floor_char_boundary(text, offset);
    text[..offset]
        .char_indices()
        .rev()
        .take(count)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset)
}

/// Walk `count` characters forward from `offset`, staying on boundaries.
fn step_chars_forward(text: &str, offset: usize, count: usize) -> usize {
    let offset = floor_char_boundary(text, offset);
    text[offset..]
        .char_indices()
        .nth(count)
        .map(|(i, _)| offset + i)
        .unwrap_or(text.len())
}

/// Largest character boundary at or below `offset`.
pub(crate) fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
