//! Entity-aware chunking engine.
//!
//! Consumes a normalized document, an externally produced sentence list,
//! and entity analysis, and emits an ordered, finite, restartable sequence
//! of chunks respecting size, sentence, and entity-boundary constraints.

use std::collections::HashSet;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{DocshardError, Result};
use crate::preserve::{context_snippet, floor_char_boundary, EntityPreserver};
use crate::types::{
    Chunk, ChunkMetadata, ChunkingConfig, Document, EntityReference, ReadabilityScores, Sentence,
};
use crate::{approx_token_count, APPROX_CHARS_PER_TOKEN, PROCESSING_VERSION};

lazy_static! {
    static ref HEADING_RE: Regex = Regex::new(r"(?m)^(#{1,6})\s+(.+)$").unwrap();
}

/// Splits documents into bounded chunks.
///
/// Stateless per document: one engine may serve many documents, including
/// concurrently from a worker pool.
pub struct ChunkingEngine {
    config: ChunkingConfig,
}

impl ChunkingEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk a document into a lazy, finite sequence.
    ///
    /// A pure function of its inputs: calling it again with the same
    /// document, sentences, and configuration reproduces the identical
    /// chunk sequence. Validation failures surface here, before any chunk
    /// is emitted.
    pub fn chunk_document<'a>(
        &'a self,
        document: &'a Document,
        sentences: &'a [Sentence],
    ) -> Result<ChunkIter<'a>> {
        document.validate()?;
        if self.config.respect_sentences {
            validate_sentences(&document.text, sentences)?;
        }

        let entity_refs = EntityPreserver::analyze_entities(&document.text, &document.entities);
        let gaps = if self.config.entity_aware {
            EntityPreserver::find_entity_gaps(&entity_refs, &document.text)
        } else {
            Vec::new()
        };
        let headings = scan_headings(&document.text);

        debug!(
            document_id = %document.id,
            entities = entity_refs.len(),
            sentences = sentences.len(),
            "chunking document"
        );

        Ok(ChunkIter {
            engine: self,
            document,
            sentences,
            entity_refs,
            gaps,
            headings,
            cursor: 0,
            core_start: 0,
            prev_start: 0,
            position_index: 0,
            intact_ids: HashSet::new(),
            finished: false,
        })
    }
}

/// Lazy chunk sequence over one document.
pub struct ChunkIter<'a> {
    engine: &'a ChunkingEngine,
    document: &'a Document,
    sentences: &'a [Sentence],
    /// Document-level entity references, sorted by start position
    entity_refs: Vec<EntityReference>,
    /// Sorted offsets where a boundary may fall; empty when unconstrained
    gaps: Vec<usize>,
    /// Heading offsets and titles, sorted by offset
    headings: Vec<(usize, String)>,
    /// Next unconsumed sentence (sentence mode only)
    cursor: usize,
    /// Offset where the next chunk's new content begins
    core_start: usize,
    /// Start offset (overlap included) of the previous chunk
    prev_start: usize,
    position_index: usize,
    /// Entity ids that appeared whole in at least one chunk
    intact_ids: HashSet<String>,
    finished: bool,
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.core_start >= self.document.text.len() {
            if !self.finished {
                self.finished = true;
                self.log_preservation_rate();
            }
            return None;
        }

        let chunk_start = self.overlap_start();
        let (end, warnings) = if self.engine.config.respect_sentences {
            self.sentence_end(chunk_start)
        } else {
            self.window_end(chunk_start)
        };

        Some(self.build_chunk(chunk_start, end, warnings))
    }
}

impl ChunkIter<'_> {
    /// Start offset for the next chunk, pulled back by the configured
    /// overlap and snapped to a safe boundary.
    fn overlap_start(&self) -> usize {
        let config = &self.engine.config;
        if self.position_index == 0 || config.overlap_pct <= 0.0 {
            return self.core_start;
        }

        let prev_len = self.core_start - self.prev_start;
        let overlap = (prev_len as f64 * config.overlap_pct) as usize;
        if overlap == 0 {
            return self.core_start;
        }

        let desired = self
            .core_start
            .saturating_sub(overlap)
            .max(self.prev_start);
        let snapped = floor_char_boundary(&self.document.text, desired);
        let snapped = if config.entity_aware && !self.gaps.is_empty() {
            self.safe_at_or_before(snapped)
        } else {
            Some(snapped)
        };

        match snapped {
            // The overlap must stay within the previous chunk's text.
            Some(s) if s >= self.prev_start && s <= self.core_start => s,
            _ => self.core_start,
        }
    }

    /// Accumulate sentences until adding the next one would exceed the
    /// chunk size, then extend past any entity span straddling the
    /// boundary.
    fn sentence_end(&mut self, chunk_start: usize) -> (usize, Vec<String>) {
        let text = &self.document.text;
        let config = &self.engine.config;
        let mut warnings = Vec::new();

        let mut end: Option<usize> = None;
        while self.cursor < self.sentences.len() {
            let candidate = self.sentences[self.cursor].end;
            let tokens = approx_token_count(&text[chunk_start..candidate]);
            if end.is_some() && tokens > config.chunk_size {
                break;
            }
            end = Some(candidate);
            self.cursor += 1;
        }
        let mut end = end.unwrap_or(text.len());

        if config.entity_aware && !self.gaps.is_empty() {
            let mut blocking: Vec<String> = Vec::new();
            while !self.is_safe(end) && self.cursor < self.sentences.len() {
                if blocking.is_empty() {
                    blocking = self.covering_ids(end);
                }
                end = self.sentences[self.cursor].end;
                self.cursor += 1;
            }
            // The text end is always safe, so the extension terminates.
            if !blocking.is_empty() {
                let tokens = approx_token_count(&text[chunk_start..end]);
                if tokens > config.chunk_size {
                    warnings.push(oversized_warning(&blocking, tokens, config.chunk_size));
                    warn!(
                        document_id = %self.document.id,
                        position = self.position_index,
                        entities = blocking.join(",").as_str(),
                        tokens,
                        "entity exceeds chunk_size; emitting oversized chunk"
                    );
                }
            }
        }

        (end, warnings)
    }

    /// Fixed-size window boundary for configurations that ignore the
    /// sentence list, snapped to safe offsets.
    fn window_end(&mut self, chunk_start: usize) -> (usize, Vec<String>) {
        let text = &self.document.text;
        let config = &self.engine.config;
        let mut warnings = Vec::new();

        // The window covers the overlap prefix, but must always advance
        // past the new-content start.
        let window = config.chunk_size * APPROX_CHARS_PER_TOKEN;
        let desired = (chunk_start + window).max(self.core_start + 1);
        if desired >= text.len() {
            return (text.len(), warnings);
        }

        let mut end = floor_char_boundary(text, desired);
        if config.entity_aware && !self.gaps.is_empty() && !self.is_safe(end) {
            match self.safe_at_or_before(end) {
                Some(s) if s > self.core_start => end = s,
                _ => {
                    // An entity covers the whole window; emit it intact.
                    let blocking = self.covering_ids(end);
                    end = self.safe_after(end).unwrap_or(text.len());
                    let tokens = approx_token_count(&text[chunk_start..end]);
                    warnings.push(oversized_warning(&blocking, tokens, config.chunk_size));
                    warn!(
                        document_id = %self.document.id,
                        position = self.position_index,
                        entities = blocking.join(",").as_str(),
                        tokens,
                        "entity exceeds chunk_size; emitting oversized chunk"
                    );
                }
            }
        }

        if end <= self.core_start {
            end = text.len();
        }
        (end, warnings)
    }

    fn build_chunk(&mut self, chunk_start: usize, end: usize, warnings: Vec<String>) -> Chunk {
        let document = self.document;
        let chunk_text = &document.text[chunk_start..end];

        let entity_tags = self.chunk_entity_tags(chunk_start, end);
        for tag in &entity_tags {
            if !tag.is_partial {
                self.intact_ids.insert(tag.entity_id.clone());
            }
        }
        let entity_relationships =
            EntityPreserver::detect_entity_relationships(chunk_text, &entity_tags);

        let metadata = ChunkMetadata {
            source_file: document.metadata.source_file.clone(),
            source_hash: document.metadata.file_hash.clone(),
            document_type: document.metadata.document_type,
            section_context: self.section_at(chunk_start),
            entity_tags,
            entity_relationships,
            quality: None,
            created_at: Utc::now(),
            processing_version: PROCESSING_VERSION.to_string(),
            config_snapshot: self.engine.config.clone(),
            warnings,
        };

        let chunk = Chunk {
            id: Chunk::deterministic_id(&document.id, self.position_index),
            document_id: document.id,
            text: chunk_text.to_string(),
            position_index: self.position_index,
            start_index: chunk_start,
            end_index: end,
            overlap_len: self.core_start - chunk_start,
            token_count: approx_token_count(chunk_text),
            word_count: chunk_text.split_whitespace().count(),
            quality_score: None,
            readability: ReadabilityScores::default(),
            metadata,
        };

        self.prev_start = chunk_start;
        self.core_start = end;
        self.position_index += 1;
        chunk
    }

    /// References for entities intersecting `[chunk_start, end)`, rebased
    /// to chunk-local offsets. Entities that cross the chunk's edges are
    /// marked partial.
    fn chunk_entity_tags(&self, chunk_start: usize, end: usize) -> Vec<EntityReference> {
        let chunk_text = &self.document.text[chunk_start..end];
        self.entity_refs
            .iter()
            .filter(|r| r.start_pos < end && r.end_pos > chunk_start)
            .map(|r| {
                let local_start = r.start_pos.max(chunk_start) - chunk_start;
                let local_end = r.end_pos.min(end) - chunk_start;
                EntityReference {
                    entity_type: r.entity_type.clone(),
                    entity_id: r.entity_id.clone(),
                    start_pos: local_start,
                    end_pos: local_end,
                    is_partial: r.start_pos < chunk_start || r.end_pos > end,
                    context_snippet: context_snippet(chunk_text, local_start, local_end),
                }
            })
            .collect()
    }

    /// Whether a boundary may fall at `offset`.
    fn is_safe(&self, offset: usize) -> bool {
        self.gaps.binary_search(&offset).is_ok()
    }

    /// Largest safe offset at or below `offset`.
    fn safe_at_or_before(&self, offset: usize) -> Option<usize> {
        let idx = self.gaps.partition_point(|g| *g <= offset);
        if idx == 0 {
            None
        } else {
            Some(self.gaps[idx - 1])
        }
    }

    /// Smallest safe offset strictly above `offset`.
    fn safe_after(&self, offset: usize) -> Option<usize> {
        let idx = self.gaps.partition_point(|g| *g <= offset);
        self.gaps.get(idx).copied()
    }

    /// Ids of entities whose span strictly contains `offset`.
    fn covering_ids(&self, offset: usize) -> Vec<String> {
        self.entity_refs
            .iter()
            .filter(|r| r.start_pos < offset && offset < r.end_pos)
            .map(|r| r.entity_id.clone())
            .collect()
    }

    /// Title of the nearest heading at or before `offset`.
    fn section_at(&self, offset: usize) -> Option<String> {
        let idx = self.headings.partition_point(|(start, _)| *start <= offset);
        if idx == 0 {
            None
        } else {
            Some(self.headings[idx - 1].1.clone())
        }
    }

    /// Log the entity preservation rate once the sequence is exhausted.
    ///
    /// Entities fully inside one chunk divided by total entities should
    /// exceed 95% on normal input; violations are logged, never fatal.
    fn log_preservation_rate(&self) {
        let total: HashSet<&str> = self.entity_refs.iter().map(|r| r.entity_id.as_str()).collect();
        if total.is_empty() {
            return;
        }
        let intact = total
            .iter()
            .filter(|id| self.intact_ids.contains(**id))
            .count();
        let rate = intact as f64 / total.len() as f64;
        if rate < 0.95 {
            warn!(
                document_id = %self.document.id,
                intact,
                total = total.len(),
                rate,
                "entity preservation rate below 95%"
            );
        } else {
            debug!(document_id = %self.document.id, rate, "entity preservation rate");
        }
    }
}

fn oversized_warning(entity_ids: &[String], tokens: usize, chunk_size: usize) -> String {
    format!(
        "entity span ({}) forced an oversized chunk of {} tokens against chunk_size {}",
        entity_ids.join(", "),
        tokens,
        chunk_size
    )
}

/// Check that sentence spans tile the document text in order.
fn validate_sentences(text: &str, sentences: &[Sentence]) -> Result<()> {
    if text.is_empty() {
        if sentences.is_empty() {
            return Ok(());
        }
        return Err(DocshardError::InvalidSentences(
            "sentence list non-empty for empty text".to_string(),
        ));
    }
    if sentences.is_empty() {
        return Err(DocshardError::InvalidSentences(
            "sentence list empty for non-empty text".to_string(),
        ));
    }

    let mut expected = 0;
    for (i, sentence) in sentences.iter().enumerate() {
        if sentence.start != expected {
            return Err(DocshardError::InvalidSentences(format!(
                "sentence {} starts at {}, expected {}",
                i, sentence.start, expected
            )));
        }
        if sentence.is_empty() {
            return Err(DocshardError::InvalidSentences(format!(
                "sentence {} is empty",
                i
            )));
        }
        if !text.is_char_boundary(sentence.end) {
            return Err(DocshardError::InvalidSentences(format!(
                "sentence {} ends off a character boundary at {}",
                i, sentence.end
            )));
        }
        expected = sentence.end;
    }
    if expected != text.len() {
        return Err(DocshardError::InvalidSentences(format!(
            "sentences cover {} bytes of a {}-byte text",
            expected,
            text.len()
        )));
    }
    Ok(())
}

/// Scan the document for markdown-style headings.
fn scan_headings(text: &str) -> Vec<(usize, String)> {
    HEADING_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let title = caps.get(2)?.as_str().trim().to_string();
            Some((m.start(), title))
        })
        .collect()
}
