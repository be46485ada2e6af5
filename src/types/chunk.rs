//! Chunk type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChunkingConfig, DocumentType, QualityScore};

/// A chunk-local, immutable view of an entity.
///
/// Created once per chunk; positions are byte offsets into the chunk text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    /// Domain tag of the entity
    pub entity_type: String,

    /// Stable identifier of the entity
    pub entity_id: String,

    /// Start byte offset within the chunk text (inclusive)
    pub start_pos: usize,

    /// End byte offset within the chunk text (exclusive)
    pub end_pos: usize,

    /// Whether the chunk holds only part of the entity's span
    pub is_partial: bool,

    /// Surrounding text, up to 20 characters on either side
    pub context_snippet: String,
}

/// A detected relationship between two entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRelationship {
    /// Id of the entity preceding the relation phrase
    pub subject_id: String,

    /// Normalized relation name (e.g., "mitigated_by")
    pub relation: String,

    /// Id of the entity following the relation phrase
    pub object_id: String,
}

/// Readability measures computed from chunk text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityScores {
    /// Flesch-Kincaid grade level
    pub flesch_kincaid_grade: f64,

    /// Gunning fog index
    pub gunning_fog: f64,

    /// Unique-token ratio over whitespace-delimited tokens
    pub lexical_diversity: f64,
}

/// Metadata attached to every chunk for traceability and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source path or name of the originating document
    pub source_file: String,

    /// Content hash of the originating source file
    pub source_hash: String,

    /// Document-type classification of the source
    pub document_type: DocumentType,

    /// Nearest heading preceding the chunk, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_context: Option<String>,

    /// Entities referenced by this chunk, ordered by start position
    pub entity_tags: Vec<EntityReference>,

    /// Relationships detected between entities within this chunk
    pub entity_relationships: Vec<EntityRelationship>,

    /// Quality assessment, populated by the enricher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScore>,

    /// When this chunk was created
    pub created_at: DateTime<Utc>,

    /// Crate version that produced this chunk
    pub processing_version: String,

    /// The chunking configuration in effect when this chunk was cut
    pub config_snapshot: ChunkingConfig,

    /// Non-fatal warnings recorded while cutting this chunk
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

/// A bounded slice of document text plus traceability metadata.
///
/// Chunks are the unit of downstream indexing. They are created by the
/// chunking engine, enriched exactly once, then treated as immutable.
/// Within a document they are ordered by `position_index`, contiguous
/// from 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier, derived from the document id and position
    pub id: Uuid,

    /// ID of the document this chunk was cut from
    pub document_id: Uuid,

    /// The chunk text, including any overlap carried from the previous chunk
    pub text: String,

    /// Order of this chunk within its document (0-indexed)
    pub position_index: usize,

    /// Start byte offset of `text` in the document, overlap included
    pub start_index: usize,

    /// End byte offset of `text` in the document
    pub end_index: usize,

    /// Length in bytes of the prefix repeated from the previous chunk
    pub overlap_len: usize,

    /// Approximate token count of `text`
    pub token_count: usize,

    /// Whitespace-delimited token count of `text`
    pub word_count: usize,

    /// Overall quality in [0, 1], populated by the enricher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    /// Readability measures, populated by the enricher
    pub readability: ReadabilityScores,

    /// Traceability metadata
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Derive the deterministic id for a chunk position within a document.
    ///
    /// Re-running the engine over identical input reproduces identical ids.
    pub fn deterministic_id(document_id: &Uuid, position_index: usize) -> Uuid {
        Uuid::new_v5(document_id, format!("chunk-{}", position_index).as_bytes())
    }

    /// The part of the text that is new in this chunk (overlap stripped).
    ///
    /// Concatenating `core_text` over all chunks in position order
    /// reconstructs the document text.
    pub fn core_text(&self) -> &str {
        &self.text[self.overlap_len..]
    }

    /// Length of the chunk text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Look up an entity reference by id.
    ///
    /// A linear scan; no index is maintained across chunks.
    pub fn find_entity(&self, entity_id: &str) -> Option<&EntityReference> {
        self.metadata
            .entity_tags
            .iter()
            .find(|r| r.entity_id == entity_id)
    }
}
