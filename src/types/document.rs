//! Document and entity input types.
//!
//! A [`Document`] is the read-only output of an upstream format extractor:
//! normalized text, the entities detected in it, and source-level metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DocshardError, Result};

/// Classification of a source document, assigned by the upstream extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Narrative reports and assessments rendered to text
    Report,
    /// Policy and standards documents
    Policy,
    /// Risk or control assessments
    Assessment,
    /// Manuals, runbooks, and procedures
    Manual,
    /// Anything the classifier could not place
    Unknown,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::Report => write!(f, "report"),
            DocumentType::Policy => write!(f, "policy"),
            DocumentType::Assessment => write!(f, "assessment"),
            DocumentType::Manual => write!(f, "manual"),
            DocumentType::Unknown => write!(f, "unknown"),
        }
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Unknown
    }
}

/// A domain-tagged text span detected upstream (e.g., a risk or control id).
///
/// Offsets are byte positions into the owning document's normalized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Domain tag (e.g., "risk", "control", "policy")
    pub entity_type: String,

    /// Stable identifier (e.g., "RISK-001")
    pub id: String,

    /// The matched surface text
    pub text: String,

    /// Detection confidence in [0, 1]
    pub confidence: f64,

    /// Start byte offset (inclusive)
    pub start: usize,

    /// End byte offset (exclusive)
    pub end: usize,
}

impl Entity {
    /// Span length in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Source-level metadata attached to a document by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Original source path or name (e.g., "reports/q3_risk_review.pdf")
    pub source_file: String,

    /// Content hash of the source file
    pub file_hash: String,

    /// Per-page OCR confidence in [0, 1]; empty for born-digital sources
    pub page_ocr_confidence: Vec<f64>,

    /// Fraction of the source the extractor recovered, in [0, 1]
    pub completeness_ratio: f64,

    /// Document-type classification
    pub document_type: DocumentType,
}

impl DocumentMetadata {
    /// Mean OCR confidence across pages.
    ///
    /// A document with no OCR data was never scanned and scores 1.0.
    pub fn ocr_confidence(&self) -> f64 {
        if self.page_ocr_confidence.is_empty() {
            return 1.0;
        }
        let sum: f64 = self.page_ocr_confidence.iter().sum();
        sum / self.page_ocr_confidence.len() as f64
    }
}

/// A normalized document ready for chunking.
///
/// Produced by the external extractor; read-only input to this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this document
    pub id: Uuid,

    /// Full normalized text
    pub text: String,

    /// Entities detected in `text`, in no particular order
    pub entities: Vec<Entity>,

    /// Source-level metadata
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document with a fresh id and no entities.
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            entities: Vec::new(),
            metadata,
        }
    }

    /// Attach detected entities.
    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    /// Validate the document before any chunk is emitted.
    ///
    /// Checks required metadata fields, metadata ranges, and that every
    /// entity span is a valid slice of `text`.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.source_file.trim().is_empty() {
            return Err(DocshardError::InvalidDocument(
                "metadata.source_file is empty".to_string(),
            ));
        }
        if self.metadata.file_hash.trim().is_empty() {
            return Err(DocshardError::InvalidDocument(
                "metadata.file_hash is empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.metadata.completeness_ratio) {
            return Err(DocshardError::InvalidDocument(format!(
                "completeness_ratio {} outside [0, 1]",
                self.metadata.completeness_ratio
            )));
        }
        for (page, conf) in self.metadata.page_ocr_confidence.iter().enumerate() {
            if !(0.0..=1.0).contains(conf) {
                return Err(DocshardError::InvalidDocument(format!(
                    "page {} ocr confidence {} outside [0, 1]",
                    page, conf
                )));
            }
        }
        for entity in &self.entities {
            if entity.start > entity.end || entity.end > self.text.len() {
                return Err(DocshardError::InvalidDocument(format!(
                    "entity {} span [{}, {}) outside text of length {}",
                    entity.id,
                    entity.start,
                    entity.end,
                    self.text.len()
                )));
            }
            if !self.text.is_char_boundary(entity.start) || !self.text.is_char_boundary(entity.end)
            {
                return Err(DocshardError::InvalidDocument(format!(
                    "entity {} span [{}, {}) not on character boundaries",
                    entity.id, entity.start, entity.end
                )));
            }
        }
        Ok(())
    }
}

/// A sentence span produced by the external segmenter.
///
/// Offsets are byte positions into the document text. Spans must tile the
/// text in order: the first starts at 0, each starts where the previous
/// ended, and the last ends at the text's length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// Start byte offset (inclusive)
    pub start: usize,

    /// End byte offset (exclusive)
    pub end: usize,
}

impl Sentence {
    /// Create a sentence span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span length in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
