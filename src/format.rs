//! Output formatting for the chunk wire contract.
//!
//! Downstream indexers consume chunks as
//! `{chunk_id, text, metadata, entities, quality}`; that layout is a
//! durable contract and is enforced here through serde types rather than
//! hand-built JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DocshardError, Result};
use crate::types::{
    Chunk, ChunkingConfig, DocumentType, EntityReference, EntityRelationship, QualityScore,
    ReadabilityScores,
};

/// One chunk in wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Deterministic chunk identifier
    pub chunk_id: Uuid,

    /// Chunk text, overlap included
    pub text: String,

    /// Traceability metadata
    pub metadata: RecordMetadata,

    /// Entity references local to this chunk
    pub entities: Vec<EntityReference>,

    /// Quality assessment, when the chunk has been enriched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScore>,
}

/// Metadata block of the wire record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub document_id: Uuid,
    pub position_index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub overlap_len: usize,
    pub token_count: usize,
    pub word_count: usize,
    pub source_file: String,
    pub source_hash: String,
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_context: Option<String>,
    pub entity_relationships: Vec<EntityRelationship>,
    pub readability: ReadabilityScores,
    pub created_at: DateTime<Utc>,
    pub processing_version: String,
    pub config_snapshot: ChunkingConfig,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

impl ChunkRecord {
    /// Build the wire record for a chunk.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id,
            text: chunk.text.clone(),
            metadata: RecordMetadata {
                document_id: chunk.document_id,
                position_index: chunk.position_index,
                start_index: chunk.start_index,
                end_index: chunk.end_index,
                overlap_len: chunk.overlap_len,
                token_count: chunk.token_count,
                word_count: chunk.word_count,
                source_file: chunk.metadata.source_file.clone(),
                source_hash: chunk.metadata.source_hash.clone(),
                document_type: chunk.metadata.document_type,
                section_context: chunk.metadata.section_context.clone(),
                entity_relationships: chunk.metadata.entity_relationships.clone(),
                readability: chunk.readability,
                created_at: chunk.metadata.created_at,
                processing_version: chunk.metadata.processing_version.clone(),
                config_snapshot: chunk.metadata.config_snapshot.clone(),
                warnings: chunk.metadata.warnings.clone(),
            },
            entities: chunk.metadata.entity_tags.clone(),
            quality: chunk.metadata.quality.clone(),
        }
    }
}

/// Rendering format for chunk output.
///
/// A closed set resolved once by callers; chunk files on disk use
/// [`OutputFormat::JsonPretty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Json,
    JsonPretty,
    Text,
    Csv,
}

impl OutputFormat {
    /// Render one chunk.
    ///
    /// For [`OutputFormat::Csv`] this renders a single data row without a
    /// header; use [`OutputFormat::render_all`] for a complete file.
    pub fn render(&self, chunk: &Chunk) -> Result<String> {
        match self {
            OutputFormat::Json => to_json(chunk, false),
            OutputFormat::JsonPretty => to_json(chunk, true),
            OutputFormat::Text => Ok(text_block(chunk)),
            OutputFormat::Csv => Ok(csv_row(chunk)),
        }
    }

    /// Render a chunk sequence into one document.
    pub fn render_all(&self, chunks: &[Chunk]) -> Result<String> {
        match self {
            OutputFormat::Csv => {
                let mut out = String::from(CSV_HEADER);
                out.push('\n');
                for chunk in chunks {
                    out.push_str(&csv_row(chunk));
                    out.push('\n');
                }
                Ok(out)
            }
            OutputFormat::Json => {
                let records: Vec<ChunkRecord> = chunks.iter().map(ChunkRecord::from_chunk).collect();
                serde_json::to_string(&records).map_err(|source| DocshardError::Format {
                    chunk_id: chunks.first().map(|c| c.id).unwrap_or_default(),
                    source,
                })
            }
            OutputFormat::JsonPretty => {
                let records: Vec<ChunkRecord> = chunks.iter().map(ChunkRecord::from_chunk).collect();
                serde_json::to_string_pretty(&records).map_err(|source| DocshardError::Format {
                    chunk_id: chunks.first().map(|c| c.id).unwrap_or_default(),
                    source,
                })
            }
            OutputFormat::Text => {
                let mut out = String::new();
                for chunk in chunks {
                    out.push_str(&text_block(chunk));
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonPretty => write!(f, "json_pretty"),
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = DocshardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "json_pretty" | "json-pretty" => Ok(OutputFormat::JsonPretty),
            "text" | "txt" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(DocshardError::InvalidConfig(format!(
                "unknown output format: {}",
                other
            ))),
        }
    }
}

const CSV_HEADER: &str =
    "chunk_id,document_id,position_index,token_count,word_count,overall,flags,text";

fn to_json(chunk: &Chunk, pretty: bool) -> Result<String> {
    let record = ChunkRecord::from_chunk(chunk);
    let rendered = if pretty {
        serde_json::to_string_pretty(&record)
    } else {
        serde_json::to_string(&record)
    };
    rendered.map_err(|source| DocshardError::Format {
        chunk_id: chunk.id,
        source,
    })
}

fn text_block(chunk: &Chunk) -> String {
    format!(
        "chunk {} [{}] {}\n{}\n",
        chunk.id, chunk.position_index, chunk.metadata.source_file, chunk.text
    )
}

fn csv_row(chunk: &Chunk) -> String {
    let overall = chunk
        .quality_score
        .map(|v| format!("{:.4}", v))
        .unwrap_or_default();
    let flags = chunk
        .metadata
        .quality
        .as_ref()
        .map(|q| {
            q.flags
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(";")
        })
        .unwrap_or_default();
    format!(
        "{},{},{},{},{},{},{},{}",
        chunk.id,
        chunk.document_id,
        chunk.position_index,
        chunk.token_count,
        chunk.word_count,
        overall,
        csv_escape(&flags),
        csv_escape(&chunk.text)
    )
}

/// Quote a CSV field when it carries separators, quotes, or newlines.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
