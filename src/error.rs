//! Error types for the chunking pipeline.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the chunking, enrichment, and organization stages.
#[derive(Debug, Error)]
pub enum DocshardError {
    /// The input document failed validation before chunking started.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The externally supplied sentence list does not tile the document text.
    #[error("invalid sentence list: {0}")]
    InvalidSentences(String),

    /// The chunking configuration is out of range.
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    /// A filesystem write failed during output organization.
    #[error("failed to write {path}")]
    Organize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunk could not be rendered to the requested output format.
    #[error("failed to render chunk {chunk_id}")]
    Format {
        chunk_id: Uuid,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DocshardError>;
