//! Core types for the chunking pipeline.

mod chunk;
mod config;
mod document;
mod quality;

pub use chunk::{Chunk, ChunkMetadata, EntityReference, EntityRelationship, ReadabilityScores};
pub use config::ChunkingConfig;
pub use document::{Document, DocumentMetadata, DocumentType, Entity, Sentence};
pub use quality::{QualityFlag, QualityScore};
