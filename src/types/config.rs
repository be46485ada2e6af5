//! Configuration types for chunking.

use serde::{Deserialize, Serialize};

use crate::error::{DocshardError, Result};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_PCT};

/// Configuration for chunking one or more documents.
///
/// `chunk_size` is measured in approximate tokens using the same cheap
/// length-based heuristic as the enricher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum approximate tokens per chunk
    pub chunk_size: usize,

    /// Fraction of a chunk repeated at the head of the next, in [0, 1)
    pub overlap_pct: f64,

    /// Whether chunk boundaries must avoid entity spans
    pub entity_aware: bool,

    /// Whether chunks are built from whole sentences
    pub respect_sentences: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap_pct: DEFAULT_OVERLAP_PCT,
            entity_aware: true,
            respect_sentences: true,
        }
    }
}

impl ChunkingConfig {
    /// Create a config with the given chunk size.
    pub fn with_size(size: usize) -> Self {
        Self {
            chunk_size: size,
            ..Default::default()
        }
    }

    /// Set the overlap fraction.
    pub fn with_overlap_pct(mut self, pct: f64) -> Self {
        self.overlap_pct = pct;
        self
    }

    /// Set entity awareness.
    pub fn with_entity_aware(mut self, enabled: bool) -> Self {
        self.entity_aware = enabled;
        self
    }

    /// Set sentence-boundary handling.
    pub fn with_respect_sentences(mut self, enabled: bool) -> Self {
        self.respect_sentences = enabled;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            chunk_size: std::env::var("CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            overlap_pct: std::env::var("CHUNK_OVERLAP_PCT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_OVERLAP_PCT),
            entity_aware: std::env::var("ENTITY_AWARE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            respect_sentences: std::env::var("RESPECT_SENTENCES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }

    /// Validate configuration ranges.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DocshardError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if !self.overlap_pct.is_finite() || !(0.0..1.0).contains(&self.overlap_pct) {
            return Err(DocshardError::InvalidConfig(format!(
                "overlap_pct {} outside [0, 1)",
                self.overlap_pct
            )));
        }
        Ok(())
    }
}
