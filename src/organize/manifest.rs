//! Manifest generation for organized output.
//!
//! The manifest is the audit contract for everything an organize call
//! wrote to disk. All collections inside it are ordered, so two runs over
//! identical chunk lists differ only in `generated_at`.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Chunk;

use super::OrganizationStrategy;

/// Entity statistics aggregated over every chunk written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    /// Total entity references across all chunks
    pub total_entities: usize,

    /// Distinct entity types, sorted
    pub entity_types: Vec<String>,

    /// Count of distinct entity ids
    pub unique_entity_ids: usize,
}

/// Quality statistics aggregated over every chunk written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    /// Mean overall score across scored chunks
    pub average_overall: f64,

    /// Lowest overall score
    pub min_overall: f64,

    /// Highest overall score
    pub max_overall: f64,

    /// How many chunks carried a quality score
    pub chunks_with_quality: usize,

    /// Occurrences of each quality flag, keyed by wire name
    pub flag_counts: BTreeMap<String, usize>,
}

/// The JSON summary written alongside organized chunk files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// When this manifest was generated
    pub generated_at: DateTime<Utc>,

    /// Verbatim echo of the configuration handed to organize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_snapshot: Option<serde_json::Value>,

    /// Number of chunks written
    pub total_chunks: usize,

    /// Paths written, relative to the output directory
    pub files_created: Vec<String>,

    /// Layout strategy used
    pub strategy: OrganizationStrategy,

    /// Source name to content hash for every contributing document
    pub source_files: BTreeMap<String, String>,

    /// Entity statistics
    pub entity_summary: EntitySummary,

    /// Quality statistics
    pub quality_summary: QualitySummary,
}

impl Manifest {
    /// Aggregate a manifest over the chunks an organize call wrote.
    pub fn build(
        chunks: &[Chunk],
        strategy: OrganizationStrategy,
        config_snapshot: Option<serde_json::Value>,
        files_created: Vec<String>,
    ) -> Self {
        let mut source_files = BTreeMap::new();
        for chunk in chunks {
            source_files
                .entry(chunk.metadata.source_file.clone())
                .or_insert_with(|| chunk.metadata.source_hash.clone());
        }

        Self {
            generated_at: Utc::now(),
            config_snapshot,
            total_chunks: chunks.len(),
            files_created,
            strategy,
            source_files,
            entity_summary: entity_summary(chunks),
            quality_summary: quality_summary(chunks),
        }
    }
}

fn entity_summary(chunks: &[Chunk]) -> EntitySummary {
    let mut total = 0usize;
    let mut types = BTreeSet::new();
    let mut ids = HashSet::new();
    for chunk in chunks {
        for tag in &chunk.metadata.entity_tags {
            total += 1;
            types.insert(tag.entity_type.clone());
            ids.insert(tag.entity_id.clone());
        }
    }
    EntitySummary {
        total_entities: total,
        entity_types: types.into_iter().collect(),
        unique_entity_ids: ids.len(),
    }
}

fn quality_summary(chunks: &[Chunk]) -> QualitySummary {
    let mut overalls = Vec::new();
    let mut flag_counts: BTreeMap<String, usize> = BTreeMap::new();
    for chunk in chunks {
        if let Some(quality) = &chunk.metadata.quality {
            overalls.push(quality.overall);
            for flag in &quality.flags {
                *flag_counts.entry(flag.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }

    if overalls.is_empty() {
        return QualitySummary {
            average_overall: 0.0,
            min_overall: 0.0,
            max_overall: 0.0,
            chunks_with_quality: 0,
            flag_counts,
        };
    }

    let sum: f64 = overalls.iter().sum();
    let min = overalls.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = overalls.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    QualitySummary {
        average_overall: sum / overalls.len() as f64,
        min_overall: min,
        max_overall: max,
        chunks_with_quality: overalls.len(),
        flag_counts,
    }
}
